//! Diagnostics
//!
//! Every stage of the pipeline reports problems as data. A diagnostic carries a
//! stable namespaced code, a severity and enough pointer/span information for a
//! front end to present it inline without re-reading the source text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::pointer::{JsonPointer, SourceSpan};

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing issues
///
/// The string form (`normaliser.MISSING_VALUE`, `resolver.CYCLE_DETECTED`, ...)
/// is part of the public contract: front ends branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum DiagnosticCode {
    // === Normaliser: structure ===
    /// Document root is not an object
    InvalidRoot,
    /// A member that should be a node is not an object
    InvalidNode,
    /// `$type` is not a string
    InvalidType,
    /// `$ref` is not a string
    InvalidRef,
    /// Alias declares `$ref` without `$type`
    AliasMissingType,
    /// Node declares both `$ref` and `$value`
    ConflictingValue,
    /// Token declares neither `$value` nor `$ref`
    MissingValue,
    /// Token-like node also declares child members
    TokenHasChildren,
    /// Unrecognised `$`-prefixed member
    UnknownProperty,
    /// `$schema` is not a string
    InvalidSchema,
    /// `$version` is not a semantic version
    InvalidVersion,

    // === Normaliser: metadata ===
    InvalidDescription,
    InvalidExtensions,
    /// Extension key is not a reverse-DNS namespace
    InvalidExtensionNamespace,
    InvalidDeprecated,
    /// Lifecycle timestamp is not RFC 3339
    InvalidTimestamp,
    InvalidUsageCount,
    /// `$lastUsed` present without a positive `$usageCount`
    LastUsedWithoutUsage,
    /// Positive `$usageCount` without `$lastUsed`
    UsageWithoutLastUsed,
    /// `$lastUsed` precedes `$lastModified`
    LastUsedBeforeModified,
    InvalidAuthor,
    InvalidTags,
    DuplicateTag,
    InvalidHash,

    // === Normaliser: overrides ===
    /// `$overrides` outside the document root
    MisplacedOverrides,
    InvalidOverrides,
    InvalidOverride,
    OverrideMissingToken,
    OverrideInvalidWhen,
    /// Override declares both `$ref` and `$value`
    OverrideConflict,
    /// Override declares none of `$ref`, `$value`, `$fallback`
    OverrideMissingPayload,
    InvalidFallback,
    FallbackConflict,
    FallbackMissingPayload,
    /// Unexpected failure while walking the document
    NormaliserInternalError,

    // === Graph ===
    InvalidDocumentUri,
    DuplicatePointer,
    /// Reference string cannot be resolved against the base URI
    InvalidReference,
    /// Reference fragment is not a valid JSON pointer
    InvalidPointer,
    /// Internal reference target does not exist
    MissingTarget,
    /// Internal reference lands on a node of the wrong kind
    InvalidTargetKind,
    /// Override `$token` points into another document
    ExternalOverrideTarget,

    // === Resolver ===
    ResolverInvalidPointer,
    UnknownPointer,
    InvalidNodeKind,
    CycleDetected,
    MaxDepthExceeded,
    MissingBaseValue,
    TargetTypeMismatch,
    ExternalReference,
    InvalidOverrideValue,
    OverrideFailed,
    FallbackExhausted,

    // === Plugins ===
    ExtensionFailed,
    TransformFailed,

    // === External documents ===
    LoadFailed,
    DecodeFailed,
    SchemaInvalid,
    NetworkReferenceSkipped,
    DocumentLimit,
}

impl DiagnosticCode {
    pub const ALL: &'static [DiagnosticCode] = &[
        Self::InvalidRoot,
        Self::InvalidNode,
        Self::InvalidType,
        Self::InvalidRef,
        Self::AliasMissingType,
        Self::ConflictingValue,
        Self::MissingValue,
        Self::TokenHasChildren,
        Self::UnknownProperty,
        Self::InvalidSchema,
        Self::InvalidVersion,
        Self::InvalidDescription,
        Self::InvalidExtensions,
        Self::InvalidExtensionNamespace,
        Self::InvalidDeprecated,
        Self::InvalidTimestamp,
        Self::InvalidUsageCount,
        Self::LastUsedWithoutUsage,
        Self::UsageWithoutLastUsed,
        Self::LastUsedBeforeModified,
        Self::InvalidAuthor,
        Self::InvalidTags,
        Self::DuplicateTag,
        Self::InvalidHash,
        Self::MisplacedOverrides,
        Self::InvalidOverrides,
        Self::InvalidOverride,
        Self::OverrideMissingToken,
        Self::OverrideInvalidWhen,
        Self::OverrideConflict,
        Self::OverrideMissingPayload,
        Self::InvalidFallback,
        Self::FallbackConflict,
        Self::FallbackMissingPayload,
        Self::NormaliserInternalError,
        Self::InvalidDocumentUri,
        Self::DuplicatePointer,
        Self::InvalidReference,
        Self::InvalidPointer,
        Self::MissingTarget,
        Self::InvalidTargetKind,
        Self::ExternalOverrideTarget,
        Self::ResolverInvalidPointer,
        Self::UnknownPointer,
        Self::InvalidNodeKind,
        Self::CycleDetected,
        Self::MaxDepthExceeded,
        Self::MissingBaseValue,
        Self::TargetTypeMismatch,
        Self::ExternalReference,
        Self::InvalidOverrideValue,
        Self::OverrideFailed,
        Self::FallbackExhausted,
        Self::ExtensionFailed,
        Self::TransformFailed,
        Self::LoadFailed,
        Self::DecodeFailed,
        Self::SchemaInvalid,
        Self::NetworkReferenceSkipped,
        Self::DocumentLimit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRoot => "normaliser.INVALID_ROOT",
            Self::InvalidNode => "normaliser.INVALID_NODE",
            Self::InvalidType => "normaliser.INVALID_TYPE",
            Self::InvalidRef => "normaliser.INVALID_REF",
            Self::AliasMissingType => "normaliser.ALIAS_MISSING_TYPE",
            Self::ConflictingValue => "normaliser.CONFLICTING_VALUE",
            Self::MissingValue => "normaliser.MISSING_VALUE",
            Self::TokenHasChildren => "normaliser.TOKEN_HAS_CHILDREN",
            Self::UnknownProperty => "normaliser.UNKNOWN_PROPERTY",
            Self::InvalidSchema => "normaliser.INVALID_SCHEMA",
            Self::InvalidVersion => "normaliser.INVALID_VERSION",
            Self::InvalidDescription => "normaliser.INVALID_DESCRIPTION",
            Self::InvalidExtensions => "normaliser.INVALID_EXTENSIONS",
            Self::InvalidExtensionNamespace => "normaliser.INVALID_EXTENSION_NAMESPACE",
            Self::InvalidDeprecated => "normaliser.INVALID_DEPRECATED",
            Self::InvalidTimestamp => "normaliser.INVALID_TIMESTAMP",
            Self::InvalidUsageCount => "normaliser.INVALID_USAGE_COUNT",
            Self::LastUsedWithoutUsage => "normaliser.LAST_USED_WITHOUT_USAGE",
            Self::UsageWithoutLastUsed => "normaliser.USAGE_WITHOUT_LAST_USED",
            Self::LastUsedBeforeModified => "normaliser.LAST_USED_BEFORE_MODIFIED",
            Self::InvalidAuthor => "normaliser.INVALID_AUTHOR",
            Self::InvalidTags => "normaliser.INVALID_TAGS",
            Self::DuplicateTag => "normaliser.DUPLICATE_TAG",
            Self::InvalidHash => "normaliser.INVALID_HASH",
            Self::MisplacedOverrides => "normaliser.MISPLACED_OVERRIDES",
            Self::InvalidOverrides => "normaliser.INVALID_OVERRIDES",
            Self::InvalidOverride => "normaliser.INVALID_OVERRIDE",
            Self::OverrideMissingToken => "normaliser.OVERRIDE_MISSING_TOKEN",
            Self::OverrideInvalidWhen => "normaliser.OVERRIDE_INVALID_WHEN",
            Self::OverrideConflict => "normaliser.OVERRIDE_CONFLICT",
            Self::OverrideMissingPayload => "normaliser.OVERRIDE_MISSING_PAYLOAD",
            Self::InvalidFallback => "normaliser.INVALID_FALLBACK",
            Self::FallbackConflict => "normaliser.FALLBACK_CONFLICT",
            Self::FallbackMissingPayload => "normaliser.FALLBACK_MISSING_PAYLOAD",
            Self::NormaliserInternalError => "normaliser.INTERNAL_ERROR",
            Self::InvalidDocumentUri => "graph.INVALID_DOCUMENT_URI",
            Self::DuplicatePointer => "graph.DUPLICATE_POINTER",
            Self::InvalidReference => "graph.INVALID_REFERENCE",
            Self::InvalidPointer => "graph.INVALID_POINTER",
            Self::MissingTarget => "graph.MISSING_TARGET",
            Self::InvalidTargetKind => "graph.INVALID_TARGET_KIND",
            Self::ExternalOverrideTarget => "graph.EXTERNAL_OVERRIDE_TARGET",
            Self::ResolverInvalidPointer => "resolver.INVALID_POINTER",
            Self::UnknownPointer => "resolver.UNKNOWN_POINTER",
            Self::InvalidNodeKind => "resolver.INVALID_NODE_KIND",
            Self::CycleDetected => "resolver.CYCLE_DETECTED",
            Self::MaxDepthExceeded => "resolver.MAX_DEPTH_EXCEEDED",
            Self::MissingBaseValue => "resolver.MISSING_BASE_VALUE",
            Self::TargetTypeMismatch => "resolver.TARGET_TYPE_MISMATCH",
            Self::ExternalReference => "resolver.EXTERNAL_REFERENCE",
            Self::InvalidOverrideValue => "resolver.INVALID_OVERRIDE_VALUE",
            Self::OverrideFailed => "resolver.OVERRIDE_FAILED",
            Self::FallbackExhausted => "resolver.FALLBACK_EXHAUSTED",
            Self::ExtensionFailed => "plugin.EXTENSION_FAILED",
            Self::TransformFailed => "plugin.TRANSFORM_FAILED",
            Self::LoadFailed => "loader.LOAD_FAILED",
            Self::DecodeFailed => "loader.DECODE_FAILED",
            Self::SchemaInvalid => "loader.SCHEMA_INVALID",
            Self::NetworkReferenceSkipped => "loader.NETWORK_REFERENCE_SKIPPED",
            Self::DocumentLimit => "loader.DOCUMENT_LIMIT",
        }
    }

    /// Namespace prefix of the code (`normaliser`, `graph`, `resolver`, ...)
    pub fn namespace(&self) -> &'static str {
        let code = self.as_str();
        code.split_once('.').map(|(ns, _)| ns).unwrap_or(code)
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::InvalidRoot
            | Self::InvalidNode
            | Self::InvalidType
            | Self::InvalidRef
            | Self::AliasMissingType
            | Self::InvalidOverrides
            | Self::InvalidOverride
            | Self::OverrideMissingToken
            | Self::OverrideInvalidWhen
            | Self::OverrideMissingPayload
            | Self::InvalidFallback
            | Self::FallbackMissingPayload
            | Self::NormaliserInternalError
            | Self::InvalidDocumentUri
            | Self::DuplicatePointer
            | Self::InvalidReference
            | Self::InvalidPointer
            | Self::MissingTarget
            | Self::InvalidTargetKind
            | Self::ExternalOverrideTarget
            | Self::ResolverInvalidPointer
            | Self::UnknownPointer
            | Self::InvalidNodeKind
            | Self::CycleDetected
            | Self::MaxDepthExceeded
            | Self::MissingBaseValue
            | Self::ExternalReference
            | Self::InvalidOverrideValue
            | Self::OverrideFailed
            | Self::FallbackExhausted
            | Self::ExtensionFailed
            | Self::TransformFailed
            | Self::LoadFailed
            | Self::DecodeFailed
            | Self::SchemaInvalid => Severity::Error,

            Self::ConflictingValue
            | Self::MissingValue
            | Self::TokenHasChildren
            | Self::UnknownProperty
            | Self::InvalidSchema
            | Self::InvalidVersion
            | Self::InvalidDescription
            | Self::InvalidExtensions
            | Self::InvalidExtensionNamespace
            | Self::InvalidDeprecated
            | Self::InvalidTimestamp
            | Self::InvalidUsageCount
            | Self::LastUsedWithoutUsage
            | Self::UsageWithoutLastUsed
            | Self::LastUsedBeforeModified
            | Self::InvalidAuthor
            | Self::InvalidTags
            | Self::DuplicateTag
            | Self::InvalidHash
            | Self::MisplacedOverrides
            | Self::OverrideConflict
            | Self::FallbackConflict
            | Self::TargetTypeMismatch
            | Self::DocumentLimit => Severity::Warning,

            Self::NetworkReferenceSkipped => Severity::Info,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<DiagnosticCode> for &'static str {
    fn from(code: DiagnosticCode) -> Self {
        code.as_str()
    }
}

impl FromStr for DiagnosticCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| format!("unknown diagnostic code '{}'", s))
    }
}

impl TryFrom<String> for DiagnosticCode {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic
// =============================================================================

/// Secondary location attached to a diagnostic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedInformation {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<JsonPointer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
}

/// A single diagnostic event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub severity: Severity,
    /// Pointer of the offending node or field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<JsonPointer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<RelatedInformation>,
}

impl Diagnostic {
    /// Create a diagnostic with the code's default severity
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: code.severity(),
            pointer: None,
            span: None,
            related: Vec::new(),
        }
    }

    pub fn with_pointer(mut self, pointer: JsonPointer) -> Self {
        self.pointer = Some(pointer);
        self
    }

    pub fn with_span(mut self, span: Option<SourceSpan>) -> Self {
        self.span = span;
        self
    }

    /// Attach pointer and span in one call
    pub fn at(self, pointer: &JsonPointer, span: Option<&SourceSpan>) -> Self {
        self.with_pointer(pointer.clone()).with_span(span.cloned())
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_related(
        mut self,
        message: impl Into<String>,
        pointer: Option<JsonPointer>,
        span: Option<SourceSpan>,
    ) -> Self {
        self.related.push(RelatedInformation {
            message: message.into(),
            pointer,
            span,
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.severity, self.message)?;

        if let Some(pointer) = &self.pointer {
            write!(f, " ({})", pointer)?;
        }
        if let Some(span) = &self.span {
            write!(f, " at {}", span)?;
        }
        for related in &self.related {
            write!(f, "\n  - {}", related.message)?;
            if let Some(pointer) = &related.pointer {
                write!(f, " ({})", pointer)?;
            }
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Ordered collection of diagnostics emitted by one stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Diagnostic) {
        self.items.push(item);
    }

    /// Push a diagnostic located at a pointer
    pub fn report(
        &mut self,
        code: DiagnosticCode,
        message: impl Into<String>,
        pointer: &JsonPointer,
        span: Option<&SourceSpan>,
    ) {
        self.push(Diagnostic::new(code, message).at(pointer, span));
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(other);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|i| i.severity == Severity::Warning)
    }

    /// True if any diagnostic carries the given code
    pub fn contains(&self, code: DiagnosticCode) -> bool {
        self.items.iter().any(|i| i.code == code)
    }

    pub fn all(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }

    /// Format all diagnostics for display
    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&format!("{}\n", item));
        }

        if !self.is_empty() {
            output.push_str(&format!(
                "\n{} error(s), {} warning(s)\n",
                self.errors().count(),
                self.warnings().count()
            ));
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(items: Vec<Diagnostic>) -> Self {
        Self { items }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_strings_are_namespaced() {
        assert_eq!(DiagnosticCode::CycleDetected.as_str(), "resolver.CYCLE_DETECTED");
        assert_eq!(DiagnosticCode::MissingValue.as_str(), "normaliser.MISSING_VALUE");
        assert_eq!(DiagnosticCode::MissingTarget.as_str(), "graph.MISSING_TARGET");
        assert_eq!(DiagnosticCode::TransformFailed.namespace(), "plugin");
    }

    #[test]
    fn test_code_serializes_as_namespaced_string() {
        let json = serde_json::to_string(&DiagnosticCode::FallbackExhausted).unwrap();
        assert_eq!(json, "\"resolver.FALLBACK_EXHAUSTED\"");
        let back: DiagnosticCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DiagnosticCode::FallbackExhausted);
        assert!("resolver.NOPE".parse::<DiagnosticCode>().is_err());
        assert_eq!(DiagnosticCode::ALL.len(), 60);
    }

    #[test]
    fn test_diagnostic_severity() {
        assert_eq!(DiagnosticCode::CycleDetected.severity(), Severity::Error);
        assert_eq!(DiagnosticCode::TargetTypeMismatch.severity(), Severity::Warning);
        assert_eq!(DiagnosticCode::NetworkReferenceSkipped.severity(), Severity::Info);
    }

    #[test]
    fn test_diagnostics_collection() {
        let mut diags = Diagnostics::new();
        let pointer = JsonPointer::root().child("color");
        diags.report(DiagnosticCode::MissingTarget, "target missing", &pointer, None);
        diags.report(DiagnosticCode::MissingValue, "no $value", &pointer, None);

        assert_eq!(diags.errors().count(), 1);
        assert_eq!(diags.warnings().count(), 1);
        assert!(diags.has_errors());
        assert!(diags.contains(DiagnosticCode::MissingValue));
        assert!(!diags.contains(DiagnosticCode::CycleDetected));
    }

    #[test]
    fn test_display_includes_pointer() {
        let diag = Diagnostic::new(DiagnosticCode::UnknownPointer, "no node")
            .with_pointer(JsonPointer::root().child("a"));
        let text = diag.to_string();
        assert!(text.starts_with("[resolver.UNKNOWN_POINTER] error: no node"));
        assert!(text.contains("#/a"));
    }
}
