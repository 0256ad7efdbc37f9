//! Normaliser
//!
//! Converts a decoded document into a [`DocumentAst`]. Objects carrying any of
//! `$value`, `$ref` or `$type` are token-like (aliases when `$ref` is present);
//! every other object is a collection whose non-`$` members are children.
//!
//! Structural problems become diagnostics and the offending node or member is
//! dropped. The walk itself can only fail on pathological input (nesting beyond
//! the configured limit); that failure is caught once at the top and turned into
//! a single `normaliser.INTERNAL_ERROR` with no AST.

mod metadata;
mod overrides;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::ast::{AliasNode, AstNode, CollectionNode, DocumentAst, Field, TokenNode};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::document::DecodedDocument;
use crate::pointer::{JsonPointer, SourceMap, SourceSpan};

pub use metadata::is_extension_namespace;

/// Members allowed on every node
pub(crate) const METADATA_KEYS: &[&str] = &[
    "$description",
    "$extensions",
    "$deprecated",
    "$lastModified",
    "$lastUsed",
    "$usageCount",
    "$author",
    "$tags",
    "$hash",
];

const TOKEN_KEYS: &[&str] = &["$type", "$value", "$ref"];
const ROOT_KEYS: &[&str] = &["$schema", "$version", "$overrides"];
const OVERRIDES_KEY: &[&str] = &["$overrides"];

// =============================================================================
// Extension Collector
// =============================================================================

/// One `$extensions` entry handed to the collector
#[derive(Debug, Clone, Copy)]
pub struct ExtensionInput<'a> {
    pub uri: &'a Url,
    pub namespace: &'a str,
    pub value: &'a Value,
    pub pointer: &'a JsonPointer,
    pub span: Option<&'a SourceSpan>,
}

/// What a plugin produced for an extension payload
#[derive(Debug, Clone, Default)]
pub struct ExtensionOutcome {
    pub plugin: String,
    pub normalized: Option<Value>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Extension result carried out of normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionEvaluation {
    pub plugin: String,
    pub namespace: String,
    pub pointer: JsonPointer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized: Option<Value>,
}

/// Plugin capability invoked for every valid extension payload
///
/// Returns `Ok(None)` when no plugin handles the namespace.
pub trait ExtensionCollector: Send + Sync {
    fn collect(&self, input: &ExtensionInput<'_>) -> anyhow::Result<Option<ExtensionOutcome>>;
}

// =============================================================================
// Options / Result
// =============================================================================

/// Normalization options
#[derive(Clone, Copy)]
pub struct NormalizeOptions<'a> {
    pub extension_collector: Option<&'a dyn ExtensionCollector>,
    /// Maximum object nesting before the walk gives up
    pub max_nesting: usize,
}

impl Default for NormalizeOptions<'_> {
    fn default() -> Self {
        Self {
            extension_collector: None,
            max_nesting: 256,
        }
    }
}

/// Output of [`normalize`]
#[derive(Debug, Clone, Default)]
pub struct NormalizeResult {
    pub ast: Option<DocumentAst>,
    pub diagnostics: Vec<Diagnostic>,
    pub extensions: Vec<ExtensionEvaluation>,
}

#[derive(Debug, Error)]
pub(crate) enum WalkError {
    #[error("document nesting exceeds {limit} levels at {pointer}")]
    NestingTooDeep { pointer: JsonPointer, limit: usize },
}

// =============================================================================
// Entry Point
// =============================================================================

/// Normalize a decoded document
pub fn normalize(document: &DecodedDocument, options: &NormalizeOptions<'_>) -> NormalizeResult {
    let mut normaliser = Normaliser {
        uri: &document.uri,
        source_map: &document.source_map,
        options,
        diagnostics: Diagnostics::new(),
        extensions: Vec::new(),
    };

    match normaliser.document(&document.data) {
        Ok(ast) => {
            tracing::debug!(
                uri = %document.uri,
                nodes = ast.as_ref().map(|a| a.walk().len()).unwrap_or(0),
                diagnostics = normaliser.diagnostics.len(),
                "normalized document"
            );
            NormalizeResult {
                ast,
                diagnostics: normaliser.diagnostics.into_vec(),
                extensions: normaliser.extensions,
            }
        }
        Err(err) => {
            tracing::warn!(uri = %document.uri, error = %err, "normalization aborted");
            let root = JsonPointer::root();
            let span = document.source_map.get(&root).cloned();
            NormalizeResult {
                ast: None,
                diagnostics: vec![Diagnostic::new(
                    DiagnosticCode::NormaliserInternalError,
                    format!("failed to normalise document: {}", err),
                )
                .with_pointer(root)
                .with_span(span)],
                extensions: Vec::new(),
            }
        }
    }
}

// =============================================================================
// Walk
// =============================================================================

pub(crate) struct Normaliser<'a> {
    pub(crate) uri: &'a Url,
    pub(crate) source_map: &'a SourceMap,
    pub(crate) options: &'a NormalizeOptions<'a>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) extensions: Vec<ExtensionEvaluation>,
}

impl<'a> Normaliser<'a> {
    pub(crate) fn span(&self, pointer: &JsonPointer) -> Option<SourceSpan> {
        self.source_map.get(pointer).cloned()
    }

    pub(crate) fn field<T>(&self, value: T, pointer: JsonPointer) -> Field<T> {
        let span = self.span(&pointer);
        Field::new(value, pointer, span)
    }

    pub(crate) fn report(&mut self, code: DiagnosticCode, message: impl Into<String>, pointer: &JsonPointer) {
        let span = self.span(pointer);
        self.diagnostics.report(code, message, pointer, span.as_ref());
    }

    pub(crate) fn check_nesting(&self, pointer: &JsonPointer, depth: usize) -> Result<(), WalkError> {
        if depth > self.options.max_nesting {
            return Err(WalkError::NestingTooDeep {
                pointer: pointer.clone(),
                limit: self.options.max_nesting,
            });
        }
        Ok(())
    }

    fn document(&mut self, data: &Value) -> Result<Option<DocumentAst>, WalkError> {
        let root = JsonPointer::root();

        let Some(obj) = data.as_object() else {
            self.report(
                DiagnosticCode::InvalidRoot,
                "DTIF document root must be an object",
                &root,
            );
            return Ok(None);
        };

        let schema = match obj.get("$schema") {
            Some(Value::String(s)) => Some(self.field(s.clone(), root.child("$schema"))),
            Some(_) => {
                self.report(DiagnosticCode::InvalidSchema, "$schema must be a string", &root.child("$schema"));
                None
            }
            None => None,
        };

        let version = self.version(obj.get("$version"), &root);
        let metadata = self.metadata(obj, &root);
        self.unknown_members(obj, &root, &[ROOT_KEYS, METADATA_KEYS]);

        let overrides = match obj.get("$overrides") {
            Some(value) => self.overrides(value, &root.child("$overrides"))?,
            None => Vec::new(),
        };

        let children = self.children(obj, &root, 1)?;

        Ok(Some(DocumentAst {
            uri: self.uri.clone(),
            span: self.span(&root),
            pointer: root,
            schema,
            version,
            metadata,
            children,
            overrides,
        }))
    }

    fn version(&mut self, value: Option<&Value>, root: &JsonPointer) -> Option<Field<String>> {
        let pointer = root.child("$version");
        match value? {
            Value::String(s) => {
                if let Err(err) = semver::Version::parse(s) {
                    self.report(
                        DiagnosticCode::InvalidVersion,
                        format!("$version '{}' is not a semantic version: {}", s, err),
                        &pointer,
                    );
                }
                Some(self.field(s.clone(), pointer))
            }
            _ => {
                self.report(DiagnosticCode::InvalidVersion, "$version must be a string", &pointer);
                None
            }
        }
    }

    fn children(
        &mut self,
        obj: &Map<String, Value>,
        parent: &JsonPointer,
        depth: usize,
    ) -> Result<Vec<AstNode>, WalkError> {
        let mut children = Vec::new();
        for (name, value) in obj {
            if name.starts_with('$') {
                continue;
            }
            let pointer = parent.child(name);
            if let Some(node) = self.node(name, value, pointer, depth)? {
                children.push(node);
            }
        }
        Ok(children)
    }

    fn node(
        &mut self,
        name: &str,
        value: &Value,
        pointer: JsonPointer,
        depth: usize,
    ) -> Result<Option<AstNode>, WalkError> {
        self.check_nesting(&pointer, depth)?;

        let Some(obj) = value.as_object() else {
            self.report(
                DiagnosticCode::InvalidNode,
                format!("member '{}' must be an object describing a token or collection", name),
                &pointer,
            );
            return Ok(None);
        };

        if obj.contains_key("$overrides") {
            self.report(
                DiagnosticCode::MisplacedOverrides,
                "$overrides is only recognised at the document root",
                &pointer.child("$overrides"),
            );
        }

        let token_like = TOKEN_KEYS.iter().any(|k| obj.contains_key(*k));
        if token_like {
            self.token(name, obj, pointer)
        } else {
            self.collection(name, obj, pointer, depth)
        }
    }

    fn collection(
        &mut self,
        name: &str,
        obj: &Map<String, Value>,
        pointer: JsonPointer,
        depth: usize,
    ) -> Result<Option<AstNode>, WalkError> {
        let metadata = self.metadata(obj, &pointer);
        self.unknown_members(obj, &pointer, &[METADATA_KEYS, OVERRIDES_KEY]);
        let children = self.children(obj, &pointer, depth + 1)?;

        Ok(Some(AstNode::Collection(CollectionNode {
            name: name.to_string(),
            span: self.span(&pointer),
            pointer,
            metadata,
            children,
        })))
    }

    fn token(
        &mut self,
        name: &str,
        obj: &Map<String, Value>,
        pointer: JsonPointer,
    ) -> Result<Option<AstNode>, WalkError> {
        let nested: Vec<&str> = obj
            .keys()
            .filter(|k| !k.starts_with('$'))
            .map(String::as_str)
            .collect();
        if !nested.is_empty() {
            self.report(
                DiagnosticCode::TokenHasChildren,
                format!("token members are ignored: {}", nested.join(", ")),
                &pointer,
            );
        }
        self.unknown_members(obj, &pointer, &[TOKEN_KEYS, METADATA_KEYS, OVERRIDES_KEY]);

        let token_type = match obj.get("$type") {
            Some(Value::String(s)) => Some(self.field(s.clone(), pointer.child("$type"))),
            Some(_) => {
                self.report(DiagnosticCode::InvalidType, "$type must be a string", &pointer.child("$type"));
                None
            }
            None => None,
        };

        let metadata = self.metadata(obj, &pointer);

        if let Some(reference) = obj.get("$ref") {
            let ref_pointer = pointer.child("$ref");
            let Value::String(reference) = reference else {
                self.report(
                    DiagnosticCode::InvalidRef,
                    "$ref must be a string; alias dropped",
                    &ref_pointer,
                );
                return Ok(None);
            };
            let Some(token_type) = token_type else {
                self.report(
                    DiagnosticCode::AliasMissingType,
                    format!("alias '{}' must declare $type; alias dropped", name),
                    &pointer,
                );
                return Ok(None);
            };
            if obj.contains_key("$value") {
                self.report(
                    DiagnosticCode::ConflictingValue,
                    "alias declares both $ref and $value; $value is ignored",
                    &pointer.child("$value"),
                );
            }

            return Ok(Some(AstNode::Alias(AliasNode {
                name: name.to_string(),
                span: self.span(&pointer),
                reference: self.field(reference.clone(), ref_pointer),
                pointer,
                metadata,
                token_type,
            })));
        }

        let value = match obj.get("$value") {
            Some(v) => Some(self.field(v.clone(), pointer.child("$value"))),
            None => {
                self.report(
                    DiagnosticCode::MissingValue,
                    format!("token '{}' declares no $value", name),
                    &pointer,
                );
                None
            }
        };

        Ok(Some(AstNode::Token(TokenNode {
            name: name.to_string(),
            span: self.span(&pointer),
            pointer,
            metadata,
            token_type,
            value,
        })))
    }

    pub(crate) fn unknown_members(
        &mut self,
        obj: &Map<String, Value>,
        pointer: &JsonPointer,
        allowed: &[&[&str]],
    ) {
        for key in obj.keys().filter(|k| k.starts_with('$')) {
            if !allowed.iter().any(|set| set.contains(&key.as_str())) {
                self.report(
                    DiagnosticCode::UnknownProperty,
                    format!("unknown member '{}'", key),
                    &pointer.child(key),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decoded(data: Value) -> DecodedDocument {
        DecodedDocument::from_value(Url::parse("file:///tokens.json").unwrap(), data)
    }

    fn run(data: Value) -> NormalizeResult {
        normalize(&decoded(data), &NormalizeOptions::default())
    }

    fn codes(result: &NormalizeResult) -> Vec<DiagnosticCode> {
        result.diagnostics.iter().map(|d| d.code).collect()
    }

    #[test]
    fn test_classifies_tokens_aliases_and_collections() {
        let result = run(json!({
            "color": {
                "base": { "$type": "color", "$value": "#000" },
                "brand": { "$type": "color", "$ref": "#/color/base" }
            }
        }));

        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let ast = result.ast.unwrap();
        let AstNode::Collection(color) = &ast.children[0] else {
            panic!("expected collection");
        };
        assert_eq!(color.pointer.as_str(), "#/color");
        assert!(matches!(color.children[0], AstNode::Token(_)));
        let AstNode::Alias(alias) = &color.children[1] else {
            panic!("expected alias");
        };
        assert_eq!(alias.reference.value, "#/color/base");
        assert_eq!(alias.reference.pointer.as_str(), "#/color/brand/$ref");
    }

    #[test]
    fn test_alias_without_type_is_dropped() {
        let result = run(json!({ "x": { "$ref": "#/y" }, "y": { "$type": "color", "$value": "#fff" } }));

        assert_eq!(codes(&result), vec![DiagnosticCode::AliasMissingType]);
        let ast = result.ast.unwrap();
        assert_eq!(ast.children.len(), 1);
        assert_eq!(ast.children[0].name(), "y");
    }

    #[test]
    fn test_token_without_value_is_kept() {
        let result = run(json!({ "spacing": { "$type": "dimension" } }));

        assert_eq!(codes(&result), vec![DiagnosticCode::MissingValue]);
        let ast = result.ast.unwrap();
        let AstNode::Token(token) = &ast.children[0] else {
            panic!("expected token");
        };
        assert!(token.value.is_none());
        assert_eq!(token.token_type.as_ref().unwrap().value, "dimension");
    }

    #[test]
    fn test_invalid_root() {
        let result = run(json!([1, 2, 3]));
        assert!(result.ast.is_none());
        assert_eq!(codes(&result), vec![DiagnosticCode::InvalidRoot]);
    }

    #[test]
    fn test_non_object_child_reported() {
        let result = run(json!({ "color": 42 }));
        assert_eq!(codes(&result), vec![DiagnosticCode::InvalidNode]);
        assert!(result.ast.unwrap().children.is_empty());
    }

    #[test]
    fn test_excessive_nesting_yields_single_internal_error() {
        let mut data = json!({ "leaf": { "$type": "number", "$value": 1 } });
        for i in 0..10 {
            data = json!({ format!("level{}", i): data });
        }
        let options = NormalizeOptions {
            max_nesting: 4,
            ..NormalizeOptions::default()
        };

        let result = normalize(&decoded(data), &options);

        assert!(result.ast.is_none());
        assert_eq!(codes(&result), vec![DiagnosticCode::NormaliserInternalError]);
        assert!(result.diagnostics[0].pointer.as_ref().unwrap().is_root());
    }

    #[test]
    fn test_invalid_version_is_kept_with_warning() {
        let result = run(json!({ "$version": "one", "$schema": "https://dtif.lapidist.net/schema/core.json" }));
        assert_eq!(codes(&result), vec![DiagnosticCode::InvalidVersion]);
        let ast = result.ast.unwrap();
        assert_eq!(ast.version.unwrap().value, "one");
        assert!(ast.schema.is_some());
    }

    #[test]
    fn test_unknown_and_misplaced_members() {
        let result = run(json!({
            "group": {
                "$bogus": true,
                "$overrides": [],
                "token": { "$type": "number", "$value": 1, "nested": {} }
            }
        }));

        let found = codes(&result);
        assert!(found.contains(&DiagnosticCode::UnknownProperty));
        assert!(found.contains(&DiagnosticCode::MisplacedOverrides));
        assert!(found.contains(&DiagnosticCode::TokenHasChildren));
    }

    #[test]
    fn test_conflicting_value_on_alias() {
        let result = run(json!({
            "a": { "$type": "color", "$value": "#fff" },
            "b": { "$type": "color", "$ref": "#/a", "$value": "#000" }
        }));
        assert_eq!(codes(&result), vec![DiagnosticCode::ConflictingValue]);
        assert!(matches!(result.ast.unwrap().children[1], AstNode::Alias(_)));
    }

    #[test]
    fn test_children_keep_document_order() {
        let result = run(json!({ "zeta": { "$type": "number", "$value": 1 }, "alpha": { "$type": "number", "$value": 2 } }));
        let ast = result.ast.unwrap();
        let names: Vec<&str> = ast.children.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }
}
