//! Document AST
//!
//! Output of the normaliser. Every scalar lifted out of the source document is
//! wrapped in a [`Field`] so later stages can point diagnostics (and "go to
//! definition") at the exact member that declared it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

use crate::pointer::{JsonPointer, SourceSpan};

// =============================================================================
// Provenance
// =============================================================================

/// A value with the pointer and span it was read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field<T> {
    pub value: T,
    pub pointer: JsonPointer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
}

impl<T> Field<T> {
    pub fn new(value: T, pointer: JsonPointer, span: Option<SourceSpan>) -> Self {
        Self { value, pointer, span }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        Field {
            value: f(self.value),
            pointer: self.pointer,
            span: self.span,
        }
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// `$deprecated` declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deprecation {
    pub active: bool,
    /// `$replacement` pointer, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement: Option<Field<String>>,
}

/// Optional metadata attached to any node
///
/// Lifecycle invariants (`$lastUsed` ⇔ positive `$usageCount`, `$lastUsed` not
/// before `$lastModified`) hold for every value stored here: the normaliser
/// strips offending members instead of keeping them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Field<String>>,
    /// Extension payloads keyed by reverse-DNS namespace
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Field<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<Field<Deprecation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Field<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<Field<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_count: Option<Field<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Field<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<Field<String>>,
}

impl NodeMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// `$replacement` of an active deprecation
    pub fn replacement(&self) -> Option<&Field<String>> {
        self.deprecated
            .as_ref()
            .filter(|d| d.value.active)
            .and_then(|d| d.value.replacement.as_ref())
    }
}

// =============================================================================
// Nodes
// =============================================================================

/// A group of nodes without a value of its own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionNode {
    pub name: String,
    pub pointer: JsonPointer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
    #[serde(default)]
    pub metadata: NodeMetadata,
    pub children: Vec<AstNode>,
}

/// A token declaring its own `$value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenNode {
    pub name: String,
    pub pointer: JsonPointer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
    #[serde(default)]
    pub metadata: NodeMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<Field<String>>,
    /// Missing `$value` is kept; resolution reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Field<Value>>,
}

/// A token pointing at another token through `$ref`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasNode {
    pub name: String,
    pub pointer: JsonPointer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
    #[serde(default)]
    pub metadata: NodeMetadata,
    pub token_type: Field<String>,
    pub reference: Field<String>,
}

/// Any node of the document tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AstNode {
    Collection(CollectionNode),
    Token(TokenNode),
    Alias(AliasNode),
}

impl AstNode {
    pub fn pointer(&self) -> &JsonPointer {
        match self {
            Self::Collection(n) => &n.pointer,
            Self::Token(n) => &n.pointer,
            Self::Alias(n) => &n.pointer,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Collection(n) => &n.name,
            Self::Token(n) => &n.name,
            Self::Alias(n) => &n.name,
        }
    }

    pub fn span(&self) -> Option<&SourceSpan> {
        match self {
            Self::Collection(n) => n.span.as_ref(),
            Self::Token(n) => n.span.as_ref(),
            Self::Alias(n) => n.span.as_ref(),
        }
    }

    pub fn metadata(&self) -> &NodeMetadata {
        match self {
            Self::Collection(n) => &n.metadata,
            Self::Token(n) => &n.metadata,
            Self::Alias(n) => &n.metadata,
        }
    }
}

// =============================================================================
// Overrides
// =============================================================================

/// One entry of a `$fallback` chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideFallbackNode {
    pub pointer: JsonPointer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<Field<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Field<Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback: Vec<OverrideFallbackNode>,
}

/// An entry of the root `$overrides` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideNode {
    pub pointer: JsonPointer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
    /// Target token pointer
    pub token: Field<String>,
    /// Non-empty condition map matched against the resolver context
    pub when: Field<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<Field<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Field<Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback: Vec<OverrideFallbackNode>,
}

// =============================================================================
// Document
// =============================================================================

/// Root of a normalized document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAst {
    pub uri: Url,
    pub pointer: JsonPointer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Field<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Field<String>>,
    #[serde(default)]
    pub metadata: NodeMetadata,
    pub children: Vec<AstNode>,
    #[serde(default)]
    pub overrides: Vec<OverrideNode>,
}

impl DocumentAst {
    /// Depth-first iterator over every node in document order
    pub fn walk(&self) -> Vec<&AstNode> {
        fn visit<'a>(nodes: &'a [AstNode], out: &mut Vec<&'a AstNode>) {
            for node in nodes {
                out.push(node);
                if let AstNode::Collection(collection) = node {
                    visit(&collection.children, out);
                }
            }
        }

        let mut out = Vec::new();
        visit(&self.children, &mut out);
        out
    }
}
