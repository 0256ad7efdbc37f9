//! Document Graph
//!
//! Pointer-indexed view of one normalized document. Nodes live in an arena
//! (`Vec<GraphNode>`) whose positions line up with the node indices of a
//! petgraph `DiGraph` holding every validated internal reference, so pointer
//! lookups are O(1) and reference analysis can reuse petgraph's algorithms.
//!
//! Graphs are immutable once built; the resolver only reads them.

pub mod analysis;
pub mod builder;

pub use analysis::{compute_reference_analysis, dependency_closure, ClosureNode, ReferenceAnalysis, ReferenceCycle};
pub use builder::{build_document_graph, GraphBuildResult};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use url::Url;

use crate::ast::{DocumentAst, Field, NodeMetadata};
use crate::pointer::{JsonPointer, SourceSpan};

// =============================================================================
// Node Kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphNodeKind {
    Collection,
    Token,
    Alias,
}

impl GraphNodeKind {
    /// Kinds a token reference may land on
    pub const REFERENCEABLE: &'static [GraphNodeKind] = &[GraphNodeKind::Token, GraphNodeKind::Alias];
}

impl fmt::Display for GraphNodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection => write!(f, "collection"),
            Self::Token => write!(f, "token"),
            Self::Alias => write!(f, "alias"),
        }
    }
}

/// Why one node depends on another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    /// Alias `$ref`
    Alias,
    /// `$deprecated.$replacement`
    Replacement,
    /// Override `$ref` (edge from the overridden token)
    Override,
    /// Fallback `$ref` (edge from the overridden token)
    Fallback,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alias => write!(f, "alias"),
            Self::Replacement => write!(f, "replacement"),
            Self::Override => write!(f, "override"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

// =============================================================================
// References
// =============================================================================

/// Absolute target of a reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphReferenceTarget {
    /// Document URI without fragment
    pub uri: Url,
    pub pointer: JsonPointer,
    /// True iff `uri` differs from the owning document's URI
    pub external: bool,
}

impl GraphReferenceTarget {
    /// `http`/`https` targets need network access to load
    pub fn is_network(&self) -> bool {
        matches!(self.uri.scheme(), "http" | "https")
    }
}

impl fmt::Display for GraphReferenceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.uri, self.pointer)
    }
}

/// A reference target plus the provenance of the member that declared it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphReferenceField {
    pub target: GraphReferenceTarget,
    /// The reference string as written
    pub raw: String,
    pub pointer: JsonPointer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
}

// =============================================================================
// Nodes
// =============================================================================

/// Data shared by every node kind
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNodeBase {
    pub name: String,
    pub pointer: JsonPointer,
    pub span: Option<SourceSpan>,
    pub parent: Option<JsonPointer>,
    pub metadata: NodeMetadata,
    /// Resolved `$deprecated.$replacement`
    pub replacement: Option<GraphReferenceField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphCollectionNode {
    pub base: GraphNodeBase,
    pub children: Vec<JsonPointer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphTokenNode {
    pub base: GraphNodeBase,
    pub token_type: Option<Field<String>>,
    pub value: Option<Field<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphAliasNode {
    pub base: GraphNodeBase,
    pub token_type: Field<String>,
    pub reference: GraphReferenceField,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    Collection(GraphCollectionNode),
    Token(GraphTokenNode),
    Alias(GraphAliasNode),
}

impl GraphNode {
    pub fn kind(&self) -> GraphNodeKind {
        match self {
            Self::Collection(_) => GraphNodeKind::Collection,
            Self::Token(_) => GraphNodeKind::Token,
            Self::Alias(_) => GraphNodeKind::Alias,
        }
    }

    pub fn base(&self) -> &GraphNodeBase {
        match self {
            Self::Collection(n) => &n.base,
            Self::Token(n) => &n.base,
            Self::Alias(n) => &n.base,
        }
    }

    pub fn pointer(&self) -> &JsonPointer {
        &self.base().pointer
    }

    /// `$type` as written on the node (collections have none)
    pub fn declared_type(&self) -> Option<&Field<String>> {
        match self {
            Self::Collection(_) => None,
            Self::Token(n) => n.token_type.as_ref(),
            Self::Alias(n) => Some(&n.token_type),
        }
    }
}

// =============================================================================
// Overrides
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct GraphFallbackNode {
    pub pointer: JsonPointer,
    pub span: Option<SourceSpan>,
    pub reference: Option<GraphReferenceField>,
    pub value: Option<Field<Value>>,
    pub fallback: Vec<GraphFallbackNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphOverrideNode {
    pub pointer: JsonPointer,
    pub span: Option<SourceSpan>,
    /// Overridden token (always internal)
    pub token: GraphReferenceField,
    pub when: Field<Map<String, Value>>,
    pub reference: Option<GraphReferenceField>,
    pub value: Option<Field<Value>>,
    pub fallback: Vec<GraphFallbackNode>,
}

impl GraphOverrideNode {
    /// Every reference the override may follow, in evaluation order
    pub fn references(&self) -> Vec<&GraphReferenceField> {
        fn chain<'a>(nodes: &'a [GraphFallbackNode], out: &mut Vec<&'a GraphReferenceField>) {
            for node in nodes {
                out.extend(node.reference.as_ref());
                chain(&node.fallback, out);
            }
        }

        let mut out: Vec<&GraphReferenceField> = self.reference.iter().collect();
        chain(&self.fallback, &mut out);
        out
    }
}

// =============================================================================
// Document Graph
// =============================================================================

/// Pointer-indexed graph of one document
#[derive(Debug, Clone)]
pub struct DocumentGraph {
    pub uri: Url,
    pub ast: DocumentAst,
    /// Node arena in document order
    pub(crate) nodes: Vec<GraphNode>,
    /// Index: pointer -> arena/petgraph index
    pub(crate) index: HashMap<JsonPointer, NodeIndex>,
    /// Validated internal references (same indices as `nodes`)
    pub(crate) references: DiGraph<JsonPointer, ReferenceKind>,
    pub root_pointers: Vec<JsonPointer>,
    pub overrides: Vec<GraphOverrideNode>,
    /// Index: overridden token -> positions in `overrides` (declaration order)
    pub(crate) overrides_by_token: HashMap<JsonPointer, Vec<usize>>,
}

impl DocumentGraph {
    pub fn node(&self, pointer: &JsonPointer) -> Option<&GraphNode> {
        let idx = self.index.get(pointer)?;
        self.nodes.get(idx.index())
    }

    pub fn contains(&self, pointer: &JsonPointer) -> bool {
        self.index.contains_key(pointer)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn reference_count(&self) -> usize {
        self.references.edge_count()
    }

    /// All nodes in document order
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    /// Pointers of every token and alias in document order
    pub fn tokens(&self) -> Vec<&JsonPointer> {
        self.nodes
            .iter()
            .filter(|n| n.kind() != GraphNodeKind::Collection)
            .map(GraphNode::pointer)
            .collect()
    }

    /// Overrides targeting a pointer, in declaration order
    pub fn overrides_for(&self, pointer: &JsonPointer) -> impl Iterator<Item = &GraphOverrideNode> {
        self.overrides_by_token
            .get(pointer)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.overrides.get(i))
    }

    /// Immediate outgoing internal references
    pub fn references_out(&self, pointer: &JsonPointer) -> Vec<(&JsonPointer, ReferenceKind)> {
        self.neighbours(pointer, Direction::Outgoing)
    }

    /// Immediate incoming internal references
    pub fn references_in(&self, pointer: &JsonPointer) -> Vec<(&JsonPointer, ReferenceKind)> {
        self.neighbours(pointer, Direction::Incoming)
    }

    fn neighbours(&self, pointer: &JsonPointer, direction: Direction) -> Vec<(&JsonPointer, ReferenceKind)> {
        let Some(&idx) = self.index.get(pointer) else {
            return Vec::new();
        };

        self.references
            .edges_directed(idx, direction)
            .filter_map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                self.references.node_weight(other).map(|p| (p, *e.weight()))
            })
            .collect()
    }

    /// Every external reference declared anywhere in the document
    pub fn external_targets(&self) -> Vec<&GraphReferenceField> {
        let mut out = Vec::new();
        for node in &self.nodes {
            if let GraphNode::Alias(alias) = node {
                out.push(&alias.reference);
            }
            out.extend(node.base().replacement.as_ref());
        }
        for entry in &self.overrides {
            out.extend(entry.references());
        }
        out.retain(|field| field.target.external);
        out
    }

    /// Export internal references in Graphviz DOT format
    pub fn to_dot(&self) -> String {
        let mut output = String::new();

        output.push_str("digraph DocumentGraph {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push_str("  edge [fontname=\"Helvetica\", fontsize=8, fontcolor=\"#808080\"];\n");
        output.push('\n');

        for node in &self.nodes {
            let color = match node.kind() {
                GraphNodeKind::Collection => "#E0E0E0",
                GraphNodeKind::Token => "#80CBC4",
                GraphNodeKind::Alias => "#FFCC80",
            };
            let label = match node.declared_type() {
                Some(ty) => format!("{}\\n{}", node.pointer(), ty.value),
                None => node.pointer().to_string(),
            };
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\", fillcolor=\"{}\"];\n",
                node.pointer(),
                label.replace('"', "\\\""),
                color
            ));
        }

        output.push('\n');

        for edge in self.references.edge_references() {
            if let (Some(source), Some(target)) = (
                self.references.node_weight(edge.source()),
                self.references.node_weight(edge.target()),
            ) {
                output.push_str(&format!(
                    "  \"{}\" -> \"{}\" [label=\"{}\"];\n",
                    source,
                    target,
                    edge.weight()
                ));
            }
        }

        output.push_str("}\n");
        output
    }
}
