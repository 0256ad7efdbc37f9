//! Graph Builder
//!
//! Two passes over a [`DocumentAst`]:
//!
//! 1. Depth-first walk creating one node per AST node, resolving every
//!    reference string against the document URI and recording internal
//!    references as pending.
//! 2. Pending references are checked against the finished index
//!    (`graph.MISSING_TARGET`, `graph.INVALID_TARGET_KIND`) and the valid ones
//!    become edges of the reference graph.

use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use url::Url;

use super::{
    DocumentGraph, GraphAliasNode, GraphCollectionNode, GraphFallbackNode, GraphNode, GraphNodeBase,
    GraphNodeKind, GraphOverrideNode, GraphReferenceField, GraphReferenceTarget, GraphTokenNode,
    ReferenceKind,
};
use crate::ast::{AstNode, DocumentAst, Field, NodeMetadata, OverrideFallbackNode, OverrideNode};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::pointer::{JsonPointer, SourceSpan};

/// Output of [`build_document_graph`]
#[derive(Debug, Clone, Default)]
pub struct GraphBuildResult {
    pub graph: Option<DocumentGraph>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Internal reference awaiting target validation
struct PendingReference {
    /// Node whose behavior depends on the target (edge source)
    from: Option<JsonPointer>,
    field: GraphReferenceField,
    kind: ReferenceKind,
    /// Missing or wrongly-typed targets are reported only when required
    required: bool,
}

/// Build the pointer-indexed graph of a normalized document
pub fn build_document_graph(ast: DocumentAst) -> GraphBuildResult {
    let mut uri = ast.uri.clone();
    uri.set_fragment(None);

    if uri.cannot_be_a_base() {
        let diagnostic = Diagnostic::new(
            DiagnosticCode::InvalidDocumentUri,
            format!("document URI '{}' cannot anchor relative references", ast.uri),
        )
        .at(&ast.pointer, ast.span.as_ref());
        return GraphBuildResult {
            graph: None,
            diagnostics: vec![diagnostic],
        };
    }

    let mut builder = GraphBuilder {
        uri,
        nodes: Vec::new(),
        index: HashMap::new(),
        references: DiGraph::new(),
        diagnostics: Diagnostics::new(),
        pending: Vec::new(),
    };

    let mut root_pointers = Vec::with_capacity(ast.children.len());
    for child in &ast.children {
        if let Some(pointer) = builder.visit(child, None) {
            root_pointers.push(pointer);
        }
    }

    let mut overrides = Vec::with_capacity(ast.overrides.len());
    for entry in &ast.overrides {
        if let Some(node) = builder.override_node(entry) {
            overrides.push(node);
        }
    }

    builder.validate_pending_references();

    let mut overrides_by_token: HashMap<JsonPointer, Vec<usize>> = HashMap::new();
    for (i, entry) in overrides.iter().enumerate() {
        overrides_by_token
            .entry(entry.token.target.pointer.clone())
            .or_default()
            .push(i);
    }

    tracing::debug!(
        uri = %builder.uri,
        nodes = builder.nodes.len(),
        references = builder.references.edge_count(),
        overrides = overrides.len(),
        diagnostics = builder.diagnostics.len(),
        "built document graph"
    );

    let graph = DocumentGraph {
        uri: builder.uri,
        ast,
        nodes: builder.nodes,
        index: builder.index,
        references: builder.references,
        root_pointers,
        overrides,
        overrides_by_token,
    };

    GraphBuildResult {
        graph: Some(graph),
        diagnostics: builder.diagnostics.into_vec(),
    }
}

struct GraphBuilder {
    uri: Url,
    nodes: Vec<GraphNode>,
    index: HashMap<JsonPointer, NodeIndex>,
    references: DiGraph<JsonPointer, ReferenceKind>,
    diagnostics: Diagnostics,
    pending: Vec<PendingReference>,
}

impl GraphBuilder {
    // =========================================================================
    // Pass 1: nodes
    // =========================================================================

    /// Add a node (and its subtree); returns its pointer if it was accepted
    fn visit(&mut self, node: &AstNode, parent: Option<&JsonPointer>) -> Option<JsonPointer> {
        let pointer = node.pointer().clone();

        if self.index.contains_key(&pointer) {
            self.diagnostics.report(
                DiagnosticCode::DuplicatePointer,
                format!("pointer {} is declared more than once", pointer),
                &pointer,
                node.span(),
            );
            return None;
        }

        let alias_reference = match node {
            AstNode::Alias(alias) => Some(self.resolve_reference(&alias.reference)?),
            _ => None,
        };
        let base = self.base(node, parent);

        let graph_node = match (node, alias_reference) {
            (AstNode::Alias(alias), Some(reference)) => {
                if !reference.target.external {
                    self.pending.push(PendingReference {
                        from: Some(pointer.clone()),
                        field: reference.clone(),
                        kind: ReferenceKind::Alias,
                        required: true,
                    });
                }
                GraphNode::Alias(GraphAliasNode {
                    base,
                    token_type: alias.token_type.clone(),
                    reference,
                })
            }
            (AstNode::Token(token), _) => GraphNode::Token(GraphTokenNode {
                base,
                token_type: token.token_type.clone(),
                value: token.value.clone(),
            }),
            (_, _) => GraphNode::Collection(GraphCollectionNode {
                base,
                children: Vec::new(),
            }),
        };

        let idx = self.references.add_node(pointer.clone());
        debug_assert_eq!(idx.index(), self.nodes.len());
        self.nodes.push(graph_node);
        self.index.insert(pointer.clone(), idx);

        if let AstNode::Collection(collection) = node {
            let children: Vec<JsonPointer> = collection
                .children
                .iter()
                .filter_map(|child| self.visit(child, Some(&pointer)))
                .collect();
            if let Some(GraphNode::Collection(c)) = self.nodes.get_mut(idx.index()) {
                c.children = children;
            }
        }

        Some(pointer)
    }

    fn base(&mut self, node: &AstNode, parent: Option<&JsonPointer>) -> GraphNodeBase {
        let metadata: &NodeMetadata = node.metadata();
        let replacement = metadata
            .replacement()
            .and_then(|field| self.resolve_reference(field));

        if let Some(field) = &replacement {
            if !field.target.external {
                self.pending.push(PendingReference {
                    from: Some(node.pointer().clone()),
                    field: field.clone(),
                    kind: ReferenceKind::Replacement,
                    required: true,
                });
            }
        }

        GraphNodeBase {
            name: node.name().to_string(),
            pointer: node.pointer().clone(),
            span: node.span().cloned(),
            parent: parent.cloned(),
            metadata: metadata.clone(),
            replacement,
        }
    }

    // =========================================================================
    // Overrides
    // =========================================================================

    fn override_node(&mut self, entry: &OverrideNode) -> Option<GraphOverrideNode> {
        let token = self.resolve_reference(&entry.token)?;

        if token.target.external {
            self.diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::ExternalOverrideTarget,
                    format!("override target {} is outside this document; override ignored", token.raw),
                )
                .at(&token.pointer, token.span.as_ref()),
            );
            return None;
        }

        self.pending.push(PendingReference {
            from: None,
            field: token.clone(),
            kind: ReferenceKind::Override,
            required: true,
        });

        let owner = token.target.pointer.clone();
        let reference = entry
            .reference
            .as_ref()
            .and_then(|field| self.resolve_reference(field));
        if let Some(field) = &reference {
            self.track_payload(&owner, field, ReferenceKind::Override);
        }

        Some(GraphOverrideNode {
            pointer: entry.pointer.clone(),
            span: entry.span.clone(),
            token,
            when: entry.when.clone(),
            reference,
            value: entry.value.clone(),
            fallback: self.fallback_nodes(&owner, &entry.fallback),
        })
    }

    fn fallback_nodes(&mut self, owner: &JsonPointer, chain: &[OverrideFallbackNode]) -> Vec<GraphFallbackNode> {
        chain
            .iter()
            .map(|entry| {
                let reference = entry
                    .reference
                    .as_ref()
                    .and_then(|field| self.resolve_reference(field));
                if let Some(field) = &reference {
                    self.track_payload(owner, field, ReferenceKind::Fallback);
                }
                GraphFallbackNode {
                    pointer: entry.pointer.clone(),
                    span: entry.span.clone(),
                    reference,
                    value: entry.value.clone(),
                    fallback: self.fallback_nodes(owner, &entry.fallback),
                }
            })
            .collect()
    }

    /// Override payload references only contribute edges; the resolver
    /// reports bad targets when (and if) it follows them
    fn track_payload(&mut self, owner: &JsonPointer, field: &GraphReferenceField, kind: ReferenceKind) {
        if field.target.external {
            return;
        }
        self.pending.push(PendingReference {
            from: Some(owner.clone()),
            field: field.clone(),
            kind,
            required: false,
        });
    }

    // =========================================================================
    // Reference resolution
    // =========================================================================

    /// Resolve a reference string against the document URI
    fn resolve_reference(&mut self, field: &Field<String>) -> Option<GraphReferenceField> {
        let joined = match self.uri.join(&field.value) {
            Ok(url) => url,
            Err(e) => {
                self.report_field(
                    DiagnosticCode::InvalidReference,
                    format!("reference '{}' is not a valid URI reference: {}", field.value, e),
                    field,
                );
                return None;
            }
        };

        let pointer = match joined.fragment() {
            Some(fragment) => match JsonPointer::from_fragment(fragment) {
                Ok(pointer) => pointer,
                Err(e) => {
                    self.report_field(DiagnosticCode::InvalidPointer, e.to_string(), field);
                    return None;
                }
            },
            None => JsonPointer::root(),
        };

        let mut target_uri = joined;
        target_uri.set_fragment(None);
        let external = target_uri != self.uri;

        Some(GraphReferenceField {
            target: GraphReferenceTarget {
                uri: target_uri,
                pointer,
                external,
            },
            raw: field.value.clone(),
            pointer: field.pointer.clone(),
            span: field.span.clone(),
        })
    }

    fn report_field<T>(&mut self, code: DiagnosticCode, message: String, field: &Field<T>) {
        self.diagnostics.report(code, message, &field.pointer, field.span.as_ref());
    }

    // =========================================================================
    // Pass 2: reference validation
    // =========================================================================

    fn validate_pending_references(&mut self) {
        let pending = std::mem::take(&mut self.pending);

        for reference in pending {
            let target = &reference.field.target.pointer;

            let Some(&target_idx) = self.index.get(target) else {
                if reference.required {
                    self.report_target(
                        &reference,
                        DiagnosticCode::MissingTarget,
                        format!("reference {} does not resolve to any node", reference.field.raw),
                    );
                }
                continue;
            };

            let kind = self.nodes[target_idx.index()].kind();
            if !GraphNodeKind::REFERENCEABLE.contains(&kind) {
                if reference.required {
                    self.report_target(
                        &reference,
                        DiagnosticCode::InvalidTargetKind,
                        format!(
                            "reference {} points at a {}; expected a token or alias",
                            reference.field.raw, kind
                        ),
                    );
                }
                continue;
            }

            if let Some(source_idx) = reference.from.as_ref().and_then(|p| self.index.get(p)) {
                self.references.add_edge(*source_idx, target_idx, reference.kind);
            }
        }
    }

    fn report_target(&mut self, reference: &PendingReference, code: DiagnosticCode, message: String) {
        let mut diagnostic = Diagnostic::new(code, message)
            .at(&reference.field.pointer, reference.field.span.as_ref());
        if let Some(from) = &reference.from {
            let span: Option<SourceSpan> = self.index.get(from).and_then(|idx| self.nodes[idx.index()].base().span.clone());
            diagnostic = diagnostic.with_related(format!("declared on {}", from), Some(from.clone()), span);
        }
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DecodedDocument;
    use crate::normalizer::{normalize, NormalizeOptions};
    use serde_json::{json, Value};

    fn build(uri: &str, data: Value) -> GraphBuildResult {
        let doc = DecodedDocument::from_value(Url::parse(uri).unwrap(), data);
        let ast = normalize(&doc, &NormalizeOptions::default()).ast.unwrap();
        build_document_graph(ast)
    }

    fn codes(result: &GraphBuildResult) -> Vec<DiagnosticCode> {
        result.diagnostics.iter().map(|d| d.code).collect()
    }

    fn ptr(s: &str) -> JsonPointer {
        JsonPointer::parse(s).unwrap()
    }

    #[test]
    fn test_builds_nodes_in_document_order() {
        let result = build(
            "file:///tokens.json",
            json!({
                "color": {
                    "brand": { "$type": "color", "$value": "#00f" },
                    "accent": { "$type": "color", "$ref": "#/color/brand" }
                },
                "size": { "$type": "dimension", "$value": { "value": 4, "unit": "px" } }
            }),
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);

        let graph = result.graph.unwrap();
        assert_eq!(graph.root_pointers, vec![ptr("#/color"), ptr("#/size")]);
        let order: Vec<_> = graph.nodes().map(|n| n.pointer().as_str().to_string()).collect();
        assert_eq!(order, vec!["#/color", "#/color/brand", "#/color/accent", "#/size"]);

        let Some(GraphNode::Collection(color)) = graph.node(&ptr("#/color")) else {
            panic!("expected collection");
        };
        assert_eq!(color.children.len(), 2);

        let accent = graph.node(&ptr("#/color/accent")).unwrap();
        assert_eq!(accent.base().parent, Some(ptr("#/color")));
        assert_eq!(graph.references_out(&ptr("#/color/accent")), vec![(&ptr("#/color/brand"), ReferenceKind::Alias)]);
        assert_eq!(graph.tokens().len(), 3);
    }

    #[test]
    fn test_missing_target_and_wrong_kind() {
        let result = build(
            "file:///tokens.json",
            json!({
                "group": { "inner": { "$type": "color", "$value": "#000" } },
                "a": { "$type": "color", "$ref": "#/nowhere" },
                "b": { "$type": "color", "$ref": "#/group" }
            }),
        );
        assert_eq!(
            codes(&result),
            vec![DiagnosticCode::MissingTarget, DiagnosticCode::InvalidTargetKind]
        );
        assert_eq!(result.diagnostics[0].pointer, Some(ptr("#/a/$ref")));
        assert_eq!(result.diagnostics[0].related[0].pointer, Some(ptr("#/a")));
        assert_eq!(result.graph.unwrap().reference_count(), 0);
    }

    #[test]
    fn test_external_references_are_not_validated() {
        let result = build(
            "file:///project/tokens.json",
            json!({
                "a": { "$type": "color", "$ref": "base.json#/color/red" },
                "b": { "$type": "color", "$ref": "tokens.json#/a" }
            }),
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);

        let graph = result.graph.unwrap();
        let Some(GraphNode::Alias(a)) = graph.node(&ptr("#/a")) else {
            panic!("expected alias");
        };
        assert!(a.reference.target.external);
        assert_eq!(a.reference.target.uri.as_str(), "file:///project/base.json");
        assert_eq!(a.reference.target.pointer, ptr("#/color/red"));

        let Some(GraphNode::Alias(b)) = graph.node(&ptr("#/b")) else {
            panic!("expected alias");
        };
        assert!(!b.reference.target.external);
        assert_eq!(graph.external_targets().len(), 1);
    }

    #[test]
    fn test_invalid_pointer_in_reference_drops_alias() {
        let result = build(
            "file:///tokens.json",
            json!({ "a": { "$type": "color", "$ref": "#color" } }),
        );
        assert_eq!(codes(&result), vec![DiagnosticCode::InvalidPointer]);
        assert!(result.graph.unwrap().node(&ptr("#/a")).is_none());
    }

    #[test]
    fn test_percent_encoded_fragment() {
        let result = build(
            "file:///tokens.json",
            json!({
                "space name": { "$type": "color", "$value": "#111" },
                "a": { "$type": "color", "$ref": "#/space%20name" }
            }),
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn test_override_targets() {
        let result = build(
            "file:///tokens.json",
            json!({
                "btn": { "$type": "color", "$value": "#fff" },
                "dark": { "$type": "color", "$value": "#000" },
                "$overrides": [
                    { "$token": "#/btn", "$when": { "theme": "dark" }, "$ref": "#/dark" },
                    { "$token": "#/ghost", "$when": { "theme": "dark" }, "$value": "#111" },
                    { "$token": "other.json#/btn", "$when": { "theme": "dark" }, "$value": "#222" }
                ]
            }),
        );
        assert_eq!(
            codes(&result),
            vec![DiagnosticCode::ExternalOverrideTarget, DiagnosticCode::MissingTarget]
        );

        let graph = result.graph.unwrap();
        assert_eq!(graph.overrides.len(), 2);
        assert_eq!(graph.overrides_for(&ptr("#/btn")).count(), 1);
        assert_eq!(graph.references_in(&ptr("#/dark")), vec![(&ptr("#/btn"), ReferenceKind::Override)]);
    }

    #[test]
    fn test_deprecated_replacement_is_validated() {
        let result = build(
            "file:///tokens.json",
            json!({
                "old": {
                    "$type": "color",
                    "$value": "#fff",
                    "$deprecated": { "$replacement": "#/missing" }
                }
            }),
        );
        assert_eq!(codes(&result), vec![DiagnosticCode::MissingTarget]);
    }

    #[test]
    fn test_to_dot_lists_nodes_and_edges() {
        let graph = build(
            "file:///tokens.json",
            json!({
                "a": { "$type": "color", "$value": "#fff" },
                "b": { "$type": "color", "$ref": "#/a" }
            }),
        )
        .graph
        .unwrap();

        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph DocumentGraph {"));
        assert!(dot.contains("\"#/b\" -> \"#/a\" [label=\"alias\"]"));
    }
}
