//! Reference Graph Analysis
//!
//! Static view of the validated internal references: strongly connected
//! components (alias loops the resolver will report as cycles) and transitive
//! dependency closures.

use petgraph::algo::kosaraju_scc;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::DocumentGraph;
use crate::pointer::JsonPointer;

// =============================================================================
// Cycles
// =============================================================================

/// A strongly connected group of nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceCycle {
    pub id: usize,
    /// Members in document order
    pub members: Vec<JsonPointer>,
    /// Single node referencing itself
    pub is_self_referential: bool,
}

/// SCC analysis of a document graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceAnalysis {
    /// Only groups that actually loop (more than one member, or a self edge)
    pub cycles: Vec<ReferenceCycle>,
    membership: HashMap<JsonPointer, usize>,
}

impl ReferenceAnalysis {
    pub fn is_cyclic(&self, pointer: &JsonPointer) -> bool {
        self.membership.contains_key(pointer)
    }

    pub fn cycle_for(&self, pointer: &JsonPointer) -> Option<&ReferenceCycle> {
        let id = *self.membership.get(pointer)?;
        self.cycles.get(id)
    }

    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }
}

/// Compute reference cycles for a graph
pub fn compute_reference_analysis(graph: &DocumentGraph) -> ReferenceAnalysis {
    let mut analysis = ReferenceAnalysis::default();

    for scc in kosaraju_scc(&graph.references) {
        let is_self_referential = scc.len() == 1
            && graph
                .references
                .edges_directed(scc[0], Direction::Outgoing)
                .any(|e| e.target() == scc[0]);

        if scc.len() == 1 && !is_self_referential {
            continue;
        }

        let mut indices = scc;
        indices.sort();

        let id = analysis.cycles.len();
        let members: Vec<JsonPointer> = indices
            .iter()
            .filter_map(|idx| graph.references.node_weight(*idx).cloned())
            .collect();

        for member in &members {
            analysis.membership.insert(member.clone(), id);
        }
        analysis.cycles.push(ReferenceCycle {
            id,
            members,
            is_self_referential,
        });
    }

    analysis
}

// =============================================================================
// Closure
// =============================================================================

/// Node in a closure result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureNode {
    pub pointer: JsonPointer,
    pub depth: usize,
}

/// Transitive dependencies (`Outgoing`) or dependents (`Incoming`) of a node
///
/// The start node is excluded. Results are sorted by depth; each node is
/// reported at the depth it was first reached.
pub fn dependency_closure(
    graph: &DocumentGraph,
    pointer: &JsonPointer,
    direction: Direction,
    max_depth: Option<usize>,
) -> Vec<ClosureNode> {
    let Some(&start) = graph.index.get(pointer) else {
        return Vec::new();
    };

    let mut result = Vec::new();
    let mut visited = HashSet::new();
    let mut queue = std::collections::VecDeque::from([(start, 0usize)]);

    while let Some((idx, depth)) = queue.pop_front() {
        if max_depth.is_some_and(|max| depth > max) {
            continue;
        }
        if !visited.insert(idx) {
            continue;
        }

        if idx != start {
            if let Some(p) = graph.references.node_weight(idx) {
                result.push(ClosureNode {
                    pointer: p.clone(),
                    depth,
                });
            }
        }

        for edge in graph.references.edges_directed(idx, direction) {
            let next = match direction {
                Direction::Outgoing => edge.target(),
                Direction::Incoming => edge.source(),
            };
            queue.push_back((next, depth + 1));
        }
    }

    result.sort_by_key(|n| n.depth);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DecodedDocument;
    use crate::graph::build_document_graph;
    use crate::normalizer::{normalize, NormalizeOptions};
    use serde_json::{json, Value};
    use url::Url;

    fn graph(data: Value) -> DocumentGraph {
        let doc = DecodedDocument::from_value(Url::parse("file:///a.json").unwrap(), data);
        let ast = normalize(&doc, &NormalizeOptions::default()).ast.unwrap();
        build_document_graph(ast).graph.unwrap()
    }

    fn ptr(s: &str) -> JsonPointer {
        JsonPointer::parse(s).unwrap()
    }

    #[test]
    fn test_detects_alias_loop() {
        let g = graph(json!({
            "a": { "$type": "color", "$ref": "#/b" },
            "b": { "$type": "color", "$ref": "#/a" },
            "c": { "$type": "color", "$value": "#fff" }
        }));

        let analysis = compute_reference_analysis(&g);
        assert_eq!(analysis.cycles.len(), 1);
        assert_eq!(analysis.cycles[0].members, vec![ptr("#/a"), ptr("#/b")]);
        assert!(analysis.is_cyclic(&ptr("#/a")));
        assert!(!analysis.is_cyclic(&ptr("#/c")));
    }

    #[test]
    fn test_self_reference() {
        let g = graph(json!({ "a": { "$type": "color", "$ref": "#/a" } }));
        let analysis = compute_reference_analysis(&g);
        assert!(analysis.cycle_for(&ptr("#/a")).unwrap().is_self_referential);
    }

    #[test]
    fn test_closure_depths() {
        let g = graph(json!({
            "base": { "$type": "color", "$value": "#000" },
            "mid": { "$type": "color", "$ref": "#/base" },
            "top": { "$type": "color", "$ref": "#/mid" }
        }));

        let deps = dependency_closure(&g, &ptr("#/top"), Direction::Outgoing, None);
        let summary: Vec<_> = deps.iter().map(|n| (n.pointer.as_str(), n.depth)).collect();
        assert_eq!(summary, vec![("#/mid", 1), ("#/base", 2)]);

        let dependents = dependency_closure(&g, &ptr("#/base"), Direction::Incoming, Some(1));
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].pointer, ptr("#/mid"));
    }
}
