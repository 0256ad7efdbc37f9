//! External document crawl
//!
//! Breadth-first walk over external references starting at a root graph.
//! Documents are loaded one at a time in discovery order, so diagnostics come
//! out in a stable order and no URI is ever fetched twice. A document that
//! fails to load, decode or validate is reported and its branch skipped.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use url::Url;

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::document::LoadOptions;
use crate::graph::{DocumentGraph, GraphReferenceField};
use crate::pipeline::Pipeline;

/// Graphs loaded by a crawl, keyed by fragment-free URI
#[derive(Debug, Clone, Default)]
pub struct ExternalGraphSet {
    pub graphs: HashMap<String, Arc<DocumentGraph>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ExternalGraphSet {
    pub fn get(&self, uri: &Url) -> Option<&Arc<DocumentGraph>> {
        self.graphs.get(uri.as_str())
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

/// A document waiting to be loaded and the reference that discovered it
struct Queued {
    uri: Url,
    referrer: Url,
    field: GraphReferenceField,
}

struct Crawl {
    visited: HashSet<String>,
    queue: VecDeque<Queued>,
    diagnostics: Vec<Diagnostic>,
    max_documents: usize,
    allow_network: bool,
    queued: usize,
    limit_reported: bool,
}

impl Crawl {
    fn enqueue(&mut self, graph: &DocumentGraph) {
        for field in graph.external_targets() {
            let uri = &field.target.uri;
            if !self.visited.insert(uri.to_string()) {
                continue;
            }

            if field.target.is_network() && !self.allow_network {
                self.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticCode::NetworkReferenceSkipped,
                        format!("network document {} not loaded; network references are disabled", uri),
                    )
                    .at(&field.pointer, field.span.as_ref()),
                );
                continue;
            }

            if self.queued >= self.max_documents {
                if !self.limit_reported {
                    self.limit_reported = true;
                    tracing::warn!(limit = self.max_documents, "external document limit reached");
                    self.diagnostics.push(
                        Diagnostic::new(
                            DiagnosticCode::DocumentLimit,
                            format!(
                                "external document limit of {} reached; {} and later documents skipped",
                                self.max_documents, uri
                            ),
                        )
                        .at(&field.pointer, field.span.as_ref()),
                    );
                }
                continue;
            }

            tracing::debug!(uri = %uri, from = %graph.uri, "queued external document");
            self.queued += 1;
            self.queue.push_back(Queued {
                uri: uri.clone(),
                referrer: graph.uri.clone(),
                field: field.clone(),
            });
        }
    }
}

/// Load every document transitively referenced from `root`
pub async fn load_external_graphs(pipeline: &Pipeline, root: &DocumentGraph) -> ExternalGraphSet {
    let config = pipeline.config();
    let mut crawl = Crawl {
        visited: HashSet::from([root.uri.to_string()]),
        queue: VecDeque::new(),
        diagnostics: Vec::new(),
        max_documents: config.crawl.max_documents,
        allow_network: config.resolver.allow_network_references,
        queued: 0,
        limit_reported: false,
    };
    let mut graphs: HashMap<String, Arc<DocumentGraph>> = HashMap::new();

    crawl.enqueue(root);

    while let Some(next) = crawl.queue.pop_front() {
        let options = LoadOptions {
            base_uri: Some(next.referrer.clone()),
        };

        let handle = match pipeline.loader().load(next.uri.as_str(), &options).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(uri = %next.uri, error = %e, "skipping external document");
                crawl.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticCode::LoadFailed,
                        format!("failed to load {}: {:#}", next.uri, e),
                    )
                    .at(&next.field.pointer, next.field.span.as_ref()),
                );
                continue;
            }
        };

        let parsed = pipeline.parse_handle(&handle, None);
        crawl.diagnostics.extend(parsed.diagnostics);

        let Some(graph) = parsed.graph else {
            tracing::warn!(uri = %next.uri, "skipping external document without a graph");
            continue;
        };

        tracing::debug!(uri = %next.uri, nodes = graph.node_count(), "loaded external document");

        crawl.visited.insert(graph.uri.to_string());
        crawl.enqueue(&graph);
        if graph.uri != next.uri {
            graphs.insert(graph.uri.to_string(), Arc::clone(&graph));
        }
        graphs.insert(next.uri.to_string(), graph);
    }

    ExternalGraphSet {
        graphs,
        diagnostics: crawl.diagnostics,
    }
}
