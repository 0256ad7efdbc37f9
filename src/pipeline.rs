//! Pipeline
//!
//! Wires the host capabilities (decoder, schema guard, loader, plugins) to the
//! core stages: decode, validate, normalise, build the graph, then hand out
//! resolvers. Every stage reports through diagnostics; a stage that cannot
//! produce output leaves the later fields of [`ParsedDocument`] empty.

use std::sync::Arc;
use url::Url;

use crate::cache::{CachedDocument, DocumentIdentity};
use crate::config::DtifConfig;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::document::{DecodedDocument, Decoder, DocumentHandle, DocumentLoader, LoadOptions, PermissiveSchemaGuard, SchemaGuard};
use crate::external::{self, ExternalGraphSet};
use crate::graph::{build_document_graph, DocumentGraph};
use crate::normalizer::{normalize, ExtensionCollector, ExtensionEvaluation, NormalizeOptions};
use crate::pointer::JsonPointer;
use crate::resolver::{DocumentResolver, ResolverOptions, TransformEntry};

/// Everything known about one document after parsing
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub identity: Option<DocumentIdentity>,
    pub document: Option<Arc<DecodedDocument>>,
    pub graph: Option<Arc<DocumentGraph>>,
    pub diagnostics: Vec<Diagnostic>,
    pub extensions: Vec<ExtensionEvaluation>,
    /// AST came from a [`CachedDocument`]
    pub from_cache: bool,
    /// Fresh normalization output for the host's document cache
    pub cache_entry: Option<CachedDocument>,
}

impl ParsedDocument {
    fn failed(identity: Option<DocumentIdentity>, diagnostic: Diagnostic) -> Self {
        Self {
            identity,
            diagnostics: vec![diagnostic],
            ..Self::default()
        }
    }

    pub fn uri(&self) -> Option<&Url> {
        self.identity.as_ref().map(|i| &i.uri)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

pub struct Pipeline {
    decoder: Arc<dyn Decoder>,
    schema_guard: Arc<dyn SchemaGuard>,
    loader: Arc<dyn DocumentLoader>,
    extension_collector: Option<Arc<dyn ExtensionCollector>>,
    transforms: Vec<Arc<dyn TransformEntry>>,
    config: DtifConfig,
}

impl Pipeline {
    pub fn new(decoder: Arc<dyn Decoder>, loader: Arc<dyn DocumentLoader>) -> Self {
        Self {
            decoder,
            schema_guard: Arc::new(PermissiveSchemaGuard),
            loader,
            extension_collector: None,
            transforms: Vec::new(),
            config: DtifConfig::default(),
        }
    }

    pub fn with_schema_guard(mut self, guard: Arc<dyn SchemaGuard>) -> Self {
        self.schema_guard = guard;
        self
    }

    pub fn with_extension_collector(mut self, collector: Arc<dyn ExtensionCollector>) -> Self {
        self.extension_collector = Some(collector);
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn TransformEntry>) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn with_config(mut self, config: DtifConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DtifConfig {
        &self.config
    }

    pub(crate) fn loader(&self) -> &dyn DocumentLoader {
        self.loader.as_ref()
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    /// Decode a loaded handle, then parse it
    pub fn parse_handle(&self, handle: &DocumentHandle, cached: Option<&CachedDocument>) -> ParsedDocument {
        let identity = DocumentIdentity::new(handle.uri.clone(), &handle.text);

        match self.decoder.decode(handle) {
            Ok(document) => self.parse_decoded(document, cached),
            Err(e) => {
                tracing::warn!(uri = %handle.uri, error = %e, "decode failed");
                ParsedDocument::failed(
                    Some(identity),
                    Diagnostic::new(
                        DiagnosticCode::DecodeFailed,
                        format!("failed to decode {}: {:#}", handle.uri, e),
                    )
                    .with_pointer(JsonPointer::root()),
                )
            }
        }
    }

    /// Validate, normalise and build the graph of a decoded document
    ///
    /// A `cached` entry whose identity matches the document replaces schema
    /// validation and normalization.
    pub fn parse_decoded(&self, document: DecodedDocument, cached: Option<&CachedDocument>) -> ParsedDocument {
        let identity = DocumentIdentity::new(document.uri.clone(), &document.text);
        let document = Arc::new(document);

        let mut parsed = ParsedDocument {
            identity: Some(identity.clone()),
            document: Some(Arc::clone(&document)),
            ..ParsedDocument::default()
        };

        let ast = match cached.filter(|entry| entry.is_valid_for(&identity)) {
            Some(entry) => {
                tracing::debug!(uri = %identity.uri, "reusing cached AST");
                parsed.from_cache = true;
                parsed.diagnostics.extend(entry.diagnostics.iter().cloned());
                entry.ast.clone()
            }
            None => {
                let validation = self.schema_guard.validate(&document);
                parsed.diagnostics.extend(validation.diagnostics);
                if !validation.valid {
                    parsed.diagnostics.push(
                        Diagnostic::new(
                            DiagnosticCode::SchemaInvalid,
                            format!("{} failed schema validation", identity.uri),
                        )
                        .with_pointer(JsonPointer::root()),
                    );
                    return parsed;
                }

                let options = NormalizeOptions {
                    extension_collector: self.extension_collector.as_deref(),
                    max_nesting: self.config.normalizer.max_nesting,
                };
                let normalized = normalize(&document, &options);
                parsed.extensions = normalized.extensions;

                let Some(ast) = normalized.ast else {
                    parsed.diagnostics.extend(normalized.diagnostics);
                    return parsed;
                };

                parsed.cache_entry = Some(CachedDocument {
                    identity: identity.clone(),
                    ast: ast.clone(),
                    diagnostics: normalized.diagnostics.clone(),
                });
                parsed.diagnostics.extend(normalized.diagnostics);
                ast
            }
        };

        let built = build_document_graph(ast);
        parsed.diagnostics.extend(built.diagnostics);
        parsed.graph = built.graph.map(Arc::new);

        tracing::debug!(
            uri = %identity.uri,
            nodes = parsed.graph.as_ref().map(|g| g.node_count()).unwrap_or(0),
            diagnostics = parsed.diagnostics.len(),
            "parsed document"
        );
        parsed
    }

    /// Load, decode and parse a document through the loader capability
    pub async fn load_document(&self, input: &str, options: &LoadOptions) -> ParsedDocument {
        match self.loader.load(input, options).await {
            Ok(handle) => self.parse_handle(&handle, None),
            Err(e) => {
                tracing::warn!(input, error = %e, "load failed");
                ParsedDocument::failed(
                    None,
                    Diagnostic::new(DiagnosticCode::LoadFailed, format!("failed to load {}: {:#}", input, e)),
                )
            }
        }
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Crawl every document reachable through external references
    pub async fn load_externals(&self, root: &DocumentGraph) -> ExternalGraphSet {
        external::load_external_graphs(self, root).await
    }

    /// Resolver for a parsed document, configured from the pipeline config
    pub fn resolver_for(&self, parsed: &ParsedDocument, externals: Option<&ExternalGraphSet>) -> Option<DocumentResolver> {
        let graph = parsed.graph.as_ref()?;

        let mut options = ResolverOptions::from_config(&self.config.resolver);
        options.document = parsed.document.clone();
        options.transforms = self.transforms.clone();
        if let Some(externals) = externals {
            options.external_graphs = externals.graphs.clone();
        }

        Some(DocumentResolver::new(Arc::clone(graph), options))
    }
}
