//! DTIF Core
//!
//! Parsing and resolution pipeline for Design Token Interchange Format
//! documents: JSON/YAML trees of design tokens with aliases, conditional
//! overrides, fallback chains and extension namespaces.
//!
//! ## Features
//!
//! - **Normalization**: Decoded documents become a typed AST with provenance on every field
//! - **Document Graph**: Pointer-indexed nodes with two-pass reference validation
//! - **Resolution**: Memoized alias/override/fallback walk with cycle and depth guards
//! - **External Documents**: Sequential breadth-first crawl through a loader capability
//! - **Diagnostics**: Stable namespaced codes with pointer and span for every problem
//!
//! ## Architecture
//!
//! ```text
//! DocumentHandle ──Decoder──▶ DecodedDocument ──SchemaGuard──▶ normalize()
//!                                                                   │
//!                                                              DocumentAst
//!                                                                   │
//!                                                        build_document_graph()
//!                                                                   │
//!                       ExternalGraphSet ◀── crawl ── DocumentGraph ┤
//!                                │                                  │
//!                                └──────────▶ DocumentResolver::resolve(pointer)
//!                                                                   │
//!                                                    ResolvedToken + diagnostics
//! ```

pub mod ast;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod external;
pub mod graph;
pub mod logging;
pub mod normalizer;
pub mod pipeline;
pub mod pointer;
pub mod resolver;

pub use ast::{AstNode, DocumentAst, Field, NodeMetadata};
pub use cache::{content_hash, CachedDocument, CacheVariant, ContentHash, DocumentIdentity};
pub use config::DtifConfig;
pub use diagnostics::{Diagnostic, DiagnosticCode, Diagnostics, Severity};
pub use document::{DecodedDocument, Decoder, DocumentHandle, DocumentLoader, LoadOptions, SchemaGuard};
pub use error::{DtifError, Result};
pub use external::ExternalGraphSet;
pub use graph::{build_document_graph, DocumentGraph, GraphNode, GraphNodeKind};
pub use normalizer::{normalize, ExtensionCollector, NormalizeOptions, NormalizeResult};
pub use pipeline::{ParsedDocument, Pipeline};
pub use pointer::{JsonPointer, SourceMap, SourceSpan};
pub use resolver::{DocumentResolver, ResolveResult, ResolvedToken, ResolverOptions, TraceKind, TransformEntry};
