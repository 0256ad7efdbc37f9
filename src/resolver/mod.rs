//! Resolver
//!
//! Turns a pointer into a fully resolved token. The walk is a memoized
//! recursion over one [`DocumentGraph`] (plus any pre-loaded external graphs):
//!
//! - `cache` holds the finished state per `(document URI, pointer)` together
//!   with every pointer the walk touched and how deep below it went. An entry
//!   is reused only while none of those pointers is pending and the depth
//!   limit still leaves room, so a result never depends on what was resolved
//!   before it.
//! - `pending` holds the pointers on the current call stack; meeting one again
//!   is a cycle. States that met a pointer still pending further up the stack
//!   are never cached.
//! - A single depth counter is threaded through alias, override and fallback
//!   recursion. States cut short by the depth limit are never cached.
//!
//! Resolution never fails: problems surface as diagnostics on the result.

pub mod compat;
pub mod condition;
pub mod transform;

pub use condition::{Condition, ConditionSet};
pub use transform::{TransformContext, TransformEntry, TransformOutput, TransformResult};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::ast::Field;
use crate::config::ResolverConfig;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Severity};
use crate::document::DecodedDocument;
use crate::graph::{
    DocumentGraph, GraphFallbackNode, GraphNode, GraphNodeKind, GraphOverrideNode, GraphReferenceField,
};
use crate::pointer::{JsonPointer, SourceSpan};

pub const DEFAULT_MAX_DEPTH: usize = 32;

// =============================================================================
// Resolved Token
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    Token,
    Alias,
    Override,
    Fallback,
}

/// One hop of a resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub pointer: JsonPointer,
    pub uri: Url,
    pub kind: TraceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
}

/// Where the winning value is written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSource {
    pub uri: Url,
    pub pointer: JsonPointer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppliedOverrideKind {
    Override,
    Fallback,
}

/// An override or fallback entry that contributed to the value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedOverride {
    pub pointer: JsonPointer,
    pub kind: AppliedOverrideKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ValueSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedToken {
    pub pointer: JsonPointer,
    pub uri: Url,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// `None` when resolution failed (cycle, missing value, depth limit)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ValueSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides_applied: Vec<AppliedOverride>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Diagnostic>,
    pub trace: Vec<TraceStep>,
}

/// Output of [`DocumentResolver::resolve`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveResult {
    /// `None` for malformed or unknown pointers and for collections
    pub token: Option<ResolvedToken>,
    pub diagnostics: Vec<Diagnostic>,
    pub transforms: Vec<TransformResult>,
}

// =============================================================================
// Options
// =============================================================================

#[derive(Clone)]
pub struct ResolverOptions {
    /// Evaluation environment matched against `$when`
    pub context: Map<String, Value>,
    pub max_depth: usize,
    /// Source document handed to transforms
    pub document: Option<Arc<DecodedDocument>>,
    pub transforms: Vec<Arc<dyn TransformEntry>>,
    /// Pre-loaded graphs keyed by fragment-free URI
    pub external_graphs: HashMap<String, Arc<DocumentGraph>>,
    pub allow_network_references: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            context: Map::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            document: None,
            transforms: Vec::new(),
            external_graphs: HashMap::new(),
            allow_network_references: false,
        }
    }
}

impl fmt::Debug for ResolverOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverOptions")
            .field("context", &self.context)
            .field("max_depth", &self.max_depth)
            .field("document", &self.document.as_ref().map(|d| d.uri.as_str()))
            .field("transforms", &self.transforms.iter().map(|t| t.plugin()).collect::<Vec<_>>())
            .field("external_graphs", &self.external_graphs.keys().collect::<Vec<_>>())
            .field("allow_network_references", &self.allow_network_references)
            .finish()
    }
}

impl ResolverOptions {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            context: config.context.clone(),
            max_depth: config.max_depth,
            allow_network_references: config.allow_network_references,
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_external_graph(mut self, graph: Arc<DocumentGraph>) -> Self {
        self.external_graphs.insert(graph.uri.to_string(), graph);
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn TransformEntry>) -> Self {
        self.transforms.push(transform);
        self
    }
}

// =============================================================================
// Internal State
// =============================================================================

type CacheKey = (String, JsonPointer);

/// A finished state and what it was computed from
#[derive(Debug, Clone)]
struct CacheEntry {
    state: ResolutionState,
    /// Every pointer visited while computing `state`, itself included
    deps: HashSet<CacheKey>,
    /// Deepest recursion below the node, relative to its own depth
    height: usize,
}

#[derive(Debug, Clone, Default)]
struct ResolutionState {
    /// Pointer named a token or alias
    found: bool,
    token_type: Option<String>,
    value: Option<Value>,
    source: Option<ValueSource>,
    overrides_applied: Vec<AppliedOverride>,
    trace: Vec<TraceStep>,
    diagnostics: Vec<Diagnostic>,
    /// Cut short by the depth limit somewhere below
    truncated: bool,
}

impl ResolutionState {
    fn unresolved(found: bool, diagnostic: Diagnostic) -> Self {
        Self {
            found,
            diagnostics: vec![diagnostic],
            ..Self::default()
        }
    }

    /// Take over value, provenance and diagnostics of a resolved target
    fn absorb(&mut self, target: ResolutionState) {
        self.value = target.value;
        self.source = target.source;
        self.trace.extend(target.trace);
        self.overrides_applied.extend(target.overrides_applied);
        self.diagnostics.extend(target.diagnostics);
        self.truncated |= target.truncated;
    }

    fn into_token(self, uri: &Url, pointer: &JsonPointer) -> ResolvedToken {
        ResolvedToken {
            pointer: pointer.clone(),
            uri: uri.clone(),
            token_type: self.token_type,
            value: self.value,
            source: self.source,
            overrides_applied: self.overrides_applied,
            warnings: self
                .diagnostics
                .iter()
                .filter(|d| d.severity == Severity::Warning)
                .cloned()
                .collect(),
            trace: self.trace,
        }
    }
}

/// A usable override/fallback value
#[derive(Debug, Default)]
struct Payload {
    value: Value,
    source: Option<ValueSource>,
    token_type: Option<String>,
    trace: Vec<TraceStep>,
    applied: Vec<AppliedOverride>,
    diagnostics: Vec<Diagnostic>,
    truncated: bool,
}

/// Why no payload could be produced
#[derive(Debug, Default)]
struct PayloadFailure {
    diagnostics: Vec<Diagnostic>,
    truncated: bool,
}

impl PayloadFailure {
    fn merge(&mut self, other: PayloadFailure) {
        self.diagnostics.extend(other.diagnostics);
        self.truncated |= other.truncated;
    }
}

fn step(uri: &Url, pointer: &JsonPointer, kind: TraceKind, span: Option<&SourceSpan>) -> TraceStep {
    TraceStep {
        pointer: pointer.clone(),
        uri: uri.clone(),
        kind,
        span: span.cloned(),
    }
}

fn source_of(uri: &Url, field: &Field<Value>) -> ValueSource {
    ValueSource {
        uri: uri.clone(),
        pointer: field.pointer.clone(),
        span: field.span.clone(),
    }
}

// =============================================================================
// Document Resolver
// =============================================================================

/// Resolves pointers of one document graph
///
/// Holds a private memo cache; create a new resolver whenever the graph or
/// the options change.
pub struct DocumentResolver {
    graph: Arc<DocumentGraph>,
    options: ResolverOptions,
    cache: HashMap<CacheKey, CacheEntry>,
    pending: HashSet<CacheKey>,
    /// Pointers visited by the walk in progress
    touched: HashSet<CacheKey>,
    /// Deepest depth reached by the walk in progress
    deepest: usize,
    transformed: HashMap<JsonPointer, (Vec<TransformResult>, Vec<Diagnostic>)>,
}

impl DocumentResolver {
    pub fn new(graph: Arc<DocumentGraph>, options: ResolverOptions) -> Self {
        Self {
            graph,
            options,
            cache: HashMap::new(),
            pending: HashSet::new(),
            touched: HashSet::new(),
            deepest: 0,
            transformed: HashMap::new(),
        }
    }

    pub fn graph(&self) -> &Arc<DocumentGraph> {
        &self.graph
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve a pointer string (`#/a/b`, `/a/b`)
    pub fn resolve(&mut self, pointer: &str) -> ResolveResult {
        match JsonPointer::parse(pointer) {
            Ok(pointer) => self.resolve_pointer(&pointer),
            Err(e) => ResolveResult {
                token: None,
                diagnostics: vec![Diagnostic::new(DiagnosticCode::ResolverInvalidPointer, e.to_string())],
                transforms: Vec::new(),
            },
        }
    }

    pub fn resolve_pointer(&mut self, pointer: &JsonPointer) -> ResolveResult {
        let graph = Arc::clone(&self.graph);
        self.touched.clear();
        self.deepest = 0;
        let state = self.resolve_node(&graph, pointer, 0);

        let mut diagnostics = state.diagnostics.clone();
        if !state.found {
            return ResolveResult {
                token: None,
                diagnostics,
                transforms: Vec::new(),
            };
        }

        let token = state.into_token(&graph.uri, pointer);
        let transforms = if self.options.transforms.is_empty() {
            Vec::new()
        } else {
            let (results, transform_diagnostics) = self.transforms_for(&token);
            diagnostics.extend(transform_diagnostics);
            results
        };

        ResolveResult {
            token: Some(token),
            diagnostics,
            transforms,
        }
    }

    /// Resolve every token and alias in document order
    pub fn resolve_all(&mut self) -> Vec<(JsonPointer, ResolveResult)> {
        let pointers: Vec<JsonPointer> = self.graph.tokens().into_iter().cloned().collect();
        pointers
            .into_iter()
            .map(|pointer| {
                let result = self.resolve_pointer(&pointer);
                (pointer, result)
            })
            .collect()
    }

    fn transforms_for(&mut self, token: &ResolvedToken) -> (Vec<TransformResult>, Vec<Diagnostic>) {
        if let Some(cached) = self.transformed.get(&token.pointer) {
            return cached.clone();
        }

        let context = TransformContext {
            document: self.options.document.as_deref(),
        };
        let outcome = transform::run_transforms(&self.options.transforms, token, &context);
        self.transformed.insert(token.pointer.clone(), outcome.clone());
        outcome
    }

    // =========================================================================
    // Walk
    // =========================================================================

    fn resolve_node(&mut self, graph: &Arc<DocumentGraph>, pointer: &JsonPointer, depth: usize) -> ResolutionState {
        let key: CacheKey = (graph.uri.to_string(), pointer.clone());
        self.touched.insert(key.clone());
        self.deepest = self.deepest.max(depth);

        if let Some(entry) = self.cache.get(&key) {
            if depth + entry.height <= self.options.max_depth && entry.deps.is_disjoint(&self.pending) {
                self.deepest = self.deepest.max(depth + entry.height);
                self.touched.extend(entry.deps.iter().cloned());
                return entry.state.clone();
            }
        }

        let node = graph.node(pointer);
        let span = node.and_then(|n| n.base().span.as_ref());

        if self.pending.contains(&key) {
            return ResolutionState::unresolved(
                true,
                Diagnostic::new(
                    DiagnosticCode::CycleDetected,
                    format!("reference cycle detected at {}", pointer),
                )
                .at(pointer, span),
            );
        }

        if depth > self.options.max_depth {
            let mut state = ResolutionState::unresolved(
                true,
                Diagnostic::new(
                    DiagnosticCode::MaxDepthExceeded,
                    format!(
                        "resolution of {} exceeds the maximum depth of {}",
                        pointer, self.options.max_depth
                    ),
                )
                .at(pointer, span),
            );
            state.truncated = true;
            return state;
        }

        let node = match node {
            None => {
                let state = ResolutionState::unresolved(
                    false,
                    Diagnostic::new(
                        DiagnosticCode::UnknownPointer,
                        format!("{} does not exist in {}", pointer, graph.uri),
                    )
                    .with_pointer(pointer.clone()),
                );
                self.cache_leaf(key, &state);
                return state;
            }
            Some(GraphNode::Collection(collection)) => {
                let state = ResolutionState::unresolved(
                    false,
                    Diagnostic::new(
                        DiagnosticCode::InvalidNodeKind,
                        format!("{} is a collection and has no value", pointer),
                    )
                    .at(pointer, collection.base.span.as_ref()),
                );
                self.cache_leaf(key, &state);
                return state;
            }
            Some(node) => node,
        };

        tracing::trace!(uri = %graph.uri, pointer = %pointer, depth, "resolving pointer");

        let outer_touched = std::mem::take(&mut self.touched);
        let outer_deepest = std::mem::replace(&mut self.deepest, depth);

        self.pending.insert(key.clone());
        let state = self.evaluate(graph, node, depth);
        self.pending.remove(&key);

        let mut deps = std::mem::replace(&mut self.touched, outer_touched);
        deps.insert(key.clone());
        let height = self.deepest - depth;
        self.deepest = self.deepest.max(outer_deepest);
        self.touched.extend(deps.iter().cloned());

        // A walk that met a pointer pending further up only holds on this path
        if !state.truncated && deps.is_disjoint(&self.pending) {
            self.cache.insert(
                key,
                CacheEntry {
                    state: state.clone(),
                    deps,
                    height,
                },
            );
        }
        state
    }

    fn cache_leaf(&mut self, key: CacheKey, state: &ResolutionState) {
        let deps = HashSet::from([key.clone()]);
        self.cache.insert(
            key,
            CacheEntry {
                state: state.clone(),
                deps,
                height: 0,
            },
        );
    }

    fn evaluate(&mut self, graph: &Arc<DocumentGraph>, node: &GraphNode, depth: usize) -> ResolutionState {
        let base = node.base();
        let mut state = ResolutionState {
            found: true,
            ..ResolutionState::default()
        };

        match node {
            GraphNode::Token(token) => {
                state.trace.push(step(&graph.uri, &base.pointer, TraceKind::Token, base.span.as_ref()));
                state.token_type = token.token_type.as_ref().map(|t| t.value.clone());
                match &token.value {
                    Some(field) => {
                        state.value = Some(field.value.clone());
                        state.source = Some(source_of(&graph.uri, field));
                    }
                    None => state.diagnostics.push(
                        Diagnostic::new(
                            DiagnosticCode::MissingBaseValue,
                            format!("token {} declares no $value", base.pointer),
                        )
                        .at(&base.pointer, base.span.as_ref()),
                    ),
                }
            }
            GraphNode::Alias(alias) => {
                state.trace.push(step(&graph.uri, &base.pointer, TraceKind::Alias, base.span.as_ref()));
                state.token_type = Some(alias.token_type.value.clone());

                let target = self.follow(graph, &alias.reference, depth + 1);
                let mismatch = match (&target.token_type, &target.value) {
                    (Some(actual), Some(_)) if !compat::are_types_compatible(&alias.token_type.value, actual) => {
                        Some(
                            Diagnostic::new(
                                DiagnosticCode::TargetTypeMismatch,
                                format!(
                                    "alias {} declares type '{}' but {} resolves to '{}'",
                                    base.pointer, alias.token_type.value, alias.reference.raw, actual
                                ),
                            )
                            .at(&alias.token_type.pointer, alias.token_type.span.as_ref()),
                        )
                    }
                    _ => None,
                };
                state.absorb(target);
                state.diagnostics.extend(mismatch);
            }
            GraphNode::Collection(_) => return state,
        }

        self.apply_overrides(graph, &base.pointer, depth, &mut state);
        self.check_deprecation(graph, node, &mut state);
        state
    }

    /// Follow a reference into this or a pre-loaded external graph
    fn follow(&mut self, graph: &Arc<DocumentGraph>, field: &GraphReferenceField, depth: usize) -> ResolutionState {
        if !field.target.external {
            return self.resolve_node(graph, &field.target.pointer, depth);
        }

        match self.external_graph(field) {
            Ok(target_graph) => self.resolve_node(&target_graph, &field.target.pointer, depth),
            Err(diagnostic) => ResolutionState::unresolved(true, diagnostic),
        }
    }

    fn external_graph(&self, field: &GraphReferenceField) -> Result<Arc<DocumentGraph>, Diagnostic> {
        let target = &field.target;

        if target.is_network() && !self.options.allow_network_references {
            return Err(Diagnostic::new(
                DiagnosticCode::ExternalReference,
                format!("network reference {} is not allowed", target),
            )
            .at(&field.pointer, field.span.as_ref()));
        }

        if target.uri == self.graph.uri {
            return Ok(Arc::clone(&self.graph));
        }

        self.options
            .external_graphs
            .get(target.uri.as_str())
            .cloned()
            .ok_or_else(|| {
                Diagnostic::new(
                    DiagnosticCode::ExternalReference,
                    format!("external document {} is not loaded", target.uri),
                )
                .at(&field.pointer, field.span.as_ref())
            })
    }

    // =========================================================================
    // Overrides
    // =========================================================================

    fn apply_overrides(
        &mut self,
        graph: &Arc<DocumentGraph>,
        pointer: &JsonPointer,
        depth: usize,
        state: &mut ResolutionState,
    ) {
        let context = &self.options.context;
        let matched: Option<&GraphOverrideNode> = graph
            .overrides_for(pointer)
            .filter(|entry| ConditionSet::from_map(&entry.when.value).matches(context))
            .last();
        let Some(entry) = matched else {
            return;
        };

        let base_type = state.token_type.clone();
        let outcome = self.candidate(
            graph,
            &entry.pointer,
            entry.reference.as_ref(),
            entry.value.as_ref(),
            &entry.fallback,
            base_type.as_deref(),
            depth,
        );

        match outcome {
            Ok(payload) => {
                state.value = Some(payload.value);
                state.source = payload.source.clone();
                state.trace.push(step(&graph.uri, &entry.pointer, TraceKind::Override, entry.span.as_ref()));
                state.trace.extend(payload.trace);
                state.overrides_applied.push(AppliedOverride {
                    pointer: entry.pointer.clone(),
                    kind: AppliedOverrideKind::Override,
                    source: payload.source,
                });
                state.overrides_applied.extend(payload.applied);
                state.diagnostics.extend(payload.diagnostics);
                state.truncated |= payload.truncated;
                state.token_type = payload.token_type.or(state.token_type.take());
            }
            Err(failure) => {
                state.diagnostics.extend(failure.diagnostics);
                state.truncated |= failure.truncated;
                state.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticCode::OverrideFailed,
                        format!("override for {} matched but produced no usable value", pointer),
                    )
                    .at(&entry.pointer, entry.span.as_ref()),
                );
            }
        }
    }

    /// Try `$ref`, then `$value`, then the `$fallback` chain
    #[allow(clippy::too_many_arguments)]
    fn candidate(
        &mut self,
        graph: &Arc<DocumentGraph>,
        owner: &JsonPointer,
        reference: Option<&GraphReferenceField>,
        value: Option<&Field<Value>>,
        fallback: &[GraphFallbackNode],
        base_type: Option<&str>,
        depth: usize,
    ) -> Result<Payload, PayloadFailure> {
        let mut failure = PayloadFailure::default();

        if let Some(field) = reference {
            let target = self.follow(graph, field, depth + 1);
            match target.value {
                Some(resolved) => {
                    let mut diagnostics = target.diagnostics;
                    if let (Some(expected), Some(actual)) = (base_type, target.token_type.as_deref()) {
                        if !compat::are_types_compatible(expected, actual) {
                            diagnostics.push(
                                Diagnostic::new(
                                    DiagnosticCode::TargetTypeMismatch,
                                    format!(
                                        "override reference {} resolves to '{}' but the token is '{}'",
                                        field.raw, actual, expected
                                    ),
                                )
                                .at(&field.pointer, field.span.as_ref()),
                            );
                        }
                    }
                    return Ok(Payload {
                        value: resolved,
                        source: target.source,
                        token_type: target.token_type,
                        trace: target.trace,
                        applied: target.overrides_applied,
                        diagnostics,
                        truncated: target.truncated,
                    });
                }
                None => failure.merge(PayloadFailure {
                    diagnostics: target.diagnostics,
                    truncated: target.truncated,
                }),
            }
        }

        if let Some(field) = value {
            let compatible = base_type.map_or(true, |ty| compat::is_value_compatible(ty, &field.value));
            if compatible {
                return Ok(Payload {
                    value: field.value.clone(),
                    source: Some(source_of(&graph.uri, field)),
                    ..Payload::default()
                });
            }
            failure.diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::InvalidOverrideValue,
                    format!("value at {} is not a valid '{}'", field.pointer, base_type.unwrap_or_default()),
                )
                .at(&field.pointer, field.span.as_ref()),
            );
        }

        if !fallback.is_empty() {
            match self.fallback_chain(graph, owner, fallback, base_type, depth + 1) {
                Ok(payload) => return Ok(payload),
                Err(chain_failure) => failure.merge(chain_failure),
            }
        }

        Err(failure)
    }

    /// First usable entry wins; failing entries are skipped
    fn fallback_chain(
        &mut self,
        graph: &Arc<DocumentGraph>,
        owner: &JsonPointer,
        chain: &[GraphFallbackNode],
        base_type: Option<&str>,
        depth: usize,
    ) -> Result<Payload, PayloadFailure> {
        self.deepest = self.deepest.max(depth);
        if depth > self.options.max_depth {
            return Err(PayloadFailure {
                diagnostics: vec![Diagnostic::new(
                    DiagnosticCode::MaxDepthExceeded,
                    format!("fallback chain of {} exceeds the maximum depth of {}", owner, self.options.max_depth),
                )
                .with_pointer(owner.clone())],
                truncated: true,
            });
        }

        let mut failure = PayloadFailure::default();
        for entry in chain {
            let outcome = self.candidate(
                graph,
                &entry.pointer,
                entry.reference.as_ref(),
                entry.value.as_ref(),
                &entry.fallback,
                base_type,
                depth,
            );
            match outcome {
                Ok(mut payload) => {
                    payload
                        .trace
                        .insert(0, step(&graph.uri, &entry.pointer, TraceKind::Fallback, entry.span.as_ref()));
                    payload.applied.insert(
                        0,
                        AppliedOverride {
                            pointer: entry.pointer.clone(),
                            kind: AppliedOverrideKind::Fallback,
                            source: payload.source.clone(),
                        },
                    );
                    return Ok(payload);
                }
                Err(entry_failure) => failure.merge(entry_failure),
            }
        }

        failure.diagnostics.push(
            Diagnostic::new(
                DiagnosticCode::FallbackExhausted,
                format!("no fallback entry of {} produced a usable value", owner),
            )
            .with_pointer(owner.clone()),
        );
        Err(failure)
    }

    // =========================================================================
    // Deprecation
    // =========================================================================

    /// `$replacement` must declare the same type as the resolved token
    fn check_deprecation(&self, graph: &Arc<DocumentGraph>, node: &GraphNode, state: &mut ResolutionState) {
        let Some(field) = &node.base().replacement else {
            return;
        };
        let Some(resolved_type) = state.token_type.as_deref() else {
            return;
        };

        let target_graph = if field.target.external {
            match self.external_graph(field) {
                Ok(target_graph) => target_graph,
                Err(diagnostic) => {
                    state.diagnostics.push(diagnostic);
                    return;
                }
            }
        } else {
            Arc::clone(graph)
        };

        let Some(replacement) = target_graph.node(&field.target.pointer) else {
            state.diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::UnknownPointer,
                    format!("replacement {} does not exist", field.raw),
                )
                .at(&field.pointer, field.span.as_ref()),
            );
            return;
        };

        if replacement.kind() == GraphNodeKind::Collection {
            state.diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::InvalidNodeKind,
                    format!("replacement {} is a collection, not a token", field.raw),
                )
                .at(&field.pointer, field.span.as_ref()),
            );
            return;
        }

        if let Some(declared) = replacement.declared_type() {
            if !compat::are_types_compatible(resolved_type, &declared.value) {
                state.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticCode::TargetTypeMismatch,
                        format!(
                            "replacement {} is '{}' but {} is '{}'",
                            field.raw,
                            declared.value,
                            node.pointer(),
                            resolved_type
                        ),
                    )
                    .at(&field.pointer, field.span.as_ref()),
                );
            }
        }
    }
}
