//! Resolution Tests
//!
//! End-to-end normalise → build → resolve runs over the JSON fixtures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dtif_core::diagnostics::DiagnosticCode;
use dtif_core::document::DecodedDocument;
use dtif_core::graph::{build_document_graph, compute_reference_analysis};
use dtif_core::normalizer::{normalize, NormalizeOptions};
use dtif_core::resolver::{
    AppliedOverrideKind, DocumentResolver, ResolveResult, ResolvedToken, ResolverOptions, TraceKind,
    TransformContext, TransformEntry, TransformOutput,
};
use serde_json::{json, Map, Value};
use url::Url;

fn graph_for(fixture: &str) -> Arc<dtif_core::DocumentGraph> {
    let data: Value = serde_json::from_str(fixture).unwrap();
    let doc = DecodedDocument::from_value(Url::parse("file:///fixtures/tokens.json").unwrap(), data);
    let normalized = normalize(&doc, &NormalizeOptions::default());
    assert!(normalized.diagnostics.is_empty(), "{:?}", normalized.diagnostics);
    let built = build_document_graph(normalized.ast.unwrap());
    Arc::new(built.graph.unwrap())
}

fn resolver_for(fixture: &str, options: ResolverOptions) -> DocumentResolver {
    DocumentResolver::new(graph_for(fixture), options)
}

fn context(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn codes(result: &ResolveResult) -> Vec<DiagnosticCode> {
    result.diagnostics.iter().map(|d| d.code).collect()
}

fn trace(token: &ResolvedToken) -> Vec<(TraceKind, String)> {
    token
        .trace
        .iter()
        .map(|step| (step.kind, step.pointer.to_string()))
        .collect()
}

// =============================================================================
// Aliases
// =============================================================================

#[test]
fn test_alias_resolves_to_target_value() {
    let mut resolver = resolver_for(include_str!("fixtures/aliases.json"), ResolverOptions::default());
    let result = resolver.resolve("#/color/brand");

    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    let token = result.token.unwrap();
    assert_eq!(token.value, Some(json!("#000")));
    assert_eq!(token.token_type.as_deref(), Some("color"));
    assert_eq!(
        trace(&token),
        vec![
            (TraceKind::Alias, "#/color/brand".to_string()),
            (TraceKind::Token, "#/color/base".to_string()),
        ]
    );
    assert_eq!(token.source.unwrap().pointer.as_str(), "#/color/base/$value");
}

#[test]
fn test_alias_chain_and_forward_reference() {
    let mut resolver = resolver_for(include_str!("fixtures/aliases.json"), ResolverOptions::default());

    let link = resolver.resolve("/color/link").token.unwrap();
    assert_eq!(link.value, Some(json!("#000")));
    assert_eq!(link.trace.len(), 3);

    let forward = resolver.resolve("#/forward");
    assert!(forward.diagnostics.is_empty());
    assert_eq!(forward.token.unwrap().value, Some(json!("#abcdef")));
}

#[test]
fn test_type_mismatch_is_advisory() {
    let mut resolver = resolver_for(include_str!("fixtures/aliases.json"), ResolverOptions::default());
    let result = resolver.resolve("#/spacing/gap");

    assert_eq!(codes(&result), vec![DiagnosticCode::TargetTypeMismatch]);
    let token = result.token.unwrap();
    assert_eq!(token.value, Some(json!({ "value": 4, "unit": "px" })));
    assert_eq!(token.token_type.as_deref(), Some("color"));
    assert_eq!(token.warnings.len(), 1);
}

#[test]
fn test_matching_replacement_type_is_silent() {
    let mut resolver = resolver_for(include_str!("fixtures/aliases.json"), ResolverOptions::default());
    let result = resolver.resolve("#/legacy");
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert_eq!(result.token.unwrap().value, Some(json!("#333")));
}

#[test]
fn test_resolution_is_idempotent() {
    let mut resolver = resolver_for(include_str!("fixtures/overrides.json"), ResolverOptions::default()
        .with_context(context(json!({ "theme": "dark" }))));

    let first = resolver.resolve("#/badge");
    let second = resolver.resolve("#/badge");
    assert_eq!(first, second);
}

#[test]
fn test_resolve_all_in_document_order() {
    let mut resolver = resolver_for(include_str!("fixtures/aliases.json"), ResolverOptions::default());
    let results = resolver.resolve_all();

    let pointers: Vec<_> = results.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(
        pointers,
        vec![
            "#/color/base",
            "#/color/brand",
            "#/color/link",
            "#/spacing/unit",
            "#/spacing/gap",
            "#/legacy",
            "#/forward",
            "#/later",
        ]
    );
    assert!(results.iter().all(|(_, r)| r.token.is_some()));
}

// =============================================================================
// Overrides
// =============================================================================

#[test]
fn test_override_replaces_alias_value() {
    let mut resolver = resolver_for(
        include_str!("fixtures/overrides.json"),
        ResolverOptions::default().with_context(context(json!({ "theme": "dark" }))),
    );
    let result = resolver.resolve("#/btn");

    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    let token = result.token.unwrap();
    assert_eq!(token.value, Some(json!("#000000")));
    assert_eq!(
        trace(&token),
        vec![
            (TraceKind::Alias, "#/btn".to_string()),
            (TraceKind::Token, "#/color/light".to_string()),
            (TraceKind::Override, "#/$overrides/0".to_string()),
            (TraceKind::Token, "#/color/dark".to_string()),
        ]
    );
    assert_eq!(token.overrides_applied.len(), 1);
    assert_eq!(token.overrides_applied[0].kind, AppliedOverrideKind::Override);
}

#[test]
fn test_override_ignored_without_matching_context() {
    let mut resolver = resolver_for(include_str!("fixtures/overrides.json"), ResolverOptions::default());
    let token = resolver.resolve("#/btn").token.unwrap();
    assert_eq!(token.value, Some(json!("#ffffff")));
    assert!(token.overrides_applied.is_empty());
}

#[test]
fn test_later_matching_override_wins() {
    let mut resolver = resolver_for(
        include_str!("fixtures/overrides.json"),
        ResolverOptions::default().with_context(context(json!({ "theme": "dark" }))),
    );
    let token = resolver.resolve("#/card").token.unwrap();
    assert_eq!(token.value, Some(json!("#222222")));
    assert_eq!(token.overrides_applied[0].pointer.as_str(), "#/$overrides/2");
}

#[test]
fn test_membership_condition() {
    let mut resolver = resolver_for(
        include_str!("fixtures/overrides.json"),
        ResolverOptions::default().with_context(context(json!({ "theme": "dim" }))),
    );
    assert_eq!(resolver.resolve("#/card").token.unwrap().value, Some(json!("#222222")));
}

#[test]
fn test_fallback_skips_unresolvable_entry() {
    let mut resolver = resolver_for(
        include_str!("fixtures/overrides.json"),
        ResolverOptions::default().with_context(context(json!({ "theme": "dark" }))),
    );
    let result = resolver.resolve("#/badge");

    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    let token = result.token.unwrap();
    assert_eq!(token.value, Some(json!("#333333")));
    assert_eq!(
        trace(&token),
        vec![
            (TraceKind::Token, "#/badge".to_string()),
            (TraceKind::Override, "#/$overrides/3".to_string()),
            (TraceKind::Fallback, "#/$overrides/3/$fallback/1".to_string()),
        ]
    );
    let kinds: Vec<_> = token.overrides_applied.iter().map(|o| o.kind).collect();
    assert_eq!(kinds, vec![AppliedOverrideKind::Override, AppliedOverrideKind::Fallback]);
}

#[test]
fn test_exhausted_fallback_keeps_base_value() {
    let mut resolver = resolver_for(
        include_str!("fixtures/overrides.json"),
        ResolverOptions::default().with_context(context(json!({ "contrast": "high" }))),
    );
    let result = resolver.resolve("#/badge");

    assert_eq!(
        codes(&result),
        vec![
            DiagnosticCode::UnknownPointer,
            DiagnosticCode::FallbackExhausted,
            DiagnosticCode::OverrideFailed,
        ]
    );
    assert_eq!(result.token.unwrap().value, Some(json!("#cccccc")));
}

#[test]
fn test_only_last_match_is_attempted() {
    let mut resolver = resolver_for(
        include_str!("fixtures/overrides.json"),
        ResolverOptions::default().with_context(context(json!({ "theme": "dark", "contrast": "high" }))),
    );
    let result = resolver.resolve("#/badge");
    assert!(result.diagnostics.iter().any(|d| d.code == DiagnosticCode::OverrideFailed));
    assert_eq!(result.token.unwrap().value, Some(json!("#cccccc")));
}

// =============================================================================
// Cycles and depth
// =============================================================================

#[test]
fn test_self_reference_is_a_cycle() {
    let mut resolver = resolver_for(include_str!("fixtures/cycles.json"), ResolverOptions::default());
    let result = resolver.resolve("#/x");

    assert!(codes(&result).contains(&DiagnosticCode::CycleDetected));
    let token = result.token.unwrap();
    assert_eq!(token.value, None);
}

#[test]
fn test_mutual_aliases_terminate() {
    let mut resolver = resolver_for(include_str!("fixtures/cycles.json"), ResolverOptions::default());

    for pointer in ["#/a", "#/b", "#/c"] {
        let result = resolver.resolve(pointer);
        assert!(codes(&result).contains(&DiagnosticCode::CycleDetected), "{}", pointer);
        assert_eq!(result.token.unwrap().value, None);
    }
}

#[test]
fn test_cyclic_fallback_entry_is_skipped() {
    let mut resolver = resolver_for(
        include_str!("fixtures/cycles.json"),
        ResolverOptions::default().with_context(context(json!({ "mode": "on" }))),
    );
    let result = resolver.resolve("#/loop");
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert_eq!(result.token.unwrap().value, Some(json!("#020202")));
}

#[test]
fn test_static_analysis_finds_reference_cycles() {
    let graph = graph_for(include_str!("fixtures/cycles.json"));
    let analysis = compute_reference_analysis(&graph);
    assert_eq!(analysis.cycles.len(), 3);
}

#[test]
fn test_depth_limit_hits_node_past_limit() {
    let options = ResolverOptions {
        max_depth: 2,
        ..ResolverOptions::default()
    };
    let mut resolver = resolver_for(include_str!("fixtures/chain.json"), options);
    let result = resolver.resolve("#/a0");

    assert_eq!(codes(&result), vec![DiagnosticCode::MaxDepthExceeded]);
    assert_eq!(result.diagnostics[0].pointer.as_ref().unwrap().as_str(), "#/a3");
    assert_eq!(result.token.unwrap().value, None);
}

#[test]
fn test_depth_truncated_states_are_not_cached() {
    let options = ResolverOptions {
        max_depth: 2,
        ..ResolverOptions::default()
    };
    let mut resolver = resolver_for(include_str!("fixtures/chain.json"), options);

    assert!(resolver.resolve("#/a0").token.unwrap().value.is_none());
    let a3 = resolver.resolve("#/a3");
    assert!(a3.diagnostics.is_empty(), "{:?}", a3.diagnostics);
    assert_eq!(a3.token.unwrap().value, Some(json!(42)));
}

#[test]
fn test_chain_within_limit_resolves() {
    let mut resolver = resolver_for(include_str!("fixtures/chain.json"), ResolverOptions::default());
    let token = resolver.resolve("#/a0").token.unwrap();
    assert_eq!(token.value, Some(json!(42)));
    assert_eq!(token.trace.len(), 6);
}

// =============================================================================
// Transforms
// =============================================================================

struct Uppercase {
    calls: AtomicUsize,
}

impl TransformEntry for Uppercase {
    fn plugin(&self) -> &str {
        "uppercase"
    }

    fn transform(&self, token: &ResolvedToken, _context: &TransformContext<'_>) -> anyhow::Result<TransformOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TransformOutput {
            data: token.value.as_ref().and_then(Value::as_str).map(|s| json!(s.to_uppercase())),
            diagnostics: Vec::new(),
        })
    }
}

struct Failing;

impl TransformEntry for Failing {
    fn plugin(&self) -> &str {
        "failing"
    }

    fn transform(&self, _token: &ResolvedToken, _context: &TransformContext<'_>) -> anyhow::Result<TransformOutput> {
        anyhow::bail!("boom")
    }
}

#[test]
fn test_transform_failures_are_isolated() {
    let uppercase = Arc::new(Uppercase {
        calls: AtomicUsize::new(0),
    });
    let options = ResolverOptions::default()
        .with_transform(Arc::new(Failing))
        .with_transform(uppercase.clone());
    let mut resolver = resolver_for(include_str!("fixtures/aliases.json"), options);

    let result = resolver.resolve("#/later");
    assert_eq!(codes(&result), vec![DiagnosticCode::TransformFailed]);
    assert!(result.diagnostics[0].message.contains("boom"));
    assert_eq!(result.transforms.len(), 1);
    assert_eq!(result.transforms[0].plugin, "uppercase");
    assert_eq!(result.transforms[0].data, Some(json!("#ABCDEF")));

    resolver.resolve("#/later");
    assert_eq!(uppercase.calls.load(Ordering::SeqCst), 1);
}

struct Exploding;

impl TransformEntry for Exploding {
    fn plugin(&self) -> &str {
        "exploding"
    }

    fn transform(&self, _token: &ResolvedToken, _context: &TransformContext<'_>) -> anyhow::Result<TransformOutput> {
        panic!("plugin bug")
    }
}

#[test]
fn test_panicking_transform_is_reported() {
    let options = ResolverOptions::default()
        .with_transform(Arc::new(Exploding))
        .with_transform(Arc::new(Uppercase {
            calls: AtomicUsize::new(0),
        }));
    let mut resolver = resolver_for(include_str!("fixtures/aliases.json"), options);

    let result = resolver.resolve("#/later");
    assert_eq!(codes(&result), vec![DiagnosticCode::TransformFailed]);
    assert!(result.diagnostics[0].message.contains("plugin bug"));
    assert_eq!(result.transforms.len(), 1);
    assert_eq!(result.token.unwrap().value, Some(json!("#abcdef")));
}

// =============================================================================
// Order independence
// =============================================================================

#[test]
fn test_results_do_not_depend_on_resolution_order() {
    let fixture = include_str!("fixtures/order.json");
    let options = || ResolverOptions::default().with_context(context(json!({ "mode": "on" })));
    let pointers = ["#/loop", "#/other", "#/mirror"];

    for first in pointers {
        for second in pointers {
            let mut fresh = resolver_for(fixture, options());
            let expected = fresh.resolve(second);

            let mut warmed = resolver_for(fixture, options());
            warmed.resolve(first);
            assert_eq!(warmed.resolve(second), expected, "{} then {}", first, second);
        }
    }
}

#[test]
fn test_alias_into_cyclic_fallback_resolves_independently() {
    let fixture = include_str!("fixtures/order.json");
    let mut resolver = resolver_for(
        fixture,
        ResolverOptions::default().with_context(context(json!({ "mode": "on" }))),
    );

    resolver.resolve("#/loop");
    let other = resolver.resolve("#/other");
    assert!(other.diagnostics.is_empty(), "{:?}", other.diagnostics);
    assert_eq!(other.token.unwrap().value, Some(json!("#020202")));
}

#[test]
fn test_depth_limit_independent_of_resolution_order() {
    let options = || ResolverOptions {
        max_depth: 2,
        ..ResolverOptions::default()
    };
    let mut fresh = resolver_for(include_str!("fixtures/chain.json"), options());
    let expected = fresh.resolve("#/a0");

    let mut warmed = resolver_for(include_str!("fixtures/chain.json"), options());
    assert_eq!(warmed.resolve("#/a3").token.unwrap().value, Some(json!(42)));
    assert_eq!(warmed.resolve("#/a0"), expected);
    assert_eq!(codes(&expected), vec![DiagnosticCode::MaxDepthExceeded]);
}
