//! Transform plugins
//!
//! Transforms receive every resolved token and may attach derived data
//! (platform values, converted units). A failing transform only produces a
//! `plugin.TRANSFORM_FAILED` diagnostic (errors and panics alike); the
//! remaining transforms still run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use super::ResolvedToken;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::document::DecodedDocument;

/// Context handed to every transform
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformContext<'a> {
    pub document: Option<&'a DecodedDocument>,
}

/// What a transform produced
#[derive(Debug, Clone, Default)]
pub struct TransformOutput {
    pub data: Option<Value>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Per-plugin transform output attached to a resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResult {
    pub plugin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Plugin capability invoked with each resolved token
pub trait TransformEntry: Send + Sync {
    fn plugin(&self) -> &str;

    fn transform(&self, token: &ResolvedToken, context: &TransformContext<'_>) -> anyhow::Result<TransformOutput>;
}

/// Run every transform against a token, isolating failures per plugin
pub(crate) fn run_transforms(
    entries: &[std::sync::Arc<dyn TransformEntry>],
    token: &ResolvedToken,
    context: &TransformContext<'_>,
) -> (Vec<TransformResult>, Vec<Diagnostic>) {
    let mut results = Vec::with_capacity(entries.len());
    let mut diagnostics = Vec::new();

    for entry in entries {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.transform(token, context)))
            .unwrap_or_else(|payload| Err(anyhow::anyhow!("panicked: {}", panic_message(&*payload))));

        match outcome {
            Ok(output) => {
                diagnostics.extend(output.diagnostics);
                results.push(TransformResult {
                    plugin: entry.plugin().to_string(),
                    data: output.data,
                });
            }
            Err(e) => {
                tracing::warn!(plugin = entry.plugin(), pointer = %token.pointer, error = %e, "transform failed");
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticCode::TransformFailed,
                        format!("transform '{}' failed: {:#}", entry.plugin(), e),
                    )
                    .with_pointer(token.pointer.clone()),
                );
            }
        }
    }

    (results, diagnostics)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
