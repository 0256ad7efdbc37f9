//! Document Capabilities
//!
//! The core never reads files, talks to the network, parses raw bytes or runs
//! JSON-Schema validation itself. Hosts plug those concerns in through the
//! traits below.

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::diagnostics::Diagnostic;
use crate::pointer::SourceMap;

/// Raw document as returned by a [`DocumentLoader`]
#[derive(Debug, Clone)]
pub struct DocumentHandle {
    /// Absolute URI of the document (fragment-free)
    pub uri: Url,
    pub text: String,
    /// e.g. `application/json`, `application/yaml`
    pub content_type: Option<String>,
}

impl DocumentHandle {
    pub fn new(uri: Url, text: impl Into<String>) -> Self {
        Self {
            uri,
            text: text.into(),
            content_type: None,
        }
    }
}

/// Data tree plus pointer → span map produced by a [`Decoder`]
#[derive(Debug, Clone)]
pub struct DecodedDocument {
    pub uri: Url,
    pub text: String,
    pub data: Value,
    pub source_map: SourceMap,
}

impl DecodedDocument {
    /// Decoded document without source positions
    pub fn from_value(uri: Url, data: Value) -> Self {
        let text = data.to_string();
        Self {
            uri,
            text,
            data,
            source_map: SourceMap::new(),
        }
    }
}

/// Turns raw text into a data tree with source positions
pub trait Decoder: Send + Sync {
    fn decode(&self, handle: &DocumentHandle) -> anyhow::Result<DecodedDocument>;
}

/// Outcome of structural validation
#[derive(Debug, Clone, Default)]
pub struct SchemaValidation {
    pub valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl SchemaValidation {
    pub fn valid() -> Self {
        Self {
            valid: true,
            diagnostics: Vec::new(),
        }
    }
}

/// Structural (JSON-Schema) validation run before normalization
pub trait SchemaGuard: Send + Sync {
    fn validate(&self, document: &DecodedDocument) -> SchemaValidation;
}

/// Schema guard that accepts every document
///
/// Used when the host does not validate structure up front; the normaliser
/// still reports every structural problem it meets.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveSchemaGuard;

impl SchemaGuard for PermissiveSchemaGuard {
    fn validate(&self, _document: &DecodedDocument) -> SchemaValidation {
        SchemaValidation::valid()
    }
}

/// Options passed to [`DocumentLoader::load`]
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// URI the input is relative to
    pub base_uri: Option<Url>,
}

/// Fetches documents by URI
///
/// Cancellation is the loader's business: hosts that need it thread their own
/// token into the implementation.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, input: &str, options: &LoadOptions) -> anyhow::Result<DocumentHandle>;
}
