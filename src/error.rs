//! Error types for the token pipeline
//!
//! Resolution failures are reported as [`Diagnostic`](crate::diagnostics::Diagnostic)
//! values, never as errors. `DtifError` covers the remaining fallible entry
//! points: parsing URIs and pointers handed in by a host, and configuration I/O.

use thiserror::Error;

/// Result type for fallible library operations
pub type Result<T> = std::result::Result<T, DtifError>;

/// Library errors
#[derive(Error, Debug)]
pub enum DtifError {
    #[error("Invalid document URI '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid JSON pointer '{pointer}': {reason}")]
    InvalidPointer { pointer: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),
}

impl DtifError {
    pub(crate) fn invalid_pointer(pointer: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPointer {
            pointer: pointer.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parse a document URI, mapping the `url` error into [`DtifError::InvalidUri`]
pub fn parse_uri(uri: &str) -> Result<url::Url> {
    url::Url::parse(uri).map_err(|source| DtifError::InvalidUri {
        uri: uri.to_string(),
        source,
    })
}
