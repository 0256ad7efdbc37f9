//! Cache keys and content hashes
//!
//! Persistence lives with the host. The core only computes the keys a host
//! needs (document identity + resolver variant) and accepts a previously
//! computed AST through [`CachedDocument`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

use crate::ast::DocumentAst;
use crate::diagnostics::Diagnostic;
use crate::pointer::JsonPointer;
use crate::resolver::ResolverOptions;

/// SHA256 digest of document text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Compute hash from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    pub fn from_text(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that content matches this hash
    pub fn matches(&self, content: &str) -> bool {
        *self == Self::from_text(content)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn content_hash(text: &str) -> ContentHash {
    ContentHash::from_text(text)
}

/// A specific version of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentIdentity {
    pub uri: Url,
    pub content_hash: ContentHash,
}

impl DocumentIdentity {
    pub fn new(uri: Url, text: &str) -> Self {
        Self {
            uri,
            content_hash: content_hash(text),
        }
    }
}

/// Resolver settings that change resolved values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheVariant {
    pub context: Map<String, Value>,
    pub max_depth: usize,
    pub allow_network_references: bool,
}

impl CacheVariant {
    pub fn from_options(options: &ResolverOptions) -> Self {
        Self {
            context: options.context.clone(),
            max_depth: options.max_depth,
            allow_network_references: options.allow_network_references,
        }
    }

    /// Stable key independent of context insertion order
    pub fn key(&self) -> String {
        let canonical = canonical_json(&Value::Object(self.context.clone()));
        let material = format!(
            "{}|depth={}|network={}",
            canonical, self.max_depth, self.allow_network_references
        );
        ContentHash::from_text(&material).0
    }
}

/// Serialize with object keys sorted at every level
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let members: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", members.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

pub fn document_cache_key(identity: &DocumentIdentity) -> String {
    format!("{}@{}", identity.uri, identity.content_hash)
}

pub fn token_cache_key(identity: &DocumentIdentity, variant: &CacheVariant, pointer: &JsonPointer) -> String {
    format!("{}@{}:{}{}", identity.uri, identity.content_hash, variant.key(), pointer)
}

/// Normalization output stored by a host's document cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDocument {
    pub identity: DocumentIdentity,
    pub ast: DocumentAst,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl CachedDocument {
    pub fn is_valid_for(&self, identity: &DocumentIdentity) -> bool {
        self.identity == *identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_consistency() {
        let content = r##"{"color": {"$type": "color", "$value": "#fff"}}"##;
        assert_eq!(content_hash(content), content_hash(content));
        assert_ne!(content_hash(content), content_hash("{}"));
        assert!(content_hash(content).matches(content));
        assert_eq!(content_hash("").as_str().len(), 64);
    }

    #[test]
    fn test_variant_key_ignores_context_order() {
        let mut a = CacheVariant::from_options(&ResolverOptions::default());
        let mut b = a.clone();
        a.context = json!({ "theme": "dark", "density": "compact" }).as_object().cloned().unwrap();
        b.context = json!({ "density": "compact", "theme": "dark" }).as_object().cloned().unwrap();
        assert_eq!(a.key(), b.key());

        b.max_depth = 4;
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_token_keys_differ_by_pointer_and_version() {
        let uri = Url::parse("file:///tokens.json").unwrap();
        let v1 = DocumentIdentity::new(uri.clone(), "{}");
        let v2 = DocumentIdentity::new(uri, "{ }");
        let variant = CacheVariant::from_options(&ResolverOptions::default());
        let a = JsonPointer::parse("#/a").unwrap();
        let b = JsonPointer::parse("#/b").unwrap();

        assert_ne!(token_cache_key(&v1, &variant, &a), token_cache_key(&v1, &variant, &b));
        assert_ne!(token_cache_key(&v1, &variant, &a), token_cache_key(&v2, &variant, &a));
        assert_ne!(document_cache_key(&v1), document_cache_key(&v2));
    }
}
