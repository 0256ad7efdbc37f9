//! JSON Pointers and Source Positions
//!
//! Pointers are kept in their normalized `#/seg/seg` form and used as the key of
//! every node within one document. Spans only exist for diagnostics and never
//! influence resolution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{DtifError, Result};

// =============================================================================
// JSON Pointer
// =============================================================================

/// Normalized JSON pointer (`#`, `#/color/base`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonPointer(String);

impl JsonPointer {
    /// The document root (`#`)
    pub fn root() -> Self {
        Self("#".to_string())
    }

    /// Parse and normalize a pointer
    ///
    /// Accepts `#`, `#/a/b`, `/a/b` and the empty string. Every `~` must be
    /// followed by `0` or `1` (RFC 6901).
    pub fn parse(input: &str) -> Result<Self> {
        let body = input.strip_prefix('#').unwrap_or(input);

        if !body.is_empty() && !body.starts_with('/') {
            return Err(DtifError::invalid_pointer(input, "pointer must start with '/'"));
        }

        let mut chars = body.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '~' && !matches!(chars.peek(), Some('0') | Some('1')) {
                return Err(DtifError::invalid_pointer(
                    input,
                    "'~' must be followed by '0' or '1'",
                ));
            }
        }

        Ok(Self(format!("#{}", body)))
    }

    /// Parse a percent-encoded URI fragment (without the leading `#`)
    pub fn from_fragment(fragment: &str) -> Result<Self> {
        let decoded = urlencoding::decode(fragment)
            .map_err(|e| DtifError::invalid_pointer(fragment, e.to_string()))?;
        Self::parse(&decoded)
    }

    /// Append one unescaped segment
    pub fn child(&self, segment: &str) -> Self {
        let escaped = segment.replace('~', "~0").replace('/', "~1");
        Self(format!("{}/{}", self.0, escaped))
    }

    /// Append an array index
    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}/{}", self.0, index))
    }

    /// Unescaped reference tokens
    pub fn segments(&self) -> Vec<String> {
        self.0
            .trim_start_matches('#')
            .split('/')
            .skip(1)
            .map(|s| s.replace("~1", "/").replace("~0", "~"))
            .collect()
    }

    pub fn last_segment(&self) -> Option<String> {
        self.segments().pop()
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let idx = self.0.rfind('/')?;
        Some(Self(self.0[..idx].to_string()))
    }

    pub fn is_root(&self) -> bool {
        self.0 == "#"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Source Positions
// =============================================================================

/// A position within the decoded text (0-based offset, 1-based line/column)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePosition {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self { offset, line, column }
    }
}

/// Span of text in a source document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    pub uri: String,
    pub start: SourcePosition,
    pub end: SourcePosition,
}

impl SourceSpan {
    pub fn new(uri: impl Into<String>, start: SourcePosition, end: SourcePosition) -> Self {
        Self {
            uri: uri.into(),
            start,
            end,
        }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.uri, self.start.line, self.start.column)
    }
}

/// Pointer → span map produced by the decoder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMap {
    pub pointers: HashMap<JsonPointer, SourceSpan>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pointer: &JsonPointer) -> Option<&SourceSpan> {
        self.pointers.get(pointer)
    }

    pub fn insert(&mut self, pointer: JsonPointer, span: SourceSpan) {
        self.pointers.insert(pointer, span);
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_forms() {
        assert_eq!(JsonPointer::parse("#/a/b").unwrap().as_str(), "#/a/b");
        assert_eq!(JsonPointer::parse("/a/b").unwrap().as_str(), "#/a/b");
        assert_eq!(JsonPointer::parse("").unwrap(), JsonPointer::root());
        assert_eq!(JsonPointer::parse("#").unwrap(), JsonPointer::root());
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(JsonPointer::parse("#a/b").is_err());
        assert!(JsonPointer::parse("#/a~2").is_err());
        assert!(JsonPointer::parse("#/a~").is_err());
    }

    #[test]
    fn test_child_escapes_segments() {
        let pointer = JsonPointer::root().child("a/b").child("c~d");
        assert_eq!(pointer.as_str(), "#/a~1b/c~0d");
        assert_eq!(pointer.segments(), vec!["a/b".to_string(), "c~d".to_string()]);
        assert_eq!(pointer.last_segment().as_deref(), Some("c~d"));
    }

    #[test]
    fn test_parent() {
        let pointer = JsonPointer::parse("#/color/base").unwrap();
        assert_eq!(pointer.parent().unwrap().as_str(), "#/color");
        assert_eq!(pointer.parent().unwrap().parent().unwrap(), JsonPointer::root());
        assert!(JsonPointer::root().parent().is_none());
    }

    #[test]
    fn test_from_fragment_percent_decodes() {
        let pointer = JsonPointer::from_fragment("/space%20name/x").unwrap();
        assert_eq!(pointer.segments(), vec!["space name".to_string(), "x".to_string()]);
    }

    #[test]
    fn test_index_segment() {
        let pointer = JsonPointer::root().child("$overrides").index(2);
        assert_eq!(pointer.as_str(), "#/$overrides/2");
    }
}
