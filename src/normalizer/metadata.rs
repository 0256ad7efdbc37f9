//! Node metadata extraction
//!
//! Invalid members are stripped with a diagnostic; the node itself always
//! survives.

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use super::{ExtensionEvaluation, ExtensionInput, Normaliser};
use crate::ast::{Deprecation, Field, NodeMetadata};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::pointer::JsonPointer;

fn namespace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*(?:\.[a-z0-9]+(?:-[a-z0-9]+)*)+$")
            .expect("extension namespace pattern is valid")
    })
}

/// True for reverse-DNS style namespaces such as `org.example.tool`
pub fn is_extension_namespace(key: &str) -> bool {
    namespace_pattern().is_match(key)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw).ok()
}

impl<'a> Normaliser<'a> {
    pub(crate) fn metadata(&mut self, obj: &Map<String, Value>, pointer: &JsonPointer) -> NodeMetadata {
        let mut metadata = NodeMetadata {
            description: self.string_member(obj, pointer, "$description", DiagnosticCode::InvalidDescription),
            extensions: self.extensions_member(obj, pointer),
            deprecated: self.deprecated_member(obj, pointer),
            author: self.string_member(obj, pointer, "$author", DiagnosticCode::InvalidAuthor),
            tags: self.tags_member(obj, pointer),
            hash: self.string_member(obj, pointer, "$hash", DiagnosticCode::InvalidHash),
            ..NodeMetadata::default()
        };
        self.lifecycle(obj, pointer, &mut metadata);
        metadata
    }

    fn string_member(
        &mut self,
        obj: &Map<String, Value>,
        pointer: &JsonPointer,
        key: &str,
        code: DiagnosticCode,
    ) -> Option<Field<String>> {
        let member = pointer.child(key);
        match obj.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(self.field(s.clone(), member)),
            _ => {
                self.report(code, format!("{} must be a non-empty string", key), &member);
                None
            }
        }
    }

    fn extensions_member(
        &mut self,
        obj: &Map<String, Value>,
        pointer: &JsonPointer,
    ) -> BTreeMap<String, Field<Value>> {
        let mut extensions = BTreeMap::new();
        let member = pointer.child("$extensions");

        let Some(value) = obj.get("$extensions") else {
            return extensions;
        };
        let Some(entries) = value.as_object() else {
            self.report(DiagnosticCode::InvalidExtensions, "$extensions must be an object", &member);
            return extensions;
        };

        for (namespace, payload) in entries {
            let entry_pointer = member.child(namespace);
            if !is_extension_namespace(namespace) {
                self.report(
                    DiagnosticCode::InvalidExtensionNamespace,
                    format!("extension key '{}' is not a reverse-DNS namespace", namespace),
                    &entry_pointer,
                );
                continue;
            }
            self.collect_extension(namespace, payload, &entry_pointer);
            extensions.insert(namespace.clone(), self.field(payload.clone(), entry_pointer));
        }

        extensions
    }

    fn collect_extension(&mut self, namespace: &str, payload: &Value, pointer: &JsonPointer) {
        let Some(collector) = self.options.extension_collector else {
            return;
        };
        let span = self.span(pointer);
        let input = ExtensionInput {
            uri: self.uri,
            namespace,
            value: payload,
            pointer,
            span: span.as_ref(),
        };

        match collector.collect(&input) {
            Ok(Some(outcome)) => {
                self.diagnostics.extend(outcome.diagnostics);
                self.extensions.push(ExtensionEvaluation {
                    plugin: outcome.plugin,
                    namespace: namespace.to_string(),
                    pointer: pointer.clone(),
                    normalized: outcome.normalized,
                });
            }
            Ok(None) => {}
            Err(err) => {
                self.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticCode::ExtensionFailed,
                        format!("extension '{}' failed: {:#}", namespace, err),
                    )
                    .at(pointer, span.as_ref()),
                );
            }
        }
    }

    fn deprecated_member(&mut self, obj: &Map<String, Value>, pointer: &JsonPointer) -> Option<Field<Deprecation>> {
        let member = pointer.child("$deprecated");
        let deprecation = match obj.get("$deprecated")? {
            Value::Bool(active) => Deprecation {
                active: *active,
                replacement: None,
            },
            Value::Object(entry) => {
                let replacement_pointer = member.child("$replacement");
                let replacement = match entry.get("$replacement") {
                    Some(Value::String(s)) => Some(self.field(s.clone(), replacement_pointer)),
                    Some(_) => {
                        self.report(
                            DiagnosticCode::InvalidDeprecated,
                            "$replacement must be a pointer string",
                            &replacement_pointer,
                        );
                        None
                    }
                    None => None,
                };
                Deprecation {
                    active: true,
                    replacement,
                }
            }
            _ => {
                self.report(
                    DiagnosticCode::InvalidDeprecated,
                    "$deprecated must be a boolean or an object",
                    &member,
                );
                return None;
            }
        };
        Some(self.field(deprecation, member))
    }

    fn tags_member(&mut self, obj: &Map<String, Value>, pointer: &JsonPointer) -> Vec<Field<String>> {
        let member = pointer.child("$tags");
        let Some(value) = obj.get("$tags") else {
            return Vec::new();
        };
        let Some(entries) = value.as_array() else {
            self.report(DiagnosticCode::InvalidTags, "$tags must be an array of strings", &member);
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut tags = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            let entry_pointer = member.index(i);
            match entry {
                Value::String(tag) if !tag.is_empty() => {
                    if seen.insert(tag.clone()) {
                        tags.push(self.field(tag.clone(), entry_pointer));
                    } else {
                        self.report(
                            DiagnosticCode::DuplicateTag,
                            format!("duplicate tag '{}'", tag),
                            &entry_pointer,
                        );
                    }
                }
                _ => self.report(
                    DiagnosticCode::InvalidTags,
                    "tags must be non-empty strings",
                    &entry_pointer,
                ),
            }
        }
        tags
    }

    fn timestamp_member(
        &mut self,
        obj: &Map<String, Value>,
        pointer: &JsonPointer,
        key: &str,
    ) -> Option<(Field<String>, DateTime<FixedOffset>)> {
        let member = pointer.child(key);
        let raw = obj.get(key)?;
        match raw.as_str().and_then(|s| parse_timestamp(s).map(|t| (s, t))) {
            Some((s, parsed)) => Some((self.field(s.to_string(), member), parsed)),
            None => {
                self.report(
                    DiagnosticCode::InvalidTimestamp,
                    format!("{} must be an RFC 3339 timestamp", key),
                    &member,
                );
                None
            }
        }
    }

    /// `$lastModified`, `$lastUsed` and `$usageCount` with their cross-field invariants
    fn lifecycle(&mut self, obj: &Map<String, Value>, pointer: &JsonPointer, metadata: &mut NodeMetadata) {
        let last_modified = self.timestamp_member(obj, pointer, "$lastModified");
        let mut last_used = self.timestamp_member(obj, pointer, "$lastUsed");

        let usage_pointer = pointer.child("$usageCount");
        let mut usage_count = match obj.get("$usageCount") {
            Some(value) => match value.as_u64() {
                Some(count) => Some(self.field(count, usage_pointer.clone())),
                None => {
                    self.report(
                        DiagnosticCode::InvalidUsageCount,
                        "$usageCount must be a non-negative integer",
                        &usage_pointer,
                    );
                    None
                }
            },
            None => None,
        };

        if let (Some((_, modified)), Some((used_field, used))) = (&last_modified, &last_used) {
            if used < modified {
                let used_pointer = used_field.pointer.clone();
                self.report(
                    DiagnosticCode::LastUsedBeforeModified,
                    "$lastUsed must not precede $lastModified",
                    &used_pointer,
                );
                last_used = None;
            }
        }

        let used_count = usage_count.as_ref().map(|c| c.value).unwrap_or(0);
        if let Some((used_field, _)) = &last_used {
            if used_count == 0 {
                let used_pointer = used_field.pointer.clone();
                self.report(
                    DiagnosticCode::LastUsedWithoutUsage,
                    "$lastUsed requires a positive $usageCount",
                    &used_pointer,
                );
                last_used = None;
            }
        }
        if used_count > 0 && last_used.is_none() {
            self.report(
                DiagnosticCode::UsageWithoutLastUsed,
                "a positive $usageCount requires $lastUsed",
                &usage_pointer,
            );
            usage_count = None;
        }

        metadata.last_modified = last_modified.map(|(field, _)| field);
        metadata.last_used = last_used.map(|(field, _)| field);
        metadata.usage_count = usage_count;
    }
}
