//! `$overrides` parsing
//!
//! An entry survives as long as `$token` and a non-empty `$when` parse; payload
//! problems are reported but leave the entry in place so the resolver can
//! explain what happened at resolution time.

use serde_json::{Map, Value};

use super::{Normaliser, WalkError};
use crate::ast::{Field, OverrideFallbackNode, OverrideNode};
use crate::diagnostics::DiagnosticCode;
use crate::pointer::JsonPointer;

const OVERRIDE_KEYS: &[&str] = &["$token", "$when", "$ref", "$value", "$fallback"];
const FALLBACK_KEYS: &[&str] = &["$ref", "$value", "$fallback"];

impl<'a> Normaliser<'a> {
    pub(crate) fn overrides(&mut self, value: &Value, pointer: &JsonPointer) -> Result<Vec<OverrideNode>, WalkError> {
        let Some(entries) = value.as_array() else {
            self.report(DiagnosticCode::InvalidOverrides, "$overrides must be an array", pointer);
            return Ok(Vec::new());
        };

        let mut overrides = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if let Some(node) = self.override_entry(entry, pointer.index(i))? {
                overrides.push(node);
            }
        }
        Ok(overrides)
    }

    fn override_entry(&mut self, entry: &Value, pointer: JsonPointer) -> Result<Option<OverrideNode>, WalkError> {
        let Some(obj) = entry.as_object() else {
            self.report(DiagnosticCode::InvalidOverride, "override entries must be objects", &pointer);
            return Ok(None);
        };
        self.unknown_members(obj, &pointer, &[OVERRIDE_KEYS]);

        let token_pointer = pointer.child("$token");
        let token = match obj.get("$token") {
            Some(Value::String(s)) => Some(self.field(s.clone(), token_pointer)),
            _ => {
                self.report(
                    DiagnosticCode::OverrideMissingToken,
                    "override requires a $token pointer string",
                    &token_pointer,
                );
                None
            }
        };

        let when_pointer = pointer.child("$when");
        let when = match obj.get("$when") {
            Some(Value::Object(conditions)) if !conditions.is_empty() => {
                Some(self.field(conditions.clone(), when_pointer))
            }
            _ => {
                self.report(
                    DiagnosticCode::OverrideInvalidWhen,
                    "override requires a non-empty $when object",
                    &when_pointer,
                );
                None
            }
        };

        let reference = self.reference_member(obj, &pointer);
        let value = obj.get("$value").map(|v| self.field(v.clone(), pointer.child("$value")));
        let fallback = match obj.get("$fallback") {
            Some(chain) => self.fallback_chain(chain, &pointer.child("$fallback"), 1)?,
            None => Vec::new(),
        };

        if reference.is_some() && value.is_some() {
            self.report(
                DiagnosticCode::OverrideConflict,
                "override declares both $ref and $value; $ref takes precedence",
                &pointer,
            );
        }
        if reference.is_none() && value.is_none() && fallback.is_empty() {
            self.report(
                DiagnosticCode::OverrideMissingPayload,
                "override declares none of $ref, $value or $fallback",
                &pointer,
            );
        }

        let (Some(token), Some(when)) = (token, when) else {
            return Ok(None);
        };

        Ok(Some(OverrideNode {
            span: self.span(&pointer),
            pointer,
            token,
            when,
            reference,
            value,
            fallback,
        }))
    }

    /// `$fallback` may be a single entry or an ordered array of entries
    fn fallback_chain(
        &mut self,
        chain: &Value,
        pointer: &JsonPointer,
        depth: usize,
    ) -> Result<Vec<OverrideFallbackNode>, WalkError> {
        self.check_nesting(pointer, depth)?;

        let entries: Vec<(JsonPointer, &Value)> = match chain {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (pointer.index(i), item))
                .collect(),
            Value::Object(_) => vec![(pointer.clone(), chain)],
            _ => {
                self.report(
                    DiagnosticCode::InvalidFallback,
                    "$fallback must be an object or an array of objects",
                    pointer,
                );
                return Ok(Vec::new());
            }
        };

        let mut nodes = Vec::with_capacity(entries.len());
        for (entry_pointer, entry) in entries {
            let Some(obj) = entry.as_object() else {
                self.report(DiagnosticCode::InvalidFallback, "fallback entries must be objects", &entry_pointer);
                continue;
            };
            if let Some(node) = self.fallback_entry(obj, entry_pointer, depth)? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    fn fallback_entry(
        &mut self,
        obj: &Map<String, Value>,
        pointer: JsonPointer,
        depth: usize,
    ) -> Result<Option<OverrideFallbackNode>, WalkError> {
        self.unknown_members(obj, &pointer, &[FALLBACK_KEYS]);

        let reference = self.reference_member(obj, &pointer);
        let value = obj.get("$value").map(|v| self.field(v.clone(), pointer.child("$value")));
        let fallback = match obj.get("$fallback") {
            Some(chain) => self.fallback_chain(chain, &pointer.child("$fallback"), depth + 1)?,
            None => Vec::new(),
        };

        if reference.is_some() && value.is_some() {
            self.report(
                DiagnosticCode::FallbackConflict,
                "fallback declares both $ref and $value; $ref takes precedence",
                &pointer,
            );
        }
        if reference.is_none() && value.is_none() && fallback.is_empty() {
            self.report(
                DiagnosticCode::FallbackMissingPayload,
                "fallback entry declares none of $ref, $value or $fallback; entry dropped",
                &pointer,
            );
            return Ok(None);
        }

        Ok(Some(OverrideFallbackNode {
            span: self.span(&pointer),
            pointer,
            reference,
            value,
            fallback,
        }))
    }

    fn reference_member(&mut self, obj: &Map<String, Value>, pointer: &JsonPointer) -> Option<Field<String>> {
        let member = pointer.child("$ref");
        match obj.get("$ref")? {
            Value::String(s) => Some(self.field(s.clone(), member)),
            _ => {
                self.report(DiagnosticCode::InvalidRef, "$ref must be a string", &member);
                None
            }
        }
    }
}
