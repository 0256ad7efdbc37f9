//! `$when` condition evaluation
//!
//! A condition value is either a scalar (the context value must equal it) or an
//! array (the context value must equal one of its elements). Equality is
//! structural JSON equality.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Value),
    OneOf(Vec<Value>),
}

impl Condition {
    pub fn from_value(expected: &Value) -> Self {
        match expected {
            Value::Array(items) => Self::OneOf(items.clone()),
            other => Self::Equals(other.clone()),
        }
    }

    pub fn matches(&self, actual: &Value) -> bool {
        match self {
            Self::Equals(expected) => expected == actual,
            Self::OneOf(candidates) => candidates.iter().any(|c| c == actual),
        }
    }
}

/// Conjunction of keyed conditions
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionSet {
    conditions: Vec<(String, Condition)>,
}

impl ConditionSet {
    pub fn from_map(when: &Map<String, Value>) -> Self {
        Self {
            conditions: when
                .iter()
                .map(|(key, expected)| (key.clone(), Condition::from_value(expected)))
                .collect(),
        }
    }

    /// True when the set is non-empty and every key is present in `context`
    /// with a matching value
    pub fn matches(&self, context: &Map<String, Value>) -> bool {
        !self.conditions.is_empty()
            && self
                .conditions
                .iter()
                .all(|(key, condition)| context.get(key).is_some_and(|actual| condition.matches(actual)))
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_scalar_and_membership() {
        assert!(Condition::from_value(&json!("dark")).matches(&json!("dark")));
        assert!(!Condition::from_value(&json!("dark")).matches(&json!("light")));
        assert!(Condition::from_value(&json!(["dark", "dim"])).matches(&json!("dim")));
        assert!(Condition::from_value(&json!({ "a": 1 })).matches(&json!({ "a": 1 })));
    }

    #[test]
    fn test_all_keys_must_be_present() {
        let set = ConditionSet::from_map(&context(json!({ "theme": "dark", "density": "compact" })));
        assert!(set.matches(&context(json!({ "theme": "dark", "density": "compact", "x": 1 }))));
        assert!(!set.matches(&context(json!({ "theme": "dark" }))));
    }

    #[test]
    fn test_empty_set_never_matches() {
        assert!(!ConditionSet::default().matches(&context(json!({ "theme": "dark" }))));
    }

    #[test]
    fn test_numbers_compare_structurally() {
        let set = ConditionSet::from_map(&context(json!({ "scale": 2 })));
        assert!(set.matches(&context(json!({ "scale": 2 }))));
        assert!(!set.matches(&context(json!({ "scale": "2" }))));
    }
}
