//! Value/type compatibility
//!
//! Structural checks for inline override values against the `$type` of the
//! token they replace. Types without a rule here are accepted as-is, so
//! documents using custom types still resolve.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn measure_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^-?(?:\d+(?:\.\d+)?|\.\d+)(?:[a-zA-Z]+|%)$").expect("measure pattern is valid")
    })
}

/// Does `value` have a shape acceptable for `token_type`?
pub fn is_value_compatible(token_type: &str, value: &Value) -> bool {
    match token_type {
        "color" => value.is_string() || is_color_object(value),
        "dimension" | "duration" => is_measure_string(value) || is_measure(value),
        "number" | "opacity" => value.is_number(),
        "fontFamily" => value.is_string() || is_string_array(value),
        "fontWeight" => value.is_number() || value.is_string(),
        "cubicBezier" => is_cubic_bezier(value),
        "strokeStyle" => value.is_string() || value.is_object(),
        "shadow" | "gradient" => value.is_object() || value.is_array(),
        "typography" | "border" | "transition" => value.is_object(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        _ => true,
    }
}

/// Are two declared types interchangeable?
pub fn are_types_compatible(expected: &str, actual: &str) -> bool {
    expected == actual
}

/// `"4px"`, `"1.5rem"`, `"200ms"`
fn is_measure_string(value: &Value) -> bool {
    value.as_str().is_some_and(|s| measure_pattern().is_match(s))
}

fn is_measure(value: &Value) -> bool {
    value.get("value").is_some_and(Value::is_number) && value.get("unit").is_some_and(Value::is_string)
}

fn is_color_object(value: &Value) -> bool {
    value.get("colorSpace").is_some_and(Value::is_string) && value.get("components").is_some_and(Value::is_array)
}

fn is_string_array(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|items| !items.is_empty() && items.iter().all(Value::is_string))
}

fn is_cubic_bezier(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|items| items.len() == 4 && items.iter().all(Value::is_number))
}
