//! `{{path.to.value}}` placeholder substitution.

use std::sync::OnceLock;

use regex_lite::{Captures, Regex};
use serde_json::Value;

use crate::path::get_value_from_path;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder regex is valid"))
}

/// Replace every `{{path}}` in `template` with the value found at `path` in
/// `data`. Strings are inserted as-is, other values as compact JSON.
/// Placeholders whose path does not resolve are left verbatim.
pub fn replace_template_variables(template: &str, data: &Value) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    placeholder()
        .replace_all(template, |caps: &Captures<'_>| {
            match get_value_from_path(data, &caps[1]) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Apply [`replace_template_variables`] to every string inside `value`,
/// recursing through arrays and objects. Keys are left untouched.
pub fn replace_in_value(value: &Value, data: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(replace_template_variables(s, data)),
        Value::Array(items) => Value::Array(items.iter().map(|v| replace_in_value(v, data)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), replace_in_value(v, data)))
                .collect(),
        ),
        other => other.clone(),
    }
}
