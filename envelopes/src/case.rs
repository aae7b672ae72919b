//! Key-case conversion at the wire boundary.
//!
//! Local types serialize with Rust's snake_case field names while the wire
//! speaks camelCase. Every outgoing and incoming JSON document passes through
//! [`to_wire`] / [`to_local`], which rewrite object keys recursively through
//! nested objects and arrays and leave values untouched.
//!
//! The two directions are inverse for keys already in the source convention:
//! - snake keys: lowercase ASCII words and digits joined by underscores;
//! - camel keys: ASCII letters and digits, no underscores.
//!
//! An underscore not followed by a lowercase letter is kept verbatim in both
//! directions, so keys like `point_2` or `_meta` survive a round trip.
//! Map keys that carry data (region ids) must stay inside these conventions;
//! lowercase UUIDs do.

#[cfg(test)]
#[path = "case_test.rs"]
mod case_test;

use serde_json::Value;

/// Rewrite every object key from the local convention to the wire convention.
#[must_use]
pub fn to_wire(value: Value) -> Value {
    convert(value, camel_key)
}

/// Rewrite every object key from the wire convention to the local convention.
#[must_use]
pub fn to_local(value: Value) -> Value {
    convert(value, snake_key)
}

fn convert(value: Value, rename: fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, inner)| (rename(&key), convert(inner, rename)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| convert(v, rename)).collect()),
        other => other,
    }
}

/// `stroke_width` -> `strokeWidth`.
#[must_use]
pub fn camel_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '_' && !out.is_empty() {
            if let Some(&next) = chars.peek()
                && next.is_ascii_lowercase()
            {
                out.push(next.to_ascii_uppercase());
                chars.next();
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// `strokeWidth` -> `stroke_width`. A leading capital is left alone.
#[must_use]
pub fn snake_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() && !out.is_empty() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
