//! Scalar extraction from nested JSON documents.
//!
//! A document is a tree of objects, arrays and scalars. Flattening walks it
//! depth-first (object values in key order, array elements in order) and
//! yields every scalar leaf. The order matters: the tokenizer joins the
//! leaves into one string, so reordering leaves changes the shingles.

use serde_json::{Number, Value};
use std::fmt;

/// A scalar leaf of a JSON document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar<'a> {
    Null,
    Bool(bool),
    Number(&'a Number),
    String(&'a str),
}

impl fmt::Display for Scalar<'_> {
    /// Strings render verbatim (no quotes), everything else as JSON text.
    ///
    /// Booleans and null use the JSON spelling, not Python's `str()`
    /// (`True`, `None`), so shingles differ from a Python tokenizer over
    /// the same document.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Node of a document tree, as seen by the flattener.
enum Node<'a> {
    Object(&'a serde_json::Map<String, Value>),
    Array(&'a [Value]),
    Leaf(Scalar<'a>),
}

impl<'a> From<&'a Value> for Node<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => Self::Object(map),
            Value::Array(items) => Self::Array(items),
            Value::Null => Self::Leaf(Scalar::Null),
            Value::Bool(b) => Self::Leaf(Scalar::Bool(*b)),
            Value::Number(n) => Self::Leaf(Scalar::Number(n)),
            Value::String(s) => Self::Leaf(Scalar::String(s)),
        }
    }
}

/// Extract every scalar leaf of `document` in traversal order.
///
/// A bare scalar yields a single-element sequence; empty objects and arrays
/// contribute nothing.
#[must_use]
pub fn flatten(document: &Value) -> Vec<Scalar<'_>> {
    let mut out = Vec::new();
    collect(document, &mut out);
    out
}

fn collect<'a>(value: &'a Value, out: &mut Vec<Scalar<'a>>) {
    match Node::from(value) {
        Node::Object(map) => map.values().for_each(|v| collect(v, out)),
        Node::Array(items) => items.iter().for_each(|v| collect(v, out)),
        Node::Leaf(scalar) => out.push(scalar),
    }
}

/// Flatten `document` and join the rendered leaves with `separator`.
#[must_use]
pub fn join_values(document: &Value, separator: &str) -> String {
    flatten(document)
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_bare_scalar() {
        let doc = json!("hello");
        assert_eq!(flatten(&doc), vec![Scalar::String("hello")]);

        let doc = json!(null);
        assert_eq!(flatten(&doc), vec![Scalar::Null]);
    }

    #[test]
    fn test_flatten_object_key_order() {
        // Keys are intentionally not alphabetical.
        let doc: Value = serde_json::from_str(r#"{"z": "first", "a": "second", "m": 3}"#).unwrap();
        let rendered: Vec<String> = flatten(&doc).iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["first", "second", "3"]);
    }

    #[test]
    fn test_flatten_nested_depth_first() {
        let doc: Value = serde_json::from_str(
            r#"{"a": [1, {"b": true, "c": [null, "x"]}], "d": {"e": 2.5}, "f": "end"}"#,
        )
        .unwrap();
        let rendered: Vec<String> = flatten(&doc).iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["1", "true", "null", "x", "2.5", "end"]);
    }

    #[test]
    fn test_flatten_empty_containers() {
        assert!(flatten(&json!({})).is_empty());
        assert!(flatten(&json!([])).is_empty());
        assert!(flatten(&json!({"a": [], "b": {}})).is_empty());
    }

    #[test]
    fn test_flatten_deterministic() {
        let doc = json!({"name": "widget", "tags": ["a", "b"], "price": 10});
        assert_eq!(flatten(&doc), flatten(&doc));
    }

    #[test]
    fn test_join_values() {
        let doc = json!({"a": "hello", "b": ["big", 1], "c": false});
        assert_eq!(join_values(&doc, " "), "hello big 1 false");
    }
}
