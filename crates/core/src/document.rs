//! Canonical record model.
//!
//! Every decoded cluster object is converted once into a [`Document`], a closed
//! set of shapes. Everything downstream (flattening, rendering) matches on this
//! enum instead of inspecting values at runtime.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Number, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Document {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Sequence(Vec<Document>),
    /// Field order follows the serialized payload.
    Mapping(IndexMap<String, Document>),
}

impl Document {
    pub fn get(&self, key: &str) -> Option<&Document> {
        match self {
            Document::Mapping(m) => m.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Document::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render as a single JSON line.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<Value> for Document {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Document::Null,
            Value::Bool(b) => Document::Bool(b),
            Value::Number(n) => Document::Number(n),
            Value::String(s) => Document::String(s),
            Value::Array(items) => Document::Sequence(items.into_iter().map(Document::from).collect()),
            Value::Object(map) => Document::Mapping(map.into_iter().map(|(k, v)| (k, Document::from(v))).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversion_keeps_field_order() {
        let doc = Document::from(json!({"zeta": 1, "alpha": {"b": null, "a": [true]}}));
        let Document::Mapping(m) = &doc else { panic!("expected mapping") };
        let keys: Vec<_> = m.keys().map(String::as_str).collect();
        assert_eq!(keys, ["zeta", "alpha"]);
        assert_eq!(doc.get("alpha").and_then(|a| a.get("b")), Some(&Document::Null));
    }

    #[test]
    fn renders_back_to_the_same_json() {
        let v = json!({"metadata": {"name": "web", "labels": {"app": "web"}}, "spec": {"replicas": 3, "paused": false}, "items": [1.5, "x", null]});
        let line = Document::from(v.clone()).to_json_line().unwrap();
        assert_eq!(line, serde_json::to_string(&v).unwrap());
    }
}
