//! Value conversion between serde_json::Value and cel_interpreter types

use base64::Engine as _;
use cel_interpreter::objects::{Key, Map, Value as CelValue};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Convert serde_json::Value to cel_interpreter::Value
pub fn json_to_cel(value: &JsonValue) -> CelValue {
    match value {
        JsonValue::Null => CelValue::Null,
        JsonValue::Bool(b) => CelValue::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CelValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                CelValue::UInt(u)
            } else if let Some(f) = n.as_f64() {
                CelValue::Float(f)
            } else {
                CelValue::Null
            }
        }
        JsonValue::String(s) => CelValue::String(s.clone().into()),
        JsonValue::Array(items) => {
            let list: Vec<CelValue> = items.iter().map(json_to_cel).collect();
            CelValue::List(list.into())
        }
        JsonValue::Object(obj) => {
            let entries: HashMap<Key, CelValue> = obj
                .iter()
                .map(|(k, v)| (Key::from(k.clone()), json_to_cel(v)))
                .collect();
            CelValue::Map(Map {
                map: Arc::new(entries),
            })
        }
    }
}

/// Convert cel_interpreter::Value to serde_json::Value
///
/// Bytes become base64 strings; durations, timestamps and function
/// references fall back to their debug representation.
pub fn cel_to_json(value: &CelValue) -> JsonValue {
    match value {
        CelValue::Null => JsonValue::Null,
        CelValue::Bool(b) => JsonValue::Bool(*b),
        CelValue::Int(i) => JsonValue::Number((*i).into()),
        CelValue::UInt(u) => JsonValue::Number((*u).into()),
        CelValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        CelValue::String(s) => JsonValue::String(s.to_string()),
        CelValue::Bytes(b) => {
            JsonValue::String(base64::engine::general_purpose::STANDARD.encode(b.as_slice()))
        }
        CelValue::List(list) => JsonValue::Array(list.iter().map(cel_to_json).collect()),
        CelValue::Map(map) => {
            let obj = map
                .map
                .iter()
                .map(|(k, v)| (key_to_string(k), cel_to_json(v)))
                .collect();
            JsonValue::Object(obj)
        }
        other => JsonValue::String(format!("{:?}", other)),
    }
}

fn key_to_string(key: &Key) -> String {
    match key {
        Key::String(s) => s.to_string(),
        Key::Int(i) => i.to_string(),
        Key::Uint(u) => u.to_string(),
        Key::Bool(b) => b.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_to_cel_scalars() {
        assert!(matches!(json_to_cel(&json!(true)), CelValue::Bool(true)));
        assert!(matches!(json_to_cel(&json!(42)), CelValue::Int(42)));
        assert!(matches!(json_to_cel(&json!(null)), CelValue::Null));
        assert!(matches!(json_to_cel(&json!(u64::MAX)), CelValue::UInt(u64::MAX)));

        match json_to_cel(&json!("hello")) {
            CelValue::String(s) => assert_eq!(s.as_str(), "hello"),
            other => panic!("Expected String, got {:?}", other),
        }
    }

    #[test]
    fn test_json_to_cel_containers() {
        match json_to_cel(&json!([1, 2, 3])) {
            CelValue::List(list) => assert_eq!(list.len(), 3),
            other => panic!("Expected List, got {:?}", other),
        }
        match json_to_cel(&json!({"ownerId": "alice", "tags": ["a"]})) {
            CelValue::Map(map) => assert_eq!(map.map.len(), 2),
            other => panic!("Expected Map, got {:?}", other),
        }
    }

    #[test]
    fn test_cel_to_json_restores_documents() {
        let doc = json!({
            "id": "doc-1",
            "attributes": {"level": 3, "score": 7.5, "tags": ["draft"], "deleted": null}
        });
        assert_eq!(cel_to_json(&json_to_cel(&doc)), doc);
    }

    #[test]
    fn test_cel_to_json_bytes_are_base64() {
        let bytes = CelValue::Bytes(Arc::new(b"hi".to_vec()));
        assert_eq!(cel_to_json(&bytes), json!("aGk="));
        assert_eq!(cel_to_json(&CelValue::Float(f64::NAN)), JsonValue::Null);
    }
}
