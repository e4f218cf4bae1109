//! Canonical JSON encoding.
//!
//! Compact output, object keys sorted by their UTF-8 bytes at every depth,
//! strings escaped by `serde_json`, numbers in `serde_json`'s shortest
//! round-trip form. Two semantically identical values always encode to the
//! same bytes, whatever map ordering the producer used.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalError;

/// Canonical bytes of an already-parsed JSON value.
pub fn to_canonical_bytes(value: &Value) -> Result<Vec<u8>, CanonicalError> {
    let mut out = Vec::with_capacity(256);
    write_value(value, &mut out)?;
    Ok(out)
}

/// Canonical text of an already-parsed JSON value.
pub fn to_canonical_string(value: &Value) -> Result<String, CanonicalError> {
    let bytes = to_canonical_bytes(value)?;
    String::from_utf8(bytes).map_err(|e| CanonicalError::Serialization(e.to_string()))
}

/// Serialize any value and encode it canonically.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    let value = serde_json::to_value(value)?;
    to_canonical_string(&value)
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<(), CanonicalError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(number) => serde_json::to_writer(&mut *out, number)?,
        Value::String(text) => serde_json::to_writer(&mut *out, text)?,
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_value(item, out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_at_every_depth() {
        let value = json!({"b": {"z": 1, "a": [ {"y": true, "x": null} ]}, "a": "é"});
        let text = to_canonical_string(&value).unwrap();
        assert_eq!(text, r#"{"a":"é","b":{"a":[{"x":null,"y":true}],"z":1}}"#);
    }

    #[test]
    fn floats_use_shortest_roundtrip_form() {
        let value = json!({"confidence": 0.1, "whole": 2.0, "int": 7});
        let text = to_canonical_string(&value).unwrap();
        assert_eq!(text, r#"{"confidence":0.1,"int":7,"whole":2.0}"#);
    }

    #[test]
    fn reparsed_text_is_a_fixed_point() {
        let value = json!({"k": [1.25, -3, "line\nbreak", {"q": 1e-7}]});
        let first = to_canonical_string(&value).unwrap();
        let reparsed: Value = serde_json::from_str(&first).unwrap();
        assert_eq!(first, to_canonical_string(&reparsed).unwrap());
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            (-1.0e12f64..1.0e12f64).prop_map(|f| json!(f)),
            "[a-zA-Z0-9 _\\-é]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn canonical_encoding_survives_reparse(value in arb_json()) {
            let text = to_canonical_string(&value).unwrap();
            let reparsed: Value = serde_json::from_str(&text).unwrap();
            prop_assert_eq!(&reparsed, &value);
            prop_assert_eq!(to_canonical_string(&reparsed).unwrap(), text);
        }
    }
}
