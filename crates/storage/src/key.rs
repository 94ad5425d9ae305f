//! Storage key encoding.
//!
//! A key is a tag followed by a tuple of values, written as the body of a
//! JSON array with a trailing comma: `"pKeySet",1,"a",`. The trailing comma
//! makes the encoding of a tuple prefix a string prefix of every longer
//! tuple that starts with it, and of nothing else, so `1` never matches `10`.

use rill_core::Value;
use serde_json::Value as JsonValue;

/// Converts a row value to its JSON form.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(*b),
        // Zeros share one encoding since `values_equal` treats them as equal.
        Value::Number(n) => serde_json::Number::from_f64(if *n == 0.0 { 0.0 } else { *n })
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::String(s) => JsonValue::String(s.clone()),
    }
}

/// Encodes `tag` followed by `values` as a storage key.
pub fn storage_key(tag: &str, values: &[Value]) -> String {
    let mut key = JsonValue::String(tag.to_string()).to_string();
    key.push(',');
    for v in values {
        key.push_str(&value_to_json(v).to_string());
        key.push(',');
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_shape() {
        let key = storage_key("take", &[Value::from("a\"b"), Value::Null, Value::from(true)]);
        assert_eq!(key, r#""take","a\"b",null,true,"#);
        assert_eq!(storage_key("maxBound", &[]), r#""maxBound","#);
    }

    #[test]
    fn test_prefix_does_not_match_longer_number() {
        let one = storage_key("pKeySet", &[Value::from(1)]);
        let ten = storage_key("pKeySet", &[Value::from(10), Value::from(2)]);
        let one_two = storage_key("pKeySet", &[Value::from(1), Value::from(2)]);
        assert!(!ten.starts_with(&one));
        assert!(one_two.starts_with(&one));
    }

    #[test]
    fn test_signed_zeros_share_a_key() {
        assert_eq!(
            storage_key("pKeySet", &[Value::from(-0.0)]),
            storage_key("pKeySet", &[Value::from(0)])
        );
    }

    #[test]
    fn test_value_to_json_nan_is_null() {
        assert_eq!(value_to_json(&Value::from(f64::NAN)), JsonValue::Null);
        assert_eq!(value_to_json(&Value::from(2.5)), serde_json::json!(2.5));
    }
}
