//! Value type definitions for Rill.
//!
//! This module defines the `Value` enum which represents a single nullable
//! scalar stored in a row, plus the two comparison primitives used by the
//! dataflow: `compare_values` (a total order for sorting) and `values_equal`
//! (join-key equality, where NULL never matches anything).

use crate::types::ValueType;
use core::cmp::Ordering;
use core::fmt;
use serde::{Deserialize, Serialize};

/// A value that can be stored in a row column.
///
/// Serializes untagged, so the JSON form is the natural one:
/// `null`, `true`, `1.5`, `"text"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null (also used for missing columns)
    Null,
    /// Boolean value
    Boolean(bool),
    /// IEEE 754 double precision number
    Number(f64),
    /// UTF-8 string
    String(String),
}

impl Value {
    /// Returns the type of this value, or None if it's Null.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(ValueType::Boolean),
            Value::Number(_) => Some(ValueType::Number),
            Value::String(_) => Some(ValueType::String),
        }
    }

    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a Boolean, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the number if this is a Number, None otherwise.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a String, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Compares two values for sorting.
///
/// Null sorts before every other value and equals itself. Booleans order
/// `false < true`, numbers by IEEE total order with `-0.0` and `0.0` equal
/// (so ordering agrees with `values_equal`), strings byte-wise over their
/// UTF-8 encoding.
///
/// # Panics
///
/// Panics if both values are non-null and of different types. Rows reaching
/// a comparator with mismatched column types means an upstream producer broke
/// the table's schema.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => unsigned_zero(*a).total_cmp(&unsigned_zero(*b)),
        (Value::String(a), Value::String(b)) => a.as_bytes().cmp(b.as_bytes()),
        (a, b) => panic!(
            "cannot compare values of different types: {} ({}) vs {} ({})",
            a,
            a.type_name(),
            b,
            b.type_name()
        ),
    }
}

#[inline]
fn unsigned_zero(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

/// Join-key equality.
///
/// Unlike `compare_values`, Null is never equal to anything, including
/// another Null. Values of different types are unequal.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_null_lowest() {
        assert_eq!(compare_values(&Value::Null, &Value::Null), Ordering::Equal);
        assert_eq!(compare_values(&Value::Null, &Value::from(false)), Ordering::Less);
        assert_eq!(compare_values(&Value::from("a"), &Value::Null), Ordering::Greater);
        assert_eq!(compare_values(&Value::Null, &Value::from(-1e300)), Ordering::Less);
    }

    #[test]
    fn test_compare_same_type() {
        assert_eq!(compare_values(&Value::from(false), &Value::from(true)), Ordering::Less);
        assert_eq!(compare_values(&Value::from(2), &Value::from(10)), Ordering::Less);
        assert_eq!(compare_values(&Value::from(-0.5), &Value::from(-0.5)), Ordering::Equal);
        // Byte-wise, so uppercase sorts before lowercase.
        assert_eq!(compare_values(&Value::from("Z"), &Value::from("a")), Ordering::Less);
        assert_eq!(compare_values(&Value::from("é"), &Value::from("z")), Ordering::Greater);
    }

    #[test]
    fn test_signed_zero_orders_equal() {
        assert_eq!(compare_values(&Value::from(-0.0), &Value::from(0.0)), Ordering::Equal);
        assert_eq!(compare_values(&Value::from(0.0), &Value::from(-0.0)), Ordering::Equal);
        assert!(values_equal(&Value::from(-0.0), &Value::from(0.0)));
        assert_eq!(compare_values(&Value::from(-0.0), &Value::from(-1e-300)), Ordering::Greater);
        assert_eq!(compare_values(&Value::from(0.0), &Value::from(1e-300)), Ordering::Less);
    }

    #[test]
    fn test_nan_sorts_but_never_equals() {
        let nan = Value::from(f64::NAN);
        assert_eq!(compare_values(&nan, &nan), Ordering::Equal);
        assert_eq!(compare_values(&Value::from(f64::INFINITY), &nan), Ordering::Less);
        assert!(!values_equal(&nan, &nan));
        assert!(!values_equal(&nan, &Value::from(0)));
    }

    #[test]
    #[should_panic(expected = "different types")]
    fn test_compare_mismatched_types_panics() {
        compare_values(&Value::from(1), &Value::from("1"));
    }

    #[test]
    fn test_values_equal_null_never_matches() {
        assert!(!values_equal(&Value::Null, &Value::Null));
        assert!(!values_equal(&Value::Null, &Value::from(1)));
        assert!(values_equal(&Value::from(1), &Value::from(1.0)));
        assert!(values_equal(&Value::from("x"), &Value::from("x")));
        assert!(!values_equal(&Value::from(1), &Value::from("1")));
    }

    #[test]
    fn test_value_json_roundtrip_shape() {
        let json = serde_json::to_string(&vec![
            Value::Null,
            Value::from(true),
            Value::from(1.5),
            Value::from("x"),
        ])
        .unwrap();
        assert_eq!(json, r#"[null,true,1.5,"x"]"#);

        let back: Vec<Value> = serde_json::from_str("[null, false, 3, \"y\"]").unwrap();
        assert_eq!(
            back,
            vec![Value::Null, Value::from(false), Value::from(3), Value::from("y")]
        );
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::from("a"));
    }
}
