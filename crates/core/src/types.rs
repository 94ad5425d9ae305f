//! Column type definitions for Rill.
//!
//! Sources declare the type of every column they carry. Join uses the
//! declarations to check that both sides of a key compare like with like.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Supported column types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Boolean type (true/false)
    Boolean,
    /// IEEE 754 double
    Number,
    /// UTF-8 string
    String,
    /// Column that only ever holds null
    Null,
}

/// Declaration of one column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub optional: bool,
}

impl ColumnSchema {
    /// A required column of the given type.
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            optional: false,
        }
    }

    /// An optional (nullable) column of the given type.
    pub fn optional(value_type: ValueType) -> Self {
        Self {
            value_type,
            optional: true,
        }
    }
}

impl From<ValueType> for ColumnSchema {
    fn from(value_type: ValueType) -> Self {
        Self::new(value_type)
    }
}

/// Column declarations of a table, keyed by column name.
pub type Columns = BTreeMap<String, ColumnSchema>;

/// Primary key columns of a table, in key order.
pub type PrimaryKey = Vec<String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_schema_json() {
        let col: ColumnSchema = serde_json::from_str(r#"{"type":"string"}"#).unwrap();
        assert_eq!(col, ColumnSchema::new(ValueType::String));

        let col: ColumnSchema =
            serde_json::from_str(r#"{"type":"number","optional":true}"#).unwrap();
        assert!(col.optional);
        assert_eq!(col.value_type, ValueType::Number);
    }

    #[test]
    fn test_column_schema_from_type() {
        let col: ColumnSchema = ValueType::Boolean.into();
        assert!(!col.optional);
    }
}
