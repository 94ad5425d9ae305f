//! Row structure for Rill.
//!
//! A `Row` is an immutable mapping from column name to `Value`. Rows are
//! shared between sources, operators and views, so cloning only bumps a
//! reference count. Changing a row means building a new one.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Returned for columns a row does not carry.
static NULL: Value = Value::Null;

/// An immutable row, ordered by column name.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Rc<BTreeMap<String, Value>>);

impl Row {
    /// Creates a row from a column map.
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self(Rc::new(values))
    }

    /// Creates a row from `(column, value)` pairs.
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::new(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns the value of a column. Missing columns read as `Value::Null`.
    #[inline]
    pub fn get(&self, column: &str) -> &Value {
        self.0.get(column).unwrap_or(&NULL)
    }

    /// Returns true if the row carries the column (even if it is null).
    #[inline]
    pub fn contains_column(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Returns a copy of this row with one column replaced.
    pub fn with(&self, column: impl Into<String>, value: impl Into<Value>) -> Row {
        let mut values = (*self.0).clone();
        values.insert(column.into(), value.into());
        Row::new(values)
    }

    /// Projects the given columns, in order.
    pub fn values_for(&self, columns: &[String]) -> Vec<Value> {
        columns.iter().map(|c| self.get(c).clone()).collect()
    }

    /// Iterates over `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of columns.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the row has no columns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if both handles point at the same allocation.
    #[inline]
    pub fn ptr_eq(&self, other: &Row) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        f.write_str("}")
    }
}

/// Builds a `Row` from `column => value` pairs.
///
/// ```rust
/// use rill_core::{row, Value};
/// let r = row! { "id" => 1, "title" => "bug", "closed" => false };
/// assert_eq!(r.get("title"), &Value::from("bug"));
/// ```
#[macro_export]
macro_rules! row {
    () => {
        $crate::Row::default()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {
        $crate::Row::from_pairs([$(($column, $crate::Value::from($value))),+])
    };
}
