//! Orderings and row comparators.
//!
//! An ordering is a list of `(column, direction)` pairs. The comparator built
//! from it compares rows field by field with `compare_values`, and the first
//! non-equal field decides.

use crate::row::Row;
use crate::value::compare_values;
use core::cmp::Ordering;
use serde::{Deserialize, Serialize};

/// Sort direction of one ordering column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Ascending order (smallest first)
    Asc,
    /// Descending order (largest first)
    Desc,
}

impl Direction {
    /// Applies this direction to a comparison result.
    #[inline]
    pub fn apply(&self, ord: Ordering) -> Ordering {
        match self {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    }
}

/// One column of an ordering.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderPart {
    pub column: String,
    pub direction: Direction,
}

/// An ordering: the columns rows are sorted by, most significant first.
pub type SortOrder = Vec<OrderPart>;

/// Ascending order on `column`.
pub fn asc(column: impl Into<String>) -> OrderPart {
    OrderPart {
        column: column.into(),
        direction: Direction::Asc,
    }
}

/// Descending order on `column`.
pub fn desc(column: impl Into<String>) -> OrderPart {
    OrderPart {
        column: column.into(),
        direction: Direction::Desc,
    }
}

/// Compares rows according to an ordering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowComparator {
    sort: SortOrder,
}

impl RowComparator {
    /// Creates a comparator for the given ordering.
    pub fn new(sort: SortOrder) -> Self {
        Self { sort }
    }

    /// Compares two rows.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        for part in &self.sort {
            let ord = compare_values(a.get(&part.column), b.get(&part.column));
            if ord != Ordering::Equal {
                return part.direction.apply(ord);
            }
        }
        Ordering::Equal
    }

    /// Returns the ordering this comparator was built from.
    #[inline]
    pub fn sort(&self) -> &[OrderPart] {
        &self.sort
    }
}

/// Builds the comparator for an ordering.
pub fn make_comparator(sort: &[OrderPart]) -> RowComparator {
    RowComparator::new(sort.to_vec())
}


/// Returns the primary key columns the ordering does not mention, in key order.
pub fn missing_pk_columns(sort: &[OrderPart], primary_key: &[String]) -> Vec<String> {
    primary_key
        .iter()
        .filter(|pk| !sort.iter().any(|part| &part.column == *pk))
        .cloned()
        .collect()
}

/// Panics unless the ordering includes every primary key column.
///
/// Rows that tie on every ordering column would have no defined position
/// in an index, so operators refuse such orderings outright.
pub fn assert_ordering_includes_pk(sort: &[OrderPart], primary_key: &[String]) {
    let missing = missing_pk_columns(sort, primary_key);
    assert!(
        missing.is_empty(),
        "Ordering must include all primary keys. Missing: {}",
        missing.join(", ")
    );
}
