//! Rill Core - Value model, rows and orderings for the Rill IVM engine.
//!
//! This crate provides the foundational types shared by every other Rill crate:
//!
//! - `Value`: A nullable scalar (null, boolean, number, string)
//! - `Row`: An immutable, cheaply clonable mapping from column name to value
//! - `SortOrder` / `RowComparator`: Column orderings and the row comparator derived from them
//! - `ValueType` / `ColumnSchema`: Column type declarations for sources
//! - `Error`: Recoverable error types for pipeline construction and configuration
//!
//! # Example
//!
//! ```rust
//! use rill_core::{asc, make_comparator, row, Value};
//! use core::cmp::Ordering;
//!
//! let a = row! { "id" => 1, "name" => "alice" };
//! let b = row! { "id" => 2, "name" => "bob" };
//!
//! let cmp = make_comparator(&[asc("name"), asc("id")]);
//! assert_eq!(cmp.compare(&a, &b), Ordering::Less);
//! assert_eq!(a.get("name"), &Value::from("alice"));
//! assert_eq!(a.get("missing"), &Value::Null);
//! ```

mod error;
mod ordering;
pub mod pattern_match;
mod row;
mod types;
mod value;

pub use error::{Error, Result};
pub use ordering::{
    asc, assert_ordering_includes_pk, desc, make_comparator, missing_pk_columns, Direction,
    OrderPart, RowComparator, SortOrder,
};
pub use row::Row;
pub use types::{ColumnSchema, Columns, PrimaryKey, ValueType};
pub use value::{compare_values, values_equal, Value};
