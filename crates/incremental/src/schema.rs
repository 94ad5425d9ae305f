//! Schemas describing what an input produces.

use rill_core::{Columns, PrimaryKey, Row, RowComparator, SortOrder};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Static description of a table.
#[derive(Clone, Debug, PartialEq)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Columns,
    pub primary_key: PrimaryKey,
}

/// Description of the nodes an input produces.
#[derive(Clone, Debug)]
pub struct SourceSchema {
    pub table_name: String,
    pub columns: Columns,
    pub primary_key: PrimaryKey,
    /// Order the rows come out in. Always includes the primary key.
    pub sort: SortOrder,
    /// Schemas of the relationships nodes carry, by relationship name.
    pub relationships: BTreeMap<String, Rc<SourceSchema>>,
    /// Hidden nodes (junction rows) are not shown by views; their
    /// relationships are spliced into the parent instead.
    pub is_hidden: bool,
    pub comparator: RowComparator,
}

impl SourceSchema {
    /// Compares two rows by `sort`.
    #[inline]
    pub fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        self.comparator.compare(a, b)
    }

    /// Returns the schema of a relationship.
    pub fn relationship(&self, name: &str) -> Option<&Rc<SourceSchema>> {
        self.relationships.get(name)
    }
}
