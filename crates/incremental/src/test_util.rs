//! Helpers shared by the unit tests of this crate.

use crate::debug::CaughtNode;
use crate::node::Node;
use crate::source::MemorySource;
use crate::{Source, SourceChange};
use rill_core::{ColumnSchema, Columns, Row, ValueType};

/// A source with the given columns; the first column is the primary key.
pub(crate) fn source(table: &str, columns: &[(&str, ValueType)]) -> MemorySource {
    let cols: Columns = columns
        .iter()
        .map(|(name, ty)| (name.to_string(), ColumnSchema::optional(*ty)))
        .collect();
    MemorySource::new(table, cols, vec![columns[0].0.to_string()])
}

pub(crate) fn add_all(source: &MemorySource, rows: Vec<Row>) {
    for row in rows {
        source.push(SourceChange::Add(row));
    }
}

/// Numeric `id` of each node.
pub(crate) fn ids(nodes: impl Iterator<Item = Node>) -> Vec<i64> {
    nodes.map(|n| id_of(&n.row)).collect()
}

pub(crate) fn caught_ids(nodes: &[CaughtNode]) -> Vec<i64> {
    nodes.iter().map(|n| id_of(&n.row)).collect()
}

pub(crate) fn id_of(row: &Row) -> i64 {
    row.get("id").as_f64().unwrap_or(f64::NAN) as i64
}
