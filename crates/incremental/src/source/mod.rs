//! Sources: the canonical, sorted row collections pipelines start from.

mod index_key;
mod memory;

pub use memory::MemorySource;

use crate::change::SourceChange;
use crate::operator::{Input, Predicate};
use crate::schema::TableSchema;
use rill_core::SortOrder;
use std::rc::Rc;

/// A table the pipeline can connect to.
pub trait Source {
    /// Describes the table.
    fn table_schema(&self) -> TableSchema;

    /// Opens a connection delivering rows in `sort` order.
    ///
    /// `optional_filters` may be applied to fetches. Pushes are never
    /// filtered, so a downstream filter must re-check them.
    fn connect(&self, sort: SortOrder, optional_filters: Vec<Predicate>) -> Rc<dyn Input>;

    /// Applies a change and forwards it to every connection.
    fn push(&self, change: SourceChange);

    /// Marks the end of a transaction that touched this source.
    fn commit(&self, version: u64);
}
