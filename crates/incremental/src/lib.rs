//! Rill Incremental - The push/pull operator pipeline of the Rill IVM engine.
//!
//! A pipeline is a tree of operators rooted at a view and ending in sources.
//! Views pull data through `fetch`; sources push changes back up through
//! `push`, and every operator turns the changes it receives into the
//! changes its own output has to see.
//!
//! # Core Concepts
//!
//! - `Node`: A row plus lazily fetched relationships
//! - `Change`: `Add`, `Remove`, or `Child` (a change below a row)
//! - `Input` / `Output`: The pull and push halves of the operator contract
//! - `Source` / `MemorySource`: Sorted, indexed row collections
//!
//! # Operators
//!
//! - `Filter`, `Skip`, `Take`: Narrow the rows of one input
//! - `Join`: Nests the rows of a child input under their parents
//! - `FanOut` / `FanIn`: Evaluate `OR` branches without duplicates
//! - `Catch` / `Snitch`: Capture and trace pipeline traffic
//!
//! # Example
//!
//! ```rust
//! use rill_core::{asc, row, ColumnSchema, Columns, ValueType};
//! use rill_incremental::{Catch, FetchRequest, MemorySource, Source, SourceChange};
//!
//! let mut columns = Columns::new();
//! columns.insert("id".into(), ColumnSchema::new(ValueType::Number));
//! let source = MemorySource::new("issue", columns, vec!["id".into()]);
//! source.push(SourceChange::Add(row! { "id" => 2 }));
//! source.push(SourceChange::Add(row! { "id" => 1 }));
//!
//! let catch = Catch::new(source.connect(vec![asc("id")], vec![]));
//! assert_eq!(catch.fetch_all(FetchRequest::new()).len(), 2);
//!
//! source.push(SourceChange::Add(row! { "id" => 3 }));
//! assert_eq!(catch.pushes().len(), 1);
//! ```

pub mod change;
pub mod debug;
pub mod node;
pub mod operator;
pub mod operators;
pub mod schema;
pub mod source;

#[cfg(test)]
mod test_util;

pub use change::{Change, ChangeKind, ChildChange, SourceChange};
pub use debug::{CaughtChange, CaughtNode, Catch, Snitch, SnitchEntry, SnitchEvent, SnitchLog};
pub use node::{empty_stream, Node, Relationship, Stream};
pub use operator::{
    constraint_matches, same_input, Basis, Constraint, Downstream, FetchRequest, Input, Operator,
    OperatorKind, Output, OutputSlot, Predicate, Start,
};
pub use operators::{
    FanIn, FanOut, Filter, FilterMode, Join, JoinArgs, PartitionKey, Skip, SkipBound, Take,
    TakeState,
};
pub use schema::{SourceSchema, TableSchema};
pub use source::{MemorySource, Source};
