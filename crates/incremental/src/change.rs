//! Changes flowing through the pipeline.

use crate::node::Node;
use rill_core::Row;
use std::fmt;

/// A change pushed from an operator to its output.
#[derive(Clone, Debug)]
pub enum Change {
    /// A node entered the result.
    Add(Node),
    /// A node left the result.
    Remove(Node),
    /// Something below `row` changed in one of its relationships.
    Child { row: Row, child: ChildChange },
}

/// The nested part of a `Change::Child`.
#[derive(Clone, Debug)]
pub struct ChildChange {
    pub relationship_name: String,
    pub change: Box<Change>,
}

/// Discriminant of a `Change`, for logging and assertions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Add,
    Remove,
    Child,
}

impl Change {
    /// The row the change is about.
    pub fn row(&self) -> &Row {
        match self {
            Change::Add(node) | Change::Remove(node) => &node.row,
            Change::Child { row, .. } => row,
        }
    }

    /// Returns the kind of change.
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Add(_) => ChangeKind::Add,
            Change::Remove(_) => ChangeKind::Remove,
            Change::Child { .. } => ChangeKind::Child,
        }
    }

    /// Wraps `change` as a change of `relationship_name` under `row`.
    pub fn child(row: Row, relationship_name: impl Into<String>, change: Change) -> Self {
        Change::Child {
            row,
            child: ChildChange {
                relationship_name: relationship_name.into(),
                change: Box::new(change),
            },
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Add => "add",
            ChangeKind::Remove => "remove",
            ChangeKind::Child => "child",
        })
    }
}

/// A change fed into a source from the replication layer.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceChange {
    Add(Row),
    Remove(Row),
}

impl SourceChange {
    /// The row being added or removed.
    pub fn row(&self) -> &Row {
        match self {
            SourceChange::Add(row) | SourceChange::Remove(row) => row,
        }
    }

    /// Returns the kind of the corresponding pipeline change.
    pub fn kind(&self) -> ChangeKind {
        match self {
            SourceChange::Add(_) => ChangeKind::Add,
            SourceChange::Remove(_) => ChangeKind::Remove,
        }
    }
}
