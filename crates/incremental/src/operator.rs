//! The push/pull contract every pipeline node implements.
//!
//! Data is pulled with `fetch` from the view towards the sources and changes
//! are pushed from the sources towards the view. An operator holds its input
//! strongly and registers a weak `Downstream` handle as that input's output,
//! so ownership runs view -> source and no reference cycle forms.

use crate::change::Change;
use crate::node::Stream;
use crate::schema::SourceSchema;
use rill_core::{values_equal, Row, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Row predicate used by filters and source-side optional filters.
pub type Predicate = Rc<dyn Fn(&Row) -> bool>;

/// Required column equalities a fetch must honor exactly.
pub type Constraint = BTreeMap<String, Value>;

/// Returns true if `row` matches every column of the constraint.
pub fn constraint_matches(constraint: &Constraint, row: &Row) -> bool {
    constraint
        .iter()
        .all(|(column, value)| values_equal(row.get(column), value))
}

/// Where a fetch starts, relative to its scan direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Basis {
    /// Include the start row itself.
    At,
    /// Begin with the row following the start row.
    After,
}

/// Start position of a fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct Start {
    pub row: Row,
    pub basis: Basis,
}

/// A pull request against an input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchRequest {
    pub constraint: Option<Constraint>,
    pub start: Option<Start>,
    /// Scan from the end towards the beginning.
    pub reverse: bool,
}

impl FetchRequest {
    /// Fetches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches rows matching `constraint`.
    pub fn constrained(constraint: Constraint) -> Self {
        Self {
            constraint: Some(constraint),
            ..Self::default()
        }
    }

    /// Sets the start position.
    pub fn with_start(mut self, row: Row, basis: Basis) -> Self {
        self.start = Some(Start { row, basis });
        self
    }

    /// Scans in reverse.
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// Node kinds, for instrumentation and exhaustive matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Source,
    Filter,
    Skip,
    Take,
    Join,
    FanOut,
    FanIn,
    Snitch,
}

impl OperatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorKind::Source => "source",
            OperatorKind::Filter => "filter",
            OperatorKind::Skip => "skip",
            OperatorKind::Take => "take",
            OperatorKind::Join => "join",
            OperatorKind::FanOut => "fan-out",
            OperatorKind::FanIn => "fan-in",
            OperatorKind::Snitch => "snitch",
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives pushed changes.
pub trait Output {
    fn push(&self, change: Change);
}

/// Something that can be fetched from and pushes changes to one output.
pub trait Input {
    /// Describes the nodes this input produces.
    fn schema(&self) -> Rc<SourceSchema>;

    /// Lazily fetches nodes in schema order (or reverse order).
    fn fetch(&self, req: FetchRequest) -> Stream;

    /// Like `fetch`, but tells stateful operators the rows are going away so
    /// they can release the state kept for them.
    fn cleanup(&self, req: FetchRequest) -> Stream;

    /// Registers the output pushes go to.
    fn set_output(&self, output: Rc<dyn Output>);

    /// Tears down this input and, transitively, its upstream.
    fn destroy(&self);

    fn kind(&self) -> OperatorKind;
}

/// A node that is both an input and an output.
pub trait Operator: Input + Output {}

impl<T: Input + Output> Operator for T {}

/// Weak forwarding handle registered as an upstream's output.
pub struct Downstream<T: ?Sized>(Weak<T>);

impl<T: Output + 'static> Downstream<T> {
    /// Creates the handle for `op`.
    pub fn of(op: &Rc<T>) -> Rc<dyn Output> {
        Rc::new(Downstream(Rc::downgrade(op)))
    }
}

impl<T: Output + ?Sized> Output for Downstream<T> {
    fn push(&self, change: Change) {
        match self.0.upgrade() {
            Some(op) => op.push(change),
            None => tracing::trace!(kind = %change.kind(), "dropping push to released operator"),
        }
    }
}

/// Slot holding the single output of an operator.
#[derive(Default)]
pub struct OutputSlot(RefCell<Option<Rc<dyn Output>>>);

impl OutputSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the output. An operator has exactly one output edge.
    pub fn set(&self, output: Rc<dyn Output>) {
        let mut slot = self.0.borrow_mut();
        assert!(slot.is_none(), "Output already set");
        *slot = Some(output);
    }

    /// Returns true once an output was set.
    pub fn is_set(&self) -> bool {
        self.0.borrow().is_some()
    }

    /// Pushes to the output.
    pub fn push(&self, change: Change) {
        let output = self.0.borrow().clone();
        match output {
            Some(output) => output.push(change),
            None => panic!("Output not set"),
        }
    }
}

/// Returns true if two handles point at the same input.
pub fn same_input(a: &Rc<dyn Input>, b: &Rc<dyn Input>) -> bool {
    core::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use rill_core::row;
    use std::cell::Cell;

    struct Counter(Cell<usize>);

    impl Output for Counter {
        fn push(&self, _change: Change) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn test_downstream_forwards_until_dropped() {
        let counter = Rc::new(Counter(Cell::new(0)));
        let handle = Downstream::of(&counter);
        handle.push(Change::Add(Node::new(row! { "id" => 1 })));
        assert_eq!(counter.0.get(), 1);

        drop(counter);
        handle.push(Change::Add(Node::new(row! { "id" => 2 })));
    }

    #[test]
    #[should_panic(expected = "Output already set")]
    fn test_output_slot_set_twice_panics() {
        let slot = OutputSlot::new();
        slot.set(Rc::new(Counter(Cell::new(0))));
        slot.set(Rc::new(Counter(Cell::new(0))));
    }

    #[test]
    #[should_panic(expected = "Output not set")]
    fn test_output_slot_push_without_output_panics() {
        OutputSlot::new().push(Change::Add(Node::new(row! { "id" => 1 })));
    }

    #[test]
    fn test_constraint_matches_never_matches_null() {
        let mut c = Constraint::new();
        c.insert("org".into(), Value::Null);
        assert!(!constraint_matches(&c, &row! { "org" => Value::Null }));

        c.insert("org".into(), Value::from("acme"));
        assert!(constraint_matches(&c, &row! { "org" => "acme", "id" => 1 }));
    }

    #[test]
    fn test_fetch_request_builders() {
        let req = FetchRequest::new()
            .with_start(row! { "id" => 3 }, Basis::After)
            .reversed();
        assert!(req.reverse);
        assert_eq!(req.start.map(|s| s.basis), Some(Basis::After));
        assert!(req.constraint.is_none());
    }
}
