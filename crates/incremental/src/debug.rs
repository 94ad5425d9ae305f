//! Debugging and instrumentation nodes.
//!
//! - `Catch`: a terminal output that records pushes and materializes fetches
//!   into plain data, relationships included.
//! - `Snitch`: a pass-through operator that reports every push, fetch and
//!   cleanup through `tracing` and, optionally, into a shared log.

use crate::change::{Change, ChangeKind};
use crate::node::{Node, Stream};
use crate::operator::{Downstream, FetchRequest, Input, OperatorKind, Output, OutputSlot};
use crate::schema::SourceSchema;
use rill_core::Row;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::trace;

/// A node with its relationships fully expanded.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CaughtNode {
    pub row: Row,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Vec<CaughtNode>>,
}

impl CaughtNode {
    /// Expands every relationship of `node`, recursively.
    pub fn expand(node: &Node) -> Self {
        Self {
            row: node.row.clone(),
            relationships: node
                .relationships
                .iter()
                .map(|(name, rel)| (name.clone(), rel.stream().map(|n| Self::expand(&n)).collect()))
                .collect(),
        }
    }
}

/// A pushed change with its nodes expanded.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CaughtChange {
    Add {
        node: CaughtNode,
    },
    Remove {
        node: CaughtNode,
    },
    Child {
        row: Row,
        #[serde(rename = "relationshipName")]
        relationship_name: String,
        change: Box<CaughtChange>,
    },
}

impl CaughtChange {
    pub fn expand(change: &Change) -> Self {
        match change {
            Change::Add(node) => CaughtChange::Add {
                node: CaughtNode::expand(node),
            },
            Change::Remove(node) => CaughtChange::Remove {
                node: CaughtNode::expand(node),
            },
            Change::Child { row, child } => CaughtChange::Child {
                row: row.clone(),
                relationship_name: child.relationship_name.clone(),
                change: Box::new(Self::expand(&child.change)),
            },
        }
    }

    /// The row the change is about.
    pub fn row(&self) -> &Row {
        match self {
            CaughtChange::Add { node } | CaughtChange::Remove { node } => &node.row,
            CaughtChange::Child { row, .. } => row,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            CaughtChange::Add { .. } => ChangeKind::Add,
            CaughtChange::Remove { .. } => ChangeKind::Remove,
            CaughtChange::Child { .. } => ChangeKind::Child,
        }
    }
}

/// Terminal output that records everything pushed to it.
pub struct Catch {
    input: Rc<dyn Input>,
    pushes: RefCell<Vec<CaughtChange>>,
}

impl Catch {
    pub fn new(input: Rc<dyn Input>) -> Rc<Self> {
        let catch = Rc::new(Self {
            input: input.clone(),
            pushes: RefCell::new(Vec::new()),
        });
        input.set_output(Downstream::of(&catch));
        catch
    }

    /// Fetches and expands everything the request yields.
    pub fn fetch_all(&self, req: FetchRequest) -> Vec<CaughtNode> {
        self.input.fetch(req).map(|n| CaughtNode::expand(&n)).collect()
    }

    /// Cleans up and expands everything the request yields.
    pub fn cleanup_all(&self, req: FetchRequest) -> Vec<CaughtNode> {
        self.input.cleanup(req).map(|n| CaughtNode::expand(&n)).collect()
    }

    /// The changes recorded so far.
    pub fn pushes(&self) -> Vec<CaughtChange> {
        self.pushes.borrow().clone()
    }

    /// Returns and forgets the changes recorded so far.
    pub fn take_pushes(&self) -> Vec<CaughtChange> {
        std::mem::take(&mut *self.pushes.borrow_mut())
    }

    pub fn schema(&self) -> Rc<SourceSchema> {
        self.input.schema()
    }

    pub fn destroy(&self) {
        self.input.destroy();
    }
}

impl Output for Catch {
    fn push(&self, change: Change) {
        let caught = CaughtChange::expand(&change);
        self.pushes.borrow_mut().push(caught);
    }
}

/// What a `Snitch` observed.
#[derive(Clone, Debug, PartialEq)]
pub enum SnitchEvent {
    Push { kind: ChangeKind, row: Row },
    Fetch(FetchRequest),
    Cleanup(FetchRequest),
}

/// One observation, tagged with the reporting snitch's name.
#[derive(Clone, Debug, PartialEq)]
pub struct SnitchEntry {
    pub name: String,
    pub event: SnitchEvent,
}

/// Log shared between the snitches of a pipeline.
pub type SnitchLog = Rc<RefCell<Vec<SnitchEntry>>>;

/// Pass-through operator that reports the traffic crossing it.
pub struct Snitch {
    input: Rc<dyn Input>,
    name: String,
    log: Option<SnitchLog>,
    output: OutputSlot,
}

impl Snitch {
    pub fn new(input: Rc<dyn Input>, name: impl Into<String>, log: Option<SnitchLog>) -> Rc<Self> {
        let snitch = Rc::new(Self {
            input: input.clone(),
            name: name.into(),
            log,
            output: OutputSlot::new(),
        });
        input.set_output(Downstream::of(&snitch));
        snitch
    }

    /// Kind of the wrapped input.
    pub fn inner_kind(&self) -> OperatorKind {
        self.input.kind()
    }

    fn record(&self, event: SnitchEvent) {
        if let Some(log) = &self.log {
            log.borrow_mut().push(SnitchEntry {
                name: self.name.clone(),
                event,
            });
        }
    }
}

impl Input for Snitch {
    fn schema(&self) -> Rc<SourceSchema> {
        self.input.schema()
    }

    fn fetch(&self, req: FetchRequest) -> Stream {
        trace!(
            name = %self.name,
            operator = %self.input.kind(),
            constraint = ?req.constraint,
            start = ?req.start,
            reverse = req.reverse,
            "fetch"
        );
        self.record(SnitchEvent::Fetch(req.clone()));
        self.input.fetch(req)
    }

    fn cleanup(&self, req: FetchRequest) -> Stream {
        trace!(
            name = %self.name,
            operator = %self.input.kind(),
            constraint = ?req.constraint,
            "cleanup"
        );
        self.record(SnitchEvent::Cleanup(req.clone()));
        self.input.cleanup(req)
    }

    fn set_output(&self, output: Rc<dyn Output>) {
        self.output.set(output);
    }

    fn destroy(&self) {
        trace!(name = %self.name, operator = %self.input.kind(), "destroy");
        self.input.destroy();
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Snitch
    }
}

impl Output for Snitch {
    fn push(&self, change: Change) {
        trace!(
            name = %self.name,
            operator = %self.input.kind(),
            kind = %change.kind(),
            row = %change.row(),
            "push"
        );
        self.record(SnitchEvent::Push {
            kind: change.kind(),
            row: change.row().clone(),
        });
        self.output.push(change);
    }
}
