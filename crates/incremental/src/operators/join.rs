//! Join operator.
//!
//! Rill's join is hierarchical: instead of flattening parent and child rows
//! it adds a relationship to every parent node whose value is the stream of
//! matching child nodes. The parent side decides which rows come out; the
//! child side only ever produces `Child` changes under its parents.

use crate::change::Change;
use crate::node::{Node, Relationship, Stream};
use crate::operator::{
    same_input, Constraint, FetchRequest, Input, OperatorKind, Output, OutputSlot,
};
use crate::schema::SourceSchema;
use rill_core::{PrimaryKey, Row, Value};
use rill_storage::{storage_key, ScanOptions, StorageRef};
use serde_json::Value as JsonValue;
use std::rc::{Rc, Weak};
use tracing::trace;

const PARENT_KEY_SET: &str = "pKeySet";

/// Construction arguments of a `Join`.
pub struct JoinArgs {
    pub parent: Rc<dyn Input>,
    pub child: Rc<dyn Input>,
    pub storage: StorageRef,
    /// Parent columns matched against `child_key`, position by position.
    pub parent_key: Vec<String>,
    pub child_key: Vec<String>,
    pub relationship_name: String,
    /// Hide the joined rows themselves in views (junction tables).
    pub hidden: bool,
}

/// Whether a parent's relationship fetches or cleans up its children.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Fetch,
    Cleanup,
}

/// The parts of a join its lazy relationships and adapters need.
struct JoinCore {
    parent: Rc<dyn Input>,
    child: Rc<dyn Input>,
    storage: StorageRef,
    parent_key: Vec<String>,
    child_key: Vec<String>,
    parent_primary_key: PrimaryKey,
    relationship_name: String,
}

impl JoinCore {
    /// Key recording that a parent with these join values is present.
    fn parent_entry_key(&self, parent: &Row) -> String {
        let mut values = parent.values_for(&self.parent_key);
        values.extend(parent.values_for(&self.parent_primary_key));
        storage_key(PARENT_KEY_SET, &values)
    }

    /// Number of recorded parents sharing these join values, up to `limit`.
    fn parents_with_join_values(&self, values: &[Value], limit: usize) -> usize {
        let prefix = storage_key(PARENT_KEY_SET, values);
        self.storage
            .borrow()
            .scan(ScanOptions::prefix(prefix).limit(limit))
            .len()
    }

    fn child_constraint(&self, parent: &Row) -> Constraint {
        self.child_key
            .iter()
            .zip(&self.parent_key)
            .map(|(child_col, parent_col)| (child_col.clone(), parent.get(parent_col).clone()))
            .collect()
    }

    fn parent_constraint(&self, child: &Row) -> Constraint {
        self.parent_key
            .iter()
            .zip(&self.child_key)
            .map(|(parent_col, child_col)| (parent_col.clone(), child.get(child_col).clone()))
            .collect()
    }

    /// Attaches the child relationship to a parent node and records (or
    /// forgets) the parent in storage.
    fn process_parent(&self, node: Node, mode: Mode) -> Node {
        let method = match mode {
            Mode::Fetch => Mode::Fetch,
            // Another parent still needs the children, keep their state.
            Mode::Cleanup => {
                let join_values = node.row.values_for(&self.parent_key);
                if self.parents_with_join_values(&join_values, 2) > 1 {
                    Mode::Fetch
                } else {
                    Mode::Cleanup
                }
            }
        };

        let key = self.parent_entry_key(&node.row);
        match mode {
            Mode::Fetch => self.storage.borrow_mut().set(&key, JsonValue::Bool(true)),
            Mode::Cleanup => self.storage.borrow_mut().del(&key),
        }

        let child = self.child.clone();
        let constraint = self.child_constraint(&node.row);
        let relationship = Relationship::new(move || {
            let req = FetchRequest::constrained(constraint.clone());
            match method {
                Mode::Fetch => child.fetch(req),
                Mode::Cleanup => child.cleanup(req),
            }
        });
        node.with_relationship(self.relationship_name.clone(), relationship)
    }
}

pub struct Join {
    core: Rc<JoinCore>,
    schema: Rc<SourceSchema>,
    output: OutputSlot,
}

impl Join {
    pub fn new(args: JoinArgs) -> Rc<Self> {
        let JoinArgs {
            parent,
            child,
            storage,
            parent_key,
            child_key,
            relationship_name,
            hidden,
        } = args;

        assert!(
            !same_input(&parent, &child),
            "Parent and child must be different operators"
        );
        assert_eq!(
            parent_key.len(),
            child_key.len(),
            "The parent key and child key must have the same length"
        );

        let parent_schema = parent.schema();
        let child_schema = child.schema();
        for (p, c) in parent_key.iter().zip(&child_key) {
            let parent_type = parent_schema.columns.get(p).map(|col| col.value_type);
            let child_type = child_schema.columns.get(c).map(|col| col.value_type);
            match (parent_type, child_type) {
                (Some(pt), Some(ct)) if pt == ct => {}
                _ => panic!(
                    "Join key type mismatch: {}.{} ({:?}) vs {}.{} ({:?})",
                    parent_schema.table_name,
                    p,
                    parent_type,
                    child_schema.table_name,
                    c,
                    child_type
                ),
            }
        }

        let mut schema = (*parent_schema).clone();
        schema.is_hidden = hidden;
        schema
            .relationships
            .insert(relationship_name.clone(), child_schema);

        let join = Rc::new(Self {
            core: Rc::new(JoinCore {
                parent: parent.clone(),
                child: child.clone(),
                storage,
                parent_key,
                child_key,
                parent_primary_key: parent_schema.primary_key.clone(),
                relationship_name,
            }),
            schema: Rc::new(schema),
            output: OutputSlot::new(),
        });
        parent.set_output(Rc::new(ParentOutput(Rc::downgrade(&join))));
        child.set_output(Rc::new(ChildOutput(Rc::downgrade(&join))));
        join
    }

    fn stream(&self, req: FetchRequest, mode: Mode) -> Stream {
        let core = self.core.clone();
        let parents = match mode {
            Mode::Fetch => core.parent.fetch(req),
            Mode::Cleanup => core.parent.cleanup(req),
        };
        Box::new(parents.map(move |node| core.process_parent(node, mode)))
    }

    fn push_parent(&self, change: Change) {
        match change {
            Change::Add(node) => {
                let node = self.core.process_parent(node, Mode::Fetch);
                self.output.push(Change::Add(node));
            }
            Change::Remove(node) => {
                let node = self.core.process_parent(node, Mode::Cleanup);
                self.output.push(Change::Remove(node));
            }
            change @ Change::Child { .. } => self.output.push(change),
        }
    }

    fn push_child(&self, change: Change) {
        let core = &self.core;
        let child_row = change.row().clone();
        let join_values = child_row.values_for(&core.child_key);
        if core.parents_with_join_values(&join_values, 1) == 0 {
            trace!(
                relationship = %core.relationship_name,
                row = %child_row,
                "join dropping child push without parents"
            );
            return;
        }

        let parents = core
            .parent
            .fetch(FetchRequest::constrained(core.parent_constraint(&child_row)));
        let mut fanned = 0usize;
        for parent in parents {
            fanned += 1;
            self.output.push(Change::child(
                parent.row,
                core.relationship_name.clone(),
                change.clone(),
            ));
        }
        trace!(
            relationship = %core.relationship_name,
            kind = %change.kind(),
            parents = fanned,
            "join fanned out child push"
        );
    }
}

impl Input for Join {
    fn schema(&self) -> Rc<SourceSchema> {
        self.schema.clone()
    }

    fn fetch(&self, req: FetchRequest) -> Stream {
        self.stream(req, Mode::Fetch)
    }

    fn cleanup(&self, req: FetchRequest) -> Stream {
        self.stream(req, Mode::Cleanup)
    }

    fn set_output(&self, output: Rc<dyn Output>) {
        self.output.set(output);
    }

    fn destroy(&self) {
        self.core.parent.destroy();
        self.core.child.destroy();
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Join
    }
}

/// Output registered on the parent input.
struct ParentOutput(Weak<Join>);

impl Output for ParentOutput {
    fn push(&self, change: Change) {
        if let Some(join) = self.0.upgrade() {
            join.push_parent(change);
        }
    }
}

/// Output registered on the child input.
struct ChildOutput(Weak<Join>);

impl Output for ChildOutput {
    fn push(&self, change: Change) {
        if let Some(join) = self.0.upgrade() {
            join.push_child(change);
        }
    }
}
