//! Materialized views.
//!
//! A `MaterializedView` is the terminal output of a pipeline. It keeps the
//! pipeline's result as a sorted tree of entries, applies every pushed change
//! to it and notifies listeners when flushed. Pushes only mark the view
//! dirty; listeners see the data once per `flush`, which the transaction
//! coordinator calls after each commit.
//!
//! Hidden schemas (junction rows) never appear in the tree: the
//! relationships of a hidden node are applied to the hidden node's parent
//! entry under their own names.

use crate::subscription::{ListenerId, Listeners};
use rill_core::{assert_ordering_includes_pk, Row};
use rill_incremental::{Change, Downstream, FetchRequest, Input, Node, Output, SourceSchema};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, trace};

/// Key of the synthetic relationship holding the top level rows.
const ROOT: &str = "";

static LIST: Format = Format {
    singular: false,
    relationships: BTreeMap::new(),
};

/// Shape of a view: a list or a single optional entry per level.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Format {
    #[serde(default)]
    pub singular: bool,
    /// Formats of nested relationships. Missing ones are lists.
    #[serde(default)]
    pub relationships: BTreeMap<String, Format>,
}

impl Format {
    pub fn list() -> Self {
        Self::default()
    }

    pub fn singular() -> Self {
        Self {
            singular: true,
            ..Self::default()
        }
    }

    pub fn with_relationship(mut self, name: impl Into<String>, format: Format) -> Self {
        self.relationships.insert(name.into(), format);
        self
    }

    fn relationship(&self, name: &str) -> &Format {
        self.relationships.get(name).unwrap_or(&LIST)
    }
}

/// A row of the view with its materialized relationships.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Entry {
    #[serde(flatten)]
    pub row: Row,
    #[serde(flatten)]
    pub relationships: BTreeMap<String, View>,
}

impl Entry {
    fn new(row: Row) -> Self {
        Self {
            row,
            relationships: BTreeMap::new(),
        }
    }

    /// The view of a relationship.
    pub fn relationship(&self, name: &str) -> Option<&View> {
        self.relationships.get(name)
    }
}

/// Materialized data at one level of the tree.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum View {
    List(Vec<Entry>),
    Singular(Option<Box<Entry>>),
}

impl View {
    fn empty(format: &Format) -> Self {
        if format.singular {
            View::Singular(None)
        } else {
            View::List(Vec::new())
        }
    }

    /// The entries, in view order.
    pub fn entries(&self) -> Vec<&Entry> {
        match self {
            View::List(list) => list.iter().collect(),
            View::Singular(entry) => entry.iter().map(|e| e.as_ref()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            View::List(list) => list.len(),
            View::Singular(entry) => usize::from(entry.is_some()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Terminal output materializing a pipeline's result.
pub struct MaterializedView {
    input: Rc<dyn Input>,
    schema: Rc<SourceSchema>,
    format: Format,
    root: RefCell<Entry>,
    listeners: RefCell<Listeners<View>>,
    on_destroy: RefCell<Vec<Box<dyn FnOnce()>>>,
    hydrated: Cell<bool>,
    dirty: Cell<bool>,
    destroyed: Cell<bool>,
}

impl MaterializedView {
    /// Creates a view over `input` and registers it as the input's output.
    pub fn new(input: Rc<dyn Input>, format: Format) -> Rc<Self> {
        let schema = input.schema();
        assert_ordering_includes_pk(&schema.sort, &schema.primary_key);
        let mut root = Entry::new(Row::default());
        root.relationships.insert(ROOT.to_string(), View::empty(&format));
        let view = Rc::new(Self {
            input: input.clone(),
            schema,
            format,
            root: RefCell::new(root),
            listeners: RefCell::new(Listeners::new()),
            on_destroy: RefCell::new(Vec::new()),
            hydrated: Cell::new(false),
            dirty: Cell::new(false),
            destroyed: Cell::new(false),
        });
        input.set_output(Downstream::of(&view));
        view
    }

    /// Loads the current result and notifies listeners.
    ///
    /// # Panics
    ///
    /// Panics when called twice.
    pub fn hydrate(&self) {
        assert!(!self.hydrated.get(), "Can't hydrate twice");
        self.hydrated.set(true);
        self.dirty.set(true);
        let mut rows = 0usize;
        for node in self.input.fetch(FetchRequest::new()) {
            self.apply(Change::Add(node));
            rows += 1;
        }
        debug!(table = %self.schema.table_name, rows, "hydrated view");
        self.flush();
    }

    /// Notifies every listener once if the data changed since the last flush.
    pub fn flush(&self) {
        if !self.dirty.replace(false) {
            return;
        }
        let listeners = self.listeners.borrow().snapshot();
        trace!(table = %self.schema.table_name, listeners = listeners.len(), "flushing view");
        // Listeners may start transactions that push into this view.
        let data = self.data();
        for listener in listeners {
            listener(&data);
        }
    }

    /// Registers a listener. It is called right away if the view is hydrated.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&View) + 'static,
    {
        let listener: Rc<dyn Fn(&View)> = Rc::new(listener);
        let id = self.listeners.borrow_mut().subscribe(listener.clone());
        if self.hydrated.get() {
            listener(&self.data());
        }
        id
    }

    /// Returns true if the listener was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.borrow_mut().unsubscribe(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Snapshot of the current data.
    pub fn data(&self) -> View {
        Self::root_view(&self.root.borrow()).clone()
    }

    pub fn schema(&self) -> Rc<SourceSchema> {
        self.schema.clone()
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Registers a callback run when the view is destroyed.
    pub fn on_destroy(&self, callback: impl FnOnce() + 'static) {
        self.on_destroy.borrow_mut().push(Box::new(callback));
    }

    /// Destroys the pipeline feeding the view.
    ///
    /// # Panics
    ///
    /// Panics when called twice.
    pub fn destroy(&self) {
        assert!(!self.destroyed.get(), "MaterializedView destroyed twice");
        self.destroyed.set(true);
        self.input.destroy();
        let callbacks = std::mem::take(&mut *self.on_destroy.borrow_mut());
        for callback in callbacks {
            callback();
        }
        debug!(table = %self.schema.table_name, "destroyed view");
    }

    fn apply(&self, change: Change) {
        let mut root = self.root.borrow_mut();
        apply_change(&mut root, ROOT, change, &self.schema, &self.format);
    }

    fn root_view(root: &Entry) -> &View {
        match root.relationships.get(ROOT) {
            Some(view) => view,
            None => panic!("View root missing"),
        }
    }
}

impl Output for MaterializedView {
    fn push(&self, change: Change) {
        self.dirty.set(true);
        self.apply(change);
    }
}

/// Applies `change` to the `relationship` view of `parent`.
fn apply_change(
    parent: &mut Entry,
    relationship: &str,
    change: Change,
    schema: &SourceSchema,
    format: &Format,
) {
    if schema.is_hidden {
        match change {
            Change::Add(node) => splice_hidden(parent, &node, schema, format, Change::Add),
            Change::Remove(node) => splice_hidden(parent, &node, schema, format, Change::Remove),
            Change::Child { child, .. } => {
                let child_schema = relationship_schema(schema, &child.relationship_name);
                apply_change(
                    parent,
                    &child.relationship_name,
                    *child.change,
                    child_schema,
                    format,
                );
            }
        }
        return;
    }

    match change {
        Change::Add(node) => {
            let entry = build_entry(&node, schema, format);
            match slot(parent, relationship, format) {
                View::Singular(existing) => {
                    assert!(existing.is_none(), "single output already exists");
                    *existing = Some(Box::new(entry));
                }
                View::List(list) => match search(list, &entry.row, schema) {
                    Ok(_) => panic!("node already exists: {}", entry.row),
                    Err(pos) => list.insert(pos, entry),
                },
            }
        }
        Change::Remove(node) => {
            drain(&node);
            match slot(parent, relationship, format) {
                View::Singular(existing) => {
                    if existing.take().is_none() {
                        panic!("node does not exist: {}", node.row);
                    }
                }
                View::List(list) => match search(list, &node.row, schema) {
                    Ok(pos) => {
                        list.remove(pos);
                    }
                    Err(_) => panic!("node does not exist: {}", node.row),
                },
            }
        }
        Change::Child { row, child } => {
            let existing = match slot(parent, relationship, format) {
                View::Singular(Some(entry)) => entry.as_mut(),
                View::Singular(None) => panic!("node does not exist: {}", row),
                View::List(list) => match search(list, &row, schema) {
                    Ok(pos) => &mut list[pos],
                    Err(_) => panic!("node does not exist: {}", row),
                },
            };
            let child_schema = relationship_schema(schema, &child.relationship_name);
            let child_format = format.relationship(&child.relationship_name);
            apply_change(
                existing,
                &child.relationship_name,
                *child.change,
                child_schema,
                child_format,
            );
        }
    }
}

/// Applies the children of a hidden node to `parent` directly.
fn splice_hidden(
    parent: &mut Entry,
    node: &Node,
    schema: &SourceSchema,
    format: &Format,
    wrap: fn(Node) -> Change,
) {
    for (name, relationship) in &node.relationships {
        let child_schema = relationship_schema(schema, name);
        for child in relationship.stream() {
            apply_change(parent, name, wrap(child), child_schema, format);
        }
    }
}

fn build_entry(node: &Node, schema: &SourceSchema, format: &Format) -> Entry {
    let mut entry = Entry::new(node.row.clone());
    for (name, relationship) in &node.relationships {
        let child_schema = relationship_schema(schema, name);
        let child_format = format.relationship(name);
        init_views(&mut entry, name, child_schema, child_format);
        for child in relationship.stream() {
            apply_change(&mut entry, name, Change::Add(child), child_schema, child_format);
        }
    }
    entry
}

/// Creates the empty views a relationship materializes into.
fn init_views(entry: &mut Entry, name: &str, schema: &SourceSchema, format: &Format) {
    if schema.is_hidden {
        for (inner, inner_schema) in &schema.relationships {
            init_views(entry, inner, inner_schema, format);
        }
    } else {
        entry
            .relationships
            .entry(name.to_string())
            .or_insert_with(|| View::empty(format));
    }
}

fn slot<'a>(parent: &'a mut Entry, relationship: &str, format: &Format) -> &'a mut View {
    parent
        .relationships
        .entry(relationship.to_string())
        .or_insert_with(|| View::empty(format))
}

fn search(list: &[Entry], row: &Row, schema: &SourceSchema) -> Result<usize, usize> {
    list.binary_search_by(|entry| schema.compare_rows(&entry.row, row))
}

fn relationship_schema<'a>(schema: &'a SourceSchema, name: &str) -> &'a SourceSchema {
    match schema.relationship(name) {
        Some(child) => child,
        None => panic!("Unknown relationship {} of {}", name, schema.table_name),
    }
}

/// Consumes every relationship of a removed node so stateful operators
/// upstream release the state they kept for it.
fn drain(node: &Node) {
    for relationship in node.relationships.values() {
        for child in relationship.stream() {
            drain(&child);
        }
    }
}
