//! In-memory source.
//!
//! A `MemorySource` keeps a table's rows in a primary index sorted by the
//! primary key, plus one sorted index per distinct ordering its connections
//! request. Pushed changes are forwarded to every connection before any
//! index is touched. While connection `i` processes the change, fetches
//! from connections `0..=i` see it through an overlay and fetches from the
//! others do not, so every downstream operator observes a state consistent
//! with the changes it has been pushed.

use super::index_key::IndexKey;
use super::Source;
use crate::change::{Change, SourceChange};
use crate::node::{Node, Stream};
use crate::operator::{
    constraint_matches, Basis, Constraint, FetchRequest, Input, OperatorKind, Output, Predicate,
    Start,
};
use crate::schema::{SourceSchema, TableSchema};
use hashbrown::{HashMap, HashSet};
use rill_core::{
    asc, assert_ordering_includes_pk, make_comparator, Columns, PrimaryKey, Row, RowComparator,
    SortOrder,
};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::rc::Rc;
use tracing::{debug, trace};

type ConnectionId = u64;

struct Index {
    data: BTreeMap<IndexKey, Row>,
    used_by: HashSet<ConnectionId>,
}

struct Connection {
    id: ConnectionId,
    sort: SortOrder,
    optional_filters: Vec<Predicate>,
    output: Option<Rc<dyn Output>>,
}

struct Overlay {
    connection: ConnectionId,
    change: SourceChange,
}

struct SourceState {
    table: TableSchema,
    primary_sort: SortOrder,
    indexes: HashMap<SortOrder, Index>,
    connections: Vec<Connection>,
    overlay: Option<Overlay>,
    next_connection_id: ConnectionId,
    committed_version: Option<u64>,
}

impl SourceState {
    fn primary_index(&self) -> &Index {
        match self.indexes.get(&self.primary_sort) {
            Some(index) => index,
            None => panic!("Primary index not found for {}", self.table.table_name),
        }
    }

    fn connection(&self, id: ConnectionId) -> &Connection {
        match self.connections.iter().find(|c| c.id == id) {
            Some(conn) => conn,
            None => panic!("Connection not found"),
        }
    }

    fn get_or_create_index(&mut self, sort: &SortOrder, used_by: ConnectionId) -> &mut Index {
        if !self.indexes.contains_key(sort) {
            let data: BTreeMap<IndexKey, Row> = self
                .primary_index()
                .data
                .values()
                .map(|row| (IndexKey::from_row(row, sort), row.clone()))
                .collect();
            debug!(
                table = %self.table.table_name,
                sort = ?sort,
                rows = data.len(),
                "creating index"
            );
            self.indexes.insert(
                sort.clone(),
                Index {
                    data,
                    used_by: HashSet::new(),
                },
            );
        }
        let Some(index) = self.indexes.get_mut(sort) else {
            unreachable!("index inserted above");
        };
        index.used_by.insert(used_by);
        index
    }
}

/// A source over rows held in memory.
pub struct MemorySource {
    state: Rc<RefCell<SourceState>>,
}

impl MemorySource {
    /// Creates an empty source for a table.
    pub fn new(table_name: impl Into<String>, columns: Columns, primary_key: PrimaryKey) -> Self {
        let primary_sort: SortOrder = primary_key.iter().map(asc).collect();
        assert_ordering_includes_pk(&primary_sort, &primary_key);
        let mut indexes = HashMap::new();
        indexes.insert(
            primary_sort.clone(),
            Index {
                data: BTreeMap::new(),
                used_by: HashSet::new(),
            },
        );
        Self {
            state: Rc::new(RefCell::new(SourceState {
                table: TableSchema {
                    table_name: table_name.into(),
                    columns,
                    primary_key,
                },
                primary_sort,
                indexes,
                connections: Vec::new(),
                overlay: None,
                next_connection_id: 0,
                committed_version: None,
            })),
        }
    }

    /// Number of rows in the source.
    pub fn len(&self) -> usize {
        self.state.borrow().primary_index().data.len()
    }

    /// Returns true if the source holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Orderings of the indexes currently kept, primary index included.
    pub fn index_sorts(&self) -> Vec<SortOrder> {
        let mut sorts: Vec<SortOrder> = self.state.borrow().indexes.keys().cloned().collect();
        sorts.sort();
        sorts
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.state.borrow().connections.len()
    }

    /// The last version passed to `commit`.
    pub fn committed_version(&self) -> Option<u64> {
        self.state.borrow().committed_version
    }

    /// All rows in primary key order.
    pub fn rows(&self) -> Vec<Row> {
        self.state.borrow().primary_index().data.values().cloned().collect()
    }
}

impl Source for MemorySource {
    fn table_schema(&self) -> TableSchema {
        self.state.borrow().table.clone()
    }

    fn connect(&self, sort: SortOrder, optional_filters: Vec<Predicate>) -> Rc<dyn Input> {
        let mut state = self.state.borrow_mut();
        assert_ordering_includes_pk(&sort, &state.table.primary_key);

        let id = state.next_connection_id;
        state.next_connection_id += 1;

        let schema = Rc::new(SourceSchema {
            table_name: state.table.table_name.clone(),
            columns: state.table.columns.clone(),
            primary_key: state.table.primary_key.clone(),
            comparator: make_comparator(&sort),
            sort: sort.clone(),
            relationships: BTreeMap::new(),
            is_hidden: false,
        });
        debug!(
            table = %state.table.table_name,
            connection = id,
            sort = ?sort,
            optional_filters = optional_filters.len(),
            "connect"
        );
        state.connections.push(Connection {
            id,
            sort,
            optional_filters,
            output: None,
        });

        Rc::new(SourceConnection {
            state: self.state.clone(),
            id,
            schema,
        })
    }

    fn push(&self, change: SourceChange) {
        // Validate and normalize to the stored row, so removes find the row in
        // every index even when the caller only supplied key columns.
        let (change, outputs) = {
            let state = self.state.borrow();
            let key = IndexKey::from_row(change.row(), &state.primary_sort);
            let existing = state.primary_index().data.get(&key).cloned();
            let change = match (change, existing) {
                (SourceChange::Add(row), None) => SourceChange::Add(row),
                (SourceChange::Add(row), Some(_)) => {
                    panic!("Row already exists in {}: {}", state.table.table_name, row)
                }
                (SourceChange::Remove(_), Some(stored)) => SourceChange::Remove(stored),
                (SourceChange::Remove(row), None) => {
                    panic!("Row not found in {}: {}", state.table.table_name, row)
                }
            };
            let outputs: Vec<(ConnectionId, Rc<dyn Output>)> = state
                .connections
                .iter()
                .filter_map(|c| c.output.clone().map(|o| (c.id, o)))
                .collect();
            trace!(
                table = %state.table.table_name,
                kind = %change.kind(),
                row = %change.row(),
                outputs = outputs.len(),
                "push"
            );
            (change, outputs)
        };

        let node = Node::new(change.row().clone());
        let out_change = match &change {
            SourceChange::Add(_) => Change::Add(node),
            SourceChange::Remove(_) => Change::Remove(node),
        };

        for (connection, output) in outputs {
            self.state.borrow_mut().overlay = Some(Overlay {
                connection,
                change: change.clone(),
            });
            output.push(out_change.clone());
        }

        let mut state = self.state.borrow_mut();
        state.overlay = None;
        for (sort, index) in state.indexes.iter_mut() {
            let key = IndexKey::from_row(change.row(), sort);
            match &change {
                SourceChange::Add(row) => {
                    index.data.insert(key, row.clone());
                }
                SourceChange::Remove(_) => {
                    index.data.remove(&key);
                }
            }
        }
    }

    fn commit(&self, version: u64) {
        let mut state = self.state.borrow_mut();
        debug!(table = %state.table.table_name, version, "commit");
        state.committed_version = Some(version);
    }
}

/// One connection's view of a `MemorySource`.
struct SourceConnection {
    state: Rc<RefCell<SourceState>>,
    id: ConnectionId,
    schema: Rc<SourceSchema>,
}

impl SourceConnection {
    fn stream(&self, req: FetchRequest) -> Stream {
        let mut state = self.state.borrow_mut();
        let primary_key = state.table.primary_key.clone();
        let conn_sort = state.connection(self.id).sort.clone();
        let filters = state.connection(self.id).optional_filters.clone();

        let constraint = req.constraint.filter(|c| !c.is_empty());

        // Constrained fetches need an index sorted by the constraint first.
        // A single-column primary key constraint has at most one match, so the
        // primary index serves it whatever the requested order.
        let mut index_sort: SortOrder = Vec::new();
        if let Some(c) = &constraint {
            index_sort.extend(c.keys().map(asc));
        }
        let by_pk = match &constraint {
            Some(c) => primary_key.len() == 1 && c.len() == 1 && c.contains_key(&primary_key[0]),
            None => false,
        };
        if !by_pk {
            index_sort.extend(conn_sort.iter().cloned());
        }
        state.get_or_create_index(&index_sort, self.id);
        let comparator = make_comparator(&index_sort);

        if let (Some(start), Some(c)) = (&req.start, &constraint) {
            assert!(
                constraint_matches(c, &start.row),
                "Start row must match constraint"
            );
        }

        let scan_start = match (&constraint, &req.start) {
            (Some(c), _) => Some(IndexKey::scan_start(&index_sort, |col| c.get(col), req.reverse)),
            (None, Some(start)) => Some(IndexKey::from_row(&start.row, &index_sort)),
            (None, None) => None,
        };

        let cursor = Cursor {
            state: self.state.clone(),
            connection: self.id,
            index_sort,
            comparator: comparator.clone(),
            reverse: req.reverse,
            constraint: constraint.clone(),
            filters: filters.clone(),
            position: match scan_start {
                Some(key) => Bound::Included(key),
                None => Bound::Unbounded,
            },
            overlay: None,
            overlay_loaded: false,
            pending: None,
            exhausted: false,
        };

        let filtered: Box<dyn Iterator<Item = Row>> = if filters.is_empty() {
            Box::new(cursor)
        } else {
            Box::new(cursor.filter(move |row| filters.iter().all(|f| f(row))))
        };

        let started = with_start(filtered, req.start, comparator, req.reverse);
        let rows: Box<dyn Iterator<Item = Row>> = match constraint {
            Some(c) => Box::new(started.take_while(move |row| constraint_matches(&c, row))),
            None => started,
        };
        Box::new(rows.map(Node::new))
    }
}

impl Input for SourceConnection {
    fn schema(&self) -> Rc<SourceSchema> {
        self.schema.clone()
    }

    fn fetch(&self, req: FetchRequest) -> Stream {
        self.stream(req)
    }

    fn cleanup(&self, req: FetchRequest) -> Stream {
        self.stream(req)
    }

    fn set_output(&self, output: Rc<dyn Output>) {
        let mut state = self.state.borrow_mut();
        let Some(conn) = state.connections.iter_mut().find(|c| c.id == self.id) else {
            panic!("Connection not found");
        };
        assert!(conn.output.is_none(), "Output already set");
        conn.output = Some(output);
    }

    fn destroy(&self) {
        let mut state = self.state.borrow_mut();
        let Some(pos) = state.connections.iter().position(|c| c.id == self.id) else {
            panic!("Connection not found");
        };
        state.connections.remove(pos);

        let primary_sort = state.primary_sort.clone();
        let table = state.table.table_name.clone();
        state.indexes.retain(|sort, index| {
            if *sort == primary_sort {
                return true;
            }
            index.used_by.remove(&self.id);
            if index.used_by.is_empty() {
                debug!(table = %table, sort = ?sort, "dropping index");
                return false;
            }
            true
        });
        debug!(table = %table, connection = self.id, "disconnect");
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Source
    }
}

/// Lazy scan over one index.
///
/// Never holds a borrow of the source between steps: each step re-borrows
/// and continues from the last key it yielded.
struct Cursor {
    state: Rc<RefCell<SourceState>>,
    connection: ConnectionId,
    index_sort: SortOrder,
    comparator: RowComparator,
    reverse: bool,
    constraint: Option<Constraint>,
    filters: Vec<Predicate>,
    position: Bound<IndexKey>,
    overlay: Option<SourceChange>,
    overlay_loaded: bool,
    pending: Option<Row>,
    exhausted: bool,
}

impl Cursor {
    /// Picks up the in-flight change if this connection has already been
    /// told about it.
    fn load_overlay(&mut self) {
        self.overlay_loaded = true;
        let state = self.state.borrow();
        let Some(overlay) = &state.overlay else {
            return;
        };
        let Some(pos) = state.connections.iter().position(|c| c.id == self.connection) else {
            return;
        };
        let overlay_pos = state
            .connections
            .iter()
            .position(|c| c.id == overlay.connection);
        if overlay_pos.map_or(true, |op| pos > op) {
            return;
        }
        let row = overlay.change.row();
        let matches = self.constraint.as_ref().map_or(true, |c| constraint_matches(c, row))
            && self.filters.iter().all(|f| f(row));
        if matches {
            self.overlay = Some(overlay.change.clone());
        }
    }

    fn next_from_index(&mut self) -> Option<Row> {
        if self.exhausted {
            return None;
        }
        let state = self.state.borrow();
        let index = state.indexes.get(&self.index_sort)?;
        let found = if self.reverse {
            index
                .data
                .range((Bound::Unbounded, self.position.clone()))
                .next_back()
        } else {
            index
                .data
                .range((self.position.clone(), Bound::Unbounded))
                .next()
        };
        match found {
            Some((key, row)) => {
                self.position = Bound::Excluded(key.clone());
                Some(row.clone())
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }

    fn scan_order(&self, a: &Row, b: &Row) -> Ordering {
        let ord = self.comparator.compare(a, b);
        if self.reverse {
            ord.reverse()
        } else {
            ord
        }
    }
}

impl Iterator for Cursor {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if !self.overlay_loaded {
            self.load_overlay();
        }
        loop {
            let next = match self.pending.take() {
                Some(row) => Some(row),
                None => self.next_from_index(),
            };

            match self.overlay.clone() {
                Some(SourceChange::Add(added)) => {
                    if let Some(row) = &next {
                        if self.scan_order(row, &added) == Ordering::Less {
                            return next;
                        }
                    }
                    self.pending = next;
                    self.overlay = None;
                    return Some(added);
                }
                Some(SourceChange::Remove(removed)) => match next {
                    Some(row) if self.comparator.compare(&row, &removed) == Ordering::Equal => {
                        self.overlay = None;
                    }
                    next => return next,
                },
                None => return next,
            }
        }
    }
}

/// Drops rows before the requested start, in scan direction.
fn with_start(
    rows: Box<dyn Iterator<Item = Row>>,
    start: Option<Start>,
    comparator: RowComparator,
    reverse: bool,
) -> Box<dyn Iterator<Item = Row>> {
    let Some(start) = start else {
        return rows;
    };
    Box::new(rows.skip_while(move |row| {
        let mut ord = comparator.compare(row, &start.row);
        if reverse {
            ord = ord.reverse();
        }
        match start.basis {
            Basis::At => ord == Ordering::Less,
            Basis::After => ord != Ordering::Greater,
        }
    }))
}
