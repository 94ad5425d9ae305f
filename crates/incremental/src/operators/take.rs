//! Take operator.
//!
//! Keeps the first `limit` rows of its input, optionally per partition (the
//! rows sharing the values of the partition key columns). For each
//! partition it stores the number of rows it let through and its *bound*,
//! the last row inside the window. Later pushes are judged against the
//! bound, and rows leaving the window are backfilled from the input.

use crate::change::Change;
use crate::node::{empty_stream, Node, Stream};
use crate::operator::{
    Basis, Constraint, Downstream, FetchRequest, Input, OperatorKind, Output, OutputSlot,
};
use crate::schema::SourceSchema;
use rill_core::{assert_ordering_includes_pk, Row, Value};
use rill_storage::{load, storage_key, store, Storage, StorageRef};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::rc::Rc;
use tracing::{debug, trace};

const MAX_BOUND_KEY: &str = "maxBound";

/// Window state of one partition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TakeState {
    pub size: usize,
    pub bound: Option<Row>,
}

/// Column names rows are partitioned by.
pub type PartitionKey = Vec<String>;

pub struct Take {
    input: Rc<dyn Input>,
    schema: Rc<SourceSchema>,
    storage: StorageRef,
    limit: usize,
    partition_key: Option<PartitionKey>,
    output: OutputSlot,
}

/// Shared pieces of a `Take` that its lazy streams need.
#[derive(Clone)]
struct TakeStore {
    schema: Rc<SourceSchema>,
    storage: StorageRef,
}

impl TakeStore {
    fn state(&self, key: &str) -> Option<TakeState> {
        let storage = self.storage.borrow();
        match load(&**storage, key) {
            Ok(state) => state,
            Err(e) => panic!("{}", e),
        }
    }

    fn max_bound(&self) -> Option<Row> {
        let storage = self.storage.borrow();
        match load(&**storage, MAX_BOUND_KEY) {
            Ok(bound) => bound,
            Err(e) => panic!("{}", e),
        }
    }

    /// Writes a partition's state and raises `maxBound` if needed.
    fn set_state(&self, key: &str, size: usize, bound: Option<Row>, max_bound: Option<&Row>) {
        let raise = match (&bound, max_bound) {
            (Some(b), Some(max)) => self.schema.compare_rows(b, max) == Ordering::Greater,
            (Some(_), None) => true,
            (None, _) => false,
        };
        let mut storage = self.storage.borrow_mut();
        let storage: &mut dyn Storage = &mut **storage;
        let mut result = store(storage, key, &TakeState { size, bound: bound.clone() });
        if let (Some(b), true) = (&bound, raise) {
            result = result.and_then(|_| store(storage, MAX_BOUND_KEY, b));
        }
        if let Err(e) = result {
            panic!("{}", e);
        }
    }

    fn del(&self, key: &str) {
        self.storage.borrow_mut().del(key);
    }
}

impl Take {
    pub fn new(
        input: Rc<dyn Input>,
        storage: StorageRef,
        limit: usize,
        partition_key: Option<PartitionKey>,
    ) -> Rc<Self> {
        let schema = input.schema();
        assert_ordering_includes_pk(&schema.sort, &schema.primary_key);
        let take = Rc::new(Self {
            input: input.clone(),
            schema,
            storage,
            limit,
            partition_key,
            output: OutputSlot::new(),
        });
        input.set_output(Downstream::of(&take));
        take
    }

    fn store(&self) -> TakeStore {
        TakeStore {
            schema: self.schema.clone(),
            storage: self.storage.clone(),
        }
    }

    /// Key of the partition a row belongs to.
    fn state_key_for_row(&self, row: &Row) -> String {
        match &self.partition_key {
            Some(pk) => storage_key("take", &row.values_for(pk)),
            None => storage_key("take", &[]),
        }
    }

    /// Key of the partition a constraint names.
    fn state_key_for_constraint(&self, constraint: Option<&Constraint>) -> String {
        let parts: Vec<Value> = self
            .partition_key
            .iter()
            .flatten()
            .map(|column| {
                constraint
                    .and_then(|c| c.get(column))
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect();
        storage_key("take", &parts)
    }

    fn partition_constraint(&self, row: &Row) -> Option<Constraint> {
        self.partition_key.as_ref().map(|key| {
            key.iter()
                .map(|column| (column.clone(), row.get(column).clone()))
                .collect()
        })
    }

    fn initial_fetch(&self, req: FetchRequest) -> Stream {
        assert!(req.start.is_none(), "Start should be undefined");
        assert!(!req.reverse, "Reverse should be false");
        assert!(
            constraint_matches_partition_key(req.constraint.as_ref(), self.partition_key.as_ref()),
            "Constraint should match partition key"
        );
        if self.limit == 0 {
            return empty_stream();
        }

        let key = self.state_key_for_constraint(req.constraint.as_ref());
        let store = self.store();
        debug!(
            table = %self.schema.table_name,
            partition = %key,
            limit = self.limit,
            "take hydrating partition"
        );
        Box::new(InitialFetch {
            inner: self.input.fetch(req),
            store,
            key,
            limit: self.limit,
            size: 0,
            bound: None,
            done: false,
        })
    }

    fn push_add(&self, node: Node, state: TakeState, key: &str, constraint: Option<Constraint>) {
        let store = self.store();
        let max_bound = store.max_bound();
        let row = node.row.clone();

        if state.size < self.limit {
            let bound = match state.bound {
                Some(b) if self.schema.compare_rows(&b, &row) != Ordering::Less => b,
                _ => row.clone(),
            };
            store.set_state(key, state.size + 1, Some(bound), max_bound.as_ref());
            self.output.push(Change::Add(node));
            return;
        }

        let bound = match state.bound {
            Some(b) if self.schema.compare_rows(&row, &b) == Ordering::Less => b,
            _ => return,
        };

        // The added row pushes the bound row out of the window.
        let at_bound = FetchRequest {
            constraint,
            start: None,
            reverse: false,
        }
        .with_start(bound.clone(), Basis::At);
        let (bound_node, before_bound) = if self.limit == 1 {
            (self.input.fetch(at_bound).next(), None)
        } else {
            let mut nodes = self.input.fetch(at_bound.reversed());
            (nodes.next(), nodes.next())
        };
        let Some(bound_node) = bound_node else {
            panic!("Take bound row missing from input: {}", bound);
        };

        let new_bound = match before_bound {
            Some(before) if self.schema.compare_rows(&row, &before.row) != Ordering::Greater => {
                before.row
            }
            _ => row,
        };
        trace!(
            table = %self.schema.table_name,
            evicted = %bound_node.row,
            bound = %new_bound,
            "take evicting bound"
        );
        store.set_state(key, state.size, Some(new_bound), max_bound.as_ref());
        self.output.push(Change::Remove(bound_node));
        self.output.push(Change::Add(node));
    }

    fn push_remove(&self, node: Node, state: TakeState, key: &str, constraint: Option<Constraint>) {
        let Some(bound) = state.bound else {
            return;
        };
        if self.schema.compare_rows(&node.row, &bound) == Ordering::Greater {
            return;
        }

        let store = self.store();
        let max_bound = store.max_bound();

        // The row before the bound, in case nothing follows it.
        let before_bound = self
            .input
            .fetch(
                FetchRequest {
                    constraint: constraint.clone(),
                    start: None,
                    reverse: false,
                }
                .with_start(bound.clone(), Basis::After)
                .reversed(),
            )
            .next();

        // Walk forward from the bound looking for a row past it.
        let mut new_bound: Option<(Node, bool)> = before_bound.map(|n| {
            let past = self.schema.compare_rows(&n.row, &bound) == Ordering::Greater;
            (n, past)
        });
        if !matches!(new_bound, Some((_, true))) {
            let from_bound = FetchRequest {
                constraint,
                start: None,
                reverse: false,
            }
            .with_start(bound.clone(), Basis::At);
            for n in self.input.fetch(from_bound) {
                let past = self.schema.compare_rows(&n.row, &bound) == Ordering::Greater;
                new_bound = Some((n, past));
                if past {
                    break;
                }
            }
        }

        match new_bound {
            Some((backfill, true)) => {
                trace!(
                    table = %self.schema.table_name,
                    removed = %node.row,
                    backfill = %backfill.row,
                    "take backfilling"
                );
                store.set_state(key, state.size, Some(backfill.row.clone()), max_bound.as_ref());
                self.output.push(Change::Remove(node));
                self.output.push(Change::Add(backfill));
            }
            other => {
                let bound = other.map(|(n, _)| n.row);
                store.set_state(key, state.size.saturating_sub(1), bound, max_bound.as_ref());
                self.output.push(Change::Remove(node));
            }
        }
    }
}

impl Input for Take {
    fn schema(&self) -> Rc<SourceSchema> {
        self.schema.clone()
    }

    fn fetch(&self, req: FetchRequest) -> Stream {
        let partitioned_by_request = match &self.partition_key {
            None => true,
            Some(pk) => req
                .constraint
                .as_ref()
                .map_or(false, |c| constraint_matches_partition_key(Some(c), Some(pk))),
        };
        let store = self.store();

        if partitioned_by_request {
            let key = self.state_key_for_constraint(req.constraint.as_ref());
            let Some(state) = store.state(&key) else {
                return self.initial_fetch(req);
            };
            let Some(bound) = state.bound else {
                return empty_stream();
            };
            let schema = self.schema.clone();
            return Box::new(
                self.input
                    .fetch(req)
                    .take_while(move |n| schema.compare_rows(&bound, &n.row) != Ordering::Less),
            );
        }

        // Partitioned, but the request does not name one partition: bound by
        // the largest bound of any partition and check each row's own.
        let Some(max_bound) = store.max_bound() else {
            return empty_stream();
        };
        let partition_key = self.partition_key.clone().unwrap_or_default();
        let schema = self.schema.clone();
        Box::new(
            self.input
                .fetch(req)
                .take_while({
                    let schema = schema.clone();
                    move |n| schema.compare_rows(&n.row, &max_bound) != Ordering::Greater
                })
                .filter(move |n| {
                    let key = storage_key("take", &n.row.values_for(&partition_key));
                    match store.state(&key) {
                        Some(TakeState { bound: Some(b), .. }) => {
                            schema.compare_rows(&b, &n.row) != Ordering::Less
                        }
                        _ => false,
                    }
                }),
        )
    }

    fn cleanup(&self, req: FetchRequest) -> Stream {
        assert!(req.start.is_none(), "Start should be undefined");
        assert!(
            constraint_matches_partition_key(req.constraint.as_ref(), self.partition_key.as_ref()),
            "Constraint should match partition key"
        );
        let key = self.state_key_for_constraint(req.constraint.as_ref());
        self.store().del(&key);
        Box::new(self.input.cleanup(req).take(self.limit))
    }

    fn set_output(&self, output: Rc<dyn Output>) {
        self.output.set(output);
    }

    fn destroy(&self) {
        self.input.destroy();
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Take
    }
}

impl Output for Take {
    fn push(&self, change: Change) {
        let key = self.state_key_for_row(change.row());
        let Some(state) = self.store().state(&key) else {
            return;
        };
        let constraint = self.partition_constraint(change.row());

        match change {
            Change::Add(node) => self.push_add(node, state, &key, constraint),
            Change::Remove(node) => self.push_remove(node, state, &key, constraint),
            Change::Child { row, child } => {
                if let Some(bound) = &state.bound {
                    if self.schema.compare_rows(&row, bound) != Ordering::Greater {
                        self.output.push(Change::Child { row, child });
                    }
                }
            }
        }
    }
}

/// First fetch of a partition: yields up to `limit` rows and records the
/// partition's state as it goes.
struct InitialFetch {
    inner: Stream,
    store: TakeStore,
    key: String,
    limit: usize,
    size: usize,
    bound: Option<Row>,
    done: bool,
}

impl InitialFetch {
    fn finish(&mut self) {
        self.done = true;
        let max_bound = self.store.max_bound();
        self.store
            .set_state(&self.key, self.size, self.bound.clone(), max_bound.as_ref());
    }
}

impl Iterator for InitialFetch {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        if self.done {
            return None;
        }
        if self.size == self.limit {
            self.finish();
            return None;
        }
        match self.inner.next() {
            Some(node) => {
                self.size += 1;
                self.bound = Some(node.row.clone());
                let max_bound = self.store.max_bound();
                self.store
                    .set_state(&self.key, self.size, self.bound.clone(), max_bound.as_ref());
                if self.size == self.limit {
                    self.done = true;
                }
                Some(node)
            }
            None => {
                self.finish();
                None
            }
        }
    }
}

/// True if the constraint names exactly the partition key columns.
fn constraint_matches_partition_key(
    constraint: Option<&Constraint>,
    partition_key: Option<&PartitionKey>,
) -> bool {
    match (constraint, partition_key) {
        (None, None) => true,
        (Some(c), Some(pk)) => c.len() == pk.len() && pk.iter().all(|k| c.contains_key(k)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::{CaughtChange, Catch};
    use crate::test_util::{add_all, caught_ids, id_of, ids, source};
    use crate::{MemorySource, Source, SourceChange};
    use rill_core::{asc, row, ValueType};
    use rill_storage::MemoryStorage;

    fn storage() -> StorageRef {
        MemoryStorage::shared()
    }

    fn summary(changes: &[CaughtChange]) -> Vec<(String, i64)> {
        changes
            .iter()
            .map(|c| (c.kind().to_string(), id_of(c.row())))
            .collect()
    }

    fn by_a() -> (MemorySource, Rc<Take>, Rc<Catch>, StorageRef) {
        let s = source("t", &[("id", ValueType::Number), ("a", ValueType::String)]);
        add_all(
            &s,
            vec![row! { "id" => 1, "a" => "x" }, row! { "id" => 2, "a" => "y" }],
        );
        let st = storage();
        let take = Take::new(s.connect(vec![asc("a"), asc("id")], vec![]), st.clone(), 1, None);
        let catch = Catch::new(take.clone());
        (s, take, catch, st)
    }

    #[test]
    fn test_limit_one_eviction() {
        let (s, _take, catch, _st) = by_a();
        assert_eq!(caught_ids(&catch.fetch_all(FetchRequest::new())), vec![1]);

        s.push(SourceChange::Add(row! { "id" => 0, "a" => "w" }));
        assert_eq!(
            summary(&catch.take_pushes()),
            vec![("remove".into(), 1), ("add".into(), 0)]
        );
        assert_eq!(caught_ids(&catch.fetch_all(FetchRequest::new())), vec![0]);
    }

    #[test]
    fn test_push_before_hydration_is_dropped() {
        let (s, _take, catch, _st) = by_a();
        s.push(SourceChange::Add(row! { "id" => 0, "a" => "w" }));
        assert!(catch.take_pushes().is_empty());
    }

    #[test]
    fn test_state_is_recorded_in_storage() {
        let (_s, _take, catch, st) = by_a();
        catch.fetch_all(FetchRequest::new());
        let state: Option<TakeState> = load(&**st.borrow(), &storage_key("take", &[])).unwrap();
        assert_eq!(
            state,
            Some(TakeState {
                size: 1,
                bound: Some(row! { "id" => 1, "a" => "x" }),
            })
        );
        let max: Option<Row> = load(&**st.borrow(), MAX_BOUND_KEY).unwrap();
        assert_eq!(max, Some(row! { "id" => 1, "a" => "x" }));
    }

    fn numbered(limit: usize, count: i64) -> (MemorySource, Rc<Catch>) {
        let s = source("t", &[("id", ValueType::Number)]);
        add_all(&s, (1..=count).map(|i| row! { "id" => i * 10 }).collect());
        let take = Take::new(s.connect(vec![asc("id")], vec![]), storage(), limit, None);
        let catch = Catch::new(take);
        catch.fetch_all(FetchRequest::new());
        (s, catch)
    }

    #[test]
    fn test_add_under_limit_and_after_bound() {
        let (s, catch) = numbered(3, 2);
        s.push(SourceChange::Add(row! { "id" => 5 }));
        s.push(SourceChange::Add(row! { "id" => 50 }));
        assert_eq!(summary(&catch.take_pushes()), vec![("add".into(), 5)]);
        assert_eq!(caught_ids(&catch.fetch_all(FetchRequest::new())), vec![5, 10, 20]);
    }

    #[test]
    fn test_add_inside_full_window_moves_bound_back() {
        let (s, catch) = numbered(3, 5);
        s.push(SourceChange::Add(row! { "id" => 15 }));
        assert_eq!(
            summary(&catch.take_pushes()),
            vec![("remove".into(), 30), ("add".into(), 15)]
        );
        assert_eq!(caught_ids(&catch.fetch_all(FetchRequest::new())), vec![10, 15, 20]);

        s.push(SourceChange::Add(row! { "id" => 25 }));
        assert!(catch.take_pushes().is_empty());
    }

    #[test]
    fn test_remove_backfills_exactly_once() {
        let (s, catch) = numbered(3, 5);
        s.push(SourceChange::Remove(row! { "id" => 20 }));
        assert_eq!(
            summary(&catch.take_pushes()),
            vec![("remove".into(), 20), ("add".into(), 40)]
        );
        s.push(SourceChange::Remove(row! { "id" => 40 }));
        assert_eq!(
            summary(&catch.take_pushes()),
            vec![("remove".into(), 40), ("add".into(), 50)]
        );
        assert_eq!(caught_ids(&catch.fetch_all(FetchRequest::new())), vec![10, 30, 50]);
    }

    #[test]
    fn test_remove_without_backfill_shrinks_window() {
        let (s, catch) = numbered(3, 3);
        s.push(SourceChange::Remove(row! { "id" => 30 }));
        assert_eq!(summary(&catch.take_pushes()), vec![("remove".into(), 30)]);
        s.push(SourceChange::Remove(row! { "id" => 10 }));
        assert_eq!(summary(&catch.take_pushes()), vec![("remove".into(), 10)]);
        assert_eq!(caught_ids(&catch.fetch_all(FetchRequest::new())), vec![20]);

        // Room again, so the next add is accepted wherever it lands.
        s.push(SourceChange::Add(row! { "id" => 99 }));
        assert_eq!(summary(&catch.take_pushes()), vec![("add".into(), 99)]);
    }

    #[test]
    fn test_remove_after_bound_is_dropped() {
        let (s, catch) = numbered(2, 4);
        s.push(SourceChange::Remove(row! { "id" => 40 }));
        assert!(catch.take_pushes().is_empty());
    }

    #[test]
    fn test_limit_zero_yields_nothing() {
        let (s, catch) = numbered(0, 3);
        assert!(catch.fetch_all(FetchRequest::new()).is_empty());
        s.push(SourceChange::Add(row! { "id" => 1 }));
        assert!(catch.take_pushes().is_empty());
    }

    #[test]
    fn test_partitioned_windows() {
        let s = source(
            "comment",
            &[("id", ValueType::Number), ("issue", ValueType::String)],
        );
        add_all(
            &s,
            vec![
                row! { "id" => 1, "issue" => "a" },
                row! { "id" => 2, "issue" => "a" },
                row! { "id" => 3, "issue" => "a" },
                row! { "id" => 4, "issue" => "b" },
            ],
        );
        let take = Take::new(
            s.connect(vec![asc("id")], vec![]),
            storage(),
            2,
            Some(vec!["issue".into()]),
        );
        let catch = Catch::new(take.clone());
        let partition = |v: &str| {
            let mut c = Constraint::new();
            c.insert("issue".into(), Value::from(v));
            FetchRequest::constrained(c)
        };

        assert_eq!(caught_ids(&catch.fetch_all(partition("a"))), vec![1, 2]);
        assert_eq!(caught_ids(&catch.fetch_all(partition("b"))), vec![4]);
        // Unpartitioned fetch goes through maxBound and each row's own bound.
        assert_eq!(ids(take.fetch(FetchRequest::new())), vec![1, 2, 4]);

        s.push(SourceChange::Add(row! { "id" => 5, "issue" => "b" }));
        s.push(SourceChange::Add(row! { "id" => 6, "issue" => "a" }));
        assert_eq!(summary(&catch.take_pushes()), vec![("add".into(), 5)]);

        // Cleanup forgets the partition, so pushes for it are dropped.
        assert_eq!(caught_ids(&catch.cleanup_all(partition("b"))), vec![4, 5]);
        s.push(SourceChange::Remove(row! { "id" => 4, "issue" => "b" }));
        assert!(catch.take_pushes().is_empty());
    }

    #[test]
    fn test_constraint_matches_partition_key() {
        let pk = vec!["a".to_string(), "b".to_string()];
        let mut c = Constraint::new();
        assert!(constraint_matches_partition_key(None, None));
        assert!(!constraint_matches_partition_key(None, Some(&pk)));
        c.insert("a".into(), Value::from(1));
        assert!(!constraint_matches_partition_key(Some(&c), Some(&pk)));
        c.insert("b".into(), Value::from(1));
        assert!(constraint_matches_partition_key(Some(&c), Some(&pk)));
        assert!(!constraint_matches_partition_key(Some(&c), None));
    }
}
