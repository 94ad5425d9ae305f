//! Transaction boundaries.
//!
//! Source changes made inside a transaction are buffered and only reach the
//! sources when the outermost transaction succeeds. The coordinator then
//! pushes them in order, commits every touched source with the new version
//! and runs the commit listeners, which is where attached views flush. A
//! failed transaction is discarded whole, so views never observe it.

use crate::subscription::{ListenerId, Listeners};
use crate::view::MaterializedView;
use rill_incremental::{Source, SourceChange};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

/// Summary handed to commit listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Commit {
    pub version: u64,
    /// Number of source changes applied.
    pub changes: usize,
}

/// Handle for buffering changes inside `TransactionCoordinator::transaction`.
pub struct Transaction<'a> {
    coordinator: &'a TransactionCoordinator,
}

impl Transaction<'_> {
    /// Buffers a change to `source` until the outermost transaction commits.
    pub fn push<S: Source + 'static>(&self, source: &Rc<S>, change: SourceChange) {
        let source: Rc<dyn Source> = source.clone();
        self.coordinator.buffer(source, change);
    }

    /// Number of changes buffered so far, nested transactions included.
    pub fn pending(&self) -> usize {
        self.coordinator.pending.borrow().len()
    }
}

/// Groups source changes into transactions and flushes views on commit.
#[derive(Default)]
pub struct TransactionCoordinator {
    depth: Cell<usize>,
    pending: RefCell<Vec<(Rc<dyn Source>, SourceChange)>>,
    dirty: RefCell<Vec<Rc<dyn Source>>>,
    version: Cell<u64>,
    listeners: RefCell<Listeners<Commit>>,
}

impl TransactionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` as a transaction.
    ///
    /// Transactions started inside `f` join this one: their changes commit
    /// or roll back with the outermost transaction.
    pub fn transaction<T, E>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        let depth = self.depth.get();
        self.depth.set(depth + 1);
        let scope = Scope {
            coordinator: self,
            depth,
        };
        let result = f(&Transaction { coordinator: self });
        drop(scope);
        if depth > 0 {
            return result;
        }
        match &result {
            Ok(_) => self.commit(),
            Err(_) => self.rollback(),
        }
        result
    }

    /// True while a transaction is running.
    pub fn in_transaction(&self) -> bool {
        self.depth.get() > 0
    }

    /// Version of the last committed transaction; 0 before the first.
    pub fn version(&self) -> u64 {
        self.version.get()
    }

    /// Registers a listener run after every commit.
    pub fn on_commit<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Commit) + 'static,
    {
        self.listeners.borrow_mut().subscribe(Rc::new(listener))
    }

    /// Returns true if the listener was registered.
    pub fn remove_commit_listener(&self, id: ListenerId) -> bool {
        self.listeners.borrow_mut().unsubscribe(id)
    }

    /// Flushes `view` after every commit until it is dropped or destroyed.
    pub fn attach_view(&self, view: &Rc<MaterializedView>) -> ListenerId {
        let view: Weak<MaterializedView> = Rc::downgrade(view);
        self.on_commit(move |_| {
            if let Some(view) = view.upgrade() {
                if !view.is_destroyed() {
                    view.flush();
                }
            }
        })
    }

    fn buffer(&self, source: Rc<dyn Source>, change: SourceChange) {
        assert!(self.in_transaction(), "Source change outside of a transaction");
        let mut dirty = self.dirty.borrow_mut();
        if !dirty.iter().any(|s| same_source(s, &source)) {
            dirty.push(source.clone());
        }
        let table = source.table_schema().table_name;
        trace!(table = %table, "buffered source change");
        self.pending.borrow_mut().push((source, change));
    }

    fn commit(&self) {
        let changes = std::mem::take(&mut *self.pending.borrow_mut());
        let dirty = std::mem::take(&mut *self.dirty.borrow_mut());
        if changes.is_empty() {
            trace!("empty transaction");
            return;
        }

        let count = changes.len();
        for (source, change) in changes {
            source.push(change);
        }
        let version = self.version.get() + 1;
        self.version.set(version);
        for source in &dirty {
            source.commit(version);
        }
        debug!(version, changes = count, sources = dirty.len(), "committed transaction");

        let commit = Commit {
            version,
            changes: count,
        };
        let listeners = self.listeners.borrow().snapshot();
        for listener in listeners {
            listener(&commit);
        }
    }

    fn rollback(&self) {
        let discarded = std::mem::take(&mut *self.pending.borrow_mut()).len();
        self.dirty.borrow_mut().clear();
        warn!(discarded, "rolled back transaction");
    }
}

/// Restores the nesting depth when a transaction body exits, and discards
/// the outermost transaction if its body panicked.
struct Scope<'a> {
    coordinator: &'a TransactionCoordinator,
    depth: usize,
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.coordinator.depth.set(self.depth);
        if self.depth == 0 && std::thread::panicking() {
            self.coordinator.rollback();
        }
    }
}

fn same_source(a: &Rc<dyn Source>, b: &Rc<dyn Source>) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{Format, View};
    use rill_core::{asc, row, ColumnSchema, Columns, ValueType};
    use rill_incremental::MemorySource;

    fn ids(source: &MemorySource) -> Vec<i64> {
        source
            .rows()
            .iter()
            .map(|r| r.get("id").as_f64().unwrap_or(f64::NAN) as i64)
            .collect()
    }

    fn source(table: &str) -> Rc<MemorySource> {
        let mut cols = Columns::new();
        cols.insert("id".into(), ColumnSchema::new(ValueType::Number));
        Rc::new(MemorySource::new(table, cols, vec!["id".into()]))
    }

    #[test]
    fn test_commit_pushes_and_commits_sources() {
        let coordinator = TransactionCoordinator::new();
        let a = source("a");
        let b = source("b");
        let commits = Rc::new(RefCell::new(Vec::new()));
        let c = commits.clone();
        coordinator.on_commit(move |commit| c.borrow_mut().push(*commit));

        let result: Result<(), ()> = coordinator.transaction(|tx| {
            tx.push(&a, SourceChange::Add(row! { "id" => 1 }));
            tx.push(&a, SourceChange::Add(row! { "id" => 2 }));
            tx.push(&b, SourceChange::Add(row! { "id" => 1 }));
            // Buffered until commit.
            assert_eq!(a.len(), 0);
            assert_eq!(tx.pending(), 3);
            Ok(())
        });

        assert!(result.is_ok());
        assert_eq!(coordinator.version(), 1);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);
        assert_eq!(a.committed_version(), Some(1));
        assert_eq!(b.committed_version(), Some(1));
        assert_eq!(*commits.borrow(), vec![Commit { version: 1, changes: 3 }]);
    }

    #[test]
    fn test_nested_transactions_commit_once() {
        let coordinator = TransactionCoordinator::new();
        let a = source("a");
        let commits = Rc::new(Cell::new(0));
        let c = commits.clone();
        coordinator.on_commit(move |_| c.set(c.get() + 1));

        let result: Result<u32, String> = coordinator.transaction(|tx| {
            tx.push(&a, SourceChange::Add(row! { "id" => 1 }));
            let inner: Result<u32, String> = coordinator.transaction(|inner| {
                inner.push(&a, SourceChange::Add(row! { "id" => 2 }));
                Ok(7)
            });
            assert_eq!(coordinator.version(), 0);
            assert_eq!(a.len(), 0);
            inner
        });

        assert_eq!(result, Ok(7));
        assert_eq!(commits.get(), 1);
        assert_eq!(coordinator.version(), 1);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_error_rolls_back() {
        let coordinator = TransactionCoordinator::new();
        let a = source("a");
        let commits = Rc::new(Cell::new(0));
        let c = commits.clone();
        coordinator.on_commit(move |_| c.set(c.get() + 1));

        let result: Result<(), &str> = coordinator.transaction(|tx| {
            tx.push(&a, SourceChange::Add(row! { "id" => 1 }));
            Err("conflict")
        });

        assert_eq!(result, Err("conflict"));
        assert_eq!(a.len(), 0);
        assert_eq!(a.committed_version(), None);
        assert_eq!(coordinator.version(), 0);
        assert_eq!(commits.get(), 0);
        assert!(!coordinator.in_transaction());

        // The next transaction starts clean.
        let ok: Result<(), ()> = coordinator.transaction(|tx| {
            tx.push(&a, SourceChange::Add(row! { "id" => 2 }));
            Ok(())
        });
        assert!(ok.is_ok());
        assert_eq!(a.rows().len(), 1);
        assert_eq!(coordinator.version(), 1);
    }

    #[test]
    fn test_panic_rolls_back_and_releases_nesting() {
        let coordinator = TransactionCoordinator::new();
        let a = source("a");

        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), ()> = coordinator.transaction(|tx| {
                tx.push(&a, SourceChange::Add(row! { "id" => 1 }));
                panic!("listener bug");
            });
        }));

        assert!(caught.is_err());
        assert!(!coordinator.in_transaction());
        assert_eq!(a.len(), 0);

        let result: Result<(), ()> = coordinator.transaction(|tx| {
            assert_eq!(tx.pending(), 0);
            tx.push(&a, SourceChange::Add(row! { "id" => 2 }));
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(coordinator.version(), 1);
        assert_eq!(ids(&a), vec![2]);
    }

    #[test]
    fn test_inner_panic_caught_by_outer_keeps_outer_open() {
        let coordinator = TransactionCoordinator::new();
        let a = source("a");

        let result: Result<(), ()> = coordinator.transaction(|tx| {
            tx.push(&a, SourceChange::Add(row! { "id" => 1 }));
            let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let _: Result<(), ()> = coordinator.transaction(|_| panic!("inner"));
            }));
            assert!(caught.is_err());
            assert!(coordinator.in_transaction());
            Ok(())
        });

        assert!(result.is_ok());
        assert!(!coordinator.in_transaction());
        assert_eq!(coordinator.version(), 1);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_empty_transaction_does_not_commit() {
        let coordinator = TransactionCoordinator::new();
        let commits = Rc::new(Cell::new(0));
        let c = commits.clone();
        coordinator.on_commit(move |_| c.set(c.get() + 1));
        let result: Result<(), ()> = coordinator.transaction(|_| Ok(()));
        assert!(result.is_ok());
        assert_eq!(coordinator.version(), 0);
        assert_eq!(commits.get(), 0);
    }

    #[test]
    fn test_attached_view_flushes_once_per_commit() {
        let coordinator = TransactionCoordinator::new();
        let a = source("a");
        let view = MaterializedView::new(a.connect(vec![asc("id")], vec![]), Format::list());
        view.hydrate();
        coordinator.attach_view(&view);

        let sizes = Rc::new(RefCell::new(Vec::new()));
        let s = sizes.clone();
        view.add_listener(move |data: &View| s.borrow_mut().push(data.len()));

        let result: Result<(), ()> = coordinator.transaction(|tx| {
            for id in 1..=3 {
                tx.push(&a, SourceChange::Add(row! { "id" => id }));
            }
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(*sizes.borrow(), vec![0, 3]);
    }

    #[test]
    fn test_remove_commit_listener() {
        let coordinator = TransactionCoordinator::new();
        let a = source("a");
        let commits = Rc::new(Cell::new(0));
        let c = commits.clone();
        let id = coordinator.on_commit(move |_| c.set(c.get() + 1));
        assert!(coordinator.remove_commit_listener(id));
        let result: Result<(), ()> = coordinator.transaction(|tx| {
            tx.push(&a, SourceChange::Add(row! { "id" => 1 }));
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(commits.get(), 0);
    }
}
