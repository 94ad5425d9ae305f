//! Rill Reactive - Materialized views and transaction boundaries.
//!
//! This crate sits at the end of a pipeline:
//!
//! - `MaterializedView`: keeps a pipeline's result as a sorted tree of
//!   entries and notifies listeners when flushed
//! - `TransactionCoordinator`: buffers source changes per transaction and
//!   flushes attached views once per commit
//!
//! # Example
//!
//! ```rust
//! use rill_core::{row, ColumnSchema, Columns, ValueType};
//! use rill_incremental::{MemorySource, SourceChange};
//! use rill_query::{build_pipeline, MemoryHost, Query};
//! use rill_reactive::{Format, MaterializedView, TransactionCoordinator};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let mut host = MemoryHost::new();
//! let mut columns = Columns::new();
//! columns.insert("id".into(), ColumnSchema::new(ValueType::Number));
//! let issues = host.add_source(MemorySource::new("issue", columns, vec!["id".into()]));
//!
//! let pipeline = build_pipeline(&Query::new("issue").limit(10), &host).unwrap();
//! let view = MaterializedView::new(pipeline, Format::list());
//! view.hydrate();
//!
//! let coordinator = TransactionCoordinator::new();
//! coordinator.attach_view(&view);
//!
//! let calls = Rc::new(Cell::new(0));
//! let c = calls.clone();
//! view.add_listener(move |_| c.set(c.get() + 1));
//!
//! coordinator
//!     .transaction(|tx| {
//!         tx.push(&issues, SourceChange::Add(row! { "id" => 1 }));
//!         tx.push(&issues, SourceChange::Add(row! { "id" => 2 }));
//!         Ok::<_, ()>(())
//!     })
//!     .unwrap();
//!
//! assert_eq!(view.data().len(), 2);
//! // Once when added, once for the commit.
//! assert_eq!(calls.get(), 2);
//! ```

pub mod subscription;
pub mod transaction;
pub mod view;

pub use subscription::ListenerId;
pub use transaction::{Commit, Transaction, TransactionCoordinator};
pub use view::{Entry, Format, MaterializedView, View};
