//! Rill Storage - Operator state storage for the Rill IVM engine.
//!
//! Stateful operators (Take, Join) keep their bookkeeping in a key/value
//! `Storage` supplied by the host. This crate provides:
//!
//! - `Storage`: The key/value interface, with ordered prefix scans
//! - `MemoryStorage`: An in-process backend over a `BTreeMap`
//! - `storage_key` / `value_to_json`: Key encoding for tuples of row values
//!
//! # Example
//!
//! ```rust
//! use rill_storage::{storage_key, MemoryStorage, ScanOptions, Storage};
//! use rill_core::Value;
//! use serde_json::json;
//!
//! let mut storage = MemoryStorage::new();
//! storage.set(&storage_key("pKeySet", &[Value::from(1), Value::from(10)]), json!(true));
//! storage.set(&storage_key("pKeySet", &[Value::from(10), Value::from(3)]), json!(true));
//!
//! let prefix = storage_key("pKeySet", &[Value::from(1)]);
//! let hits = storage.scan(ScanOptions::prefix(prefix));
//! assert_eq!(hits.len(), 1);
//! ```

mod key;
mod memory;
mod storage;

pub use key::{storage_key, value_to_json};
pub use memory::MemoryStorage;
pub use storage::{load, store, ScanOptions, Storage, StorageRef};
