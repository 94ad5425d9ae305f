//! In-process `Storage` backend.

use crate::storage::{ScanOptions, Storage, StorageRef};
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::rc::Rc;

/// `Storage` over a `BTreeMap`, so scans come back in key order.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    data: BTreeMap<String, JsonValue>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty storage behind a shared operator handle.
    pub fn shared() -> StorageRef {
        let storage: Box<dyn Storage> = Box::new(Self::new());
        Rc::new(RefCell::new(storage))
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<JsonValue> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: JsonValue) {
        self.data.insert(key.to_string(), value);
    }

    fn del(&mut self, key: &str) {
        self.data.remove(key);
    }

    fn scan(&self, options: ScanOptions) -> Vec<(String, JsonValue)> {
        let prefix = options.prefix.unwrap_or_default();
        let limit = options.limit.unwrap_or(usize::MAX);
        self.data
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(&prefix))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
