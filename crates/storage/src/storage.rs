//! The key/value interface stateful operators persist through.

use rill_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::rc::Rc;

/// Options for an ordered scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Only keys starting with this prefix.
    pub prefix: Option<String>,
    /// At most this many entries.
    pub limit: Option<usize>,
}

impl ScanOptions {
    /// Scans every key starting with `prefix`.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            limit: None,
        }
    }

    /// Caps the number of entries returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Synchronous key/value storage owned by exactly one operator.
pub trait Storage {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<JsonValue>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: JsonValue);

    /// Deletes `key`. Deleting a missing key is a no-op.
    fn del(&mut self, key: &str);

    /// Returns entries in ascending key order.
    fn scan(&self, options: ScanOptions) -> Vec<(String, JsonValue)>;
}

/// Shared handle to an operator's storage.
///
/// Shared only between an operator and the lazy streams it hands out.
pub type StorageRef = Rc<RefCell<Box<dyn Storage>>>;

/// Reads and decodes a typed value.
pub fn load<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Result<Option<T>> {
    match storage.get(key) {
        None => Ok(None),
        Some(json) => serde_json::from_value(json)
            .map(Some)
            .map_err(|e| Error::storage(format!("cannot decode {}: {}", key, e))),
    }
}

/// Encodes and writes a typed value.
pub fn store<T: Serialize>(storage: &mut dyn Storage, key: &str, value: &T) -> Result<()> {
    let json = serde_json::to_value(value)
        .map_err(|e| Error::storage(format!("cannot encode {}: {}", key, e)))?;
    storage.set(key, json);
    Ok(())
}
