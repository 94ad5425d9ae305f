//! The seam between the engine and its environment.
//!
//! Pipelines never create sources or storage themselves; a `Host` provides
//! both, along with the engine configuration.

use crate::config::EngineConfig;
use hashbrown::HashMap;
use rill_incremental::{MemorySource, Source};
use rill_storage::{MemoryStorage, Storage};
use std::rc::Rc;
use tracing::debug;

/// Supplies sources and operator storage to the pipeline builder.
pub trait Host {
    /// Returns the source for `table`. May be called repeatedly for the
    /// same table.
    fn get_source(&self, table: &str) -> Option<Rc<dyn Source>>;

    /// Returns a fresh storage for one stateful operator.
    fn create_storage(&self) -> Box<dyn Storage>;

    fn config(&self) -> &EngineConfig;
}

/// A host over in-memory sources and storage.
#[derive(Default)]
pub struct MemoryHost {
    sources: HashMap<String, Rc<MemorySource>>,
    config: EngineConfig,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            sources: HashMap::new(),
            config,
        }
    }

    /// Registers a source under its table name, replacing any previous one.
    pub fn add_source(&mut self, source: MemorySource) -> Rc<MemorySource> {
        let table = source.table_schema().table_name;
        debug!(table = %table, "registering source");
        let source = Rc::new(source);
        self.sources.insert(table, source.clone());
        source
    }

    /// The registered source for `table`.
    pub fn source(&self, table: &str) -> Option<Rc<MemorySource>> {
        self.sources.get(table).cloned()
    }
}

impl Host for MemoryHost {
    fn get_source(&self, table: &str) -> Option<Rc<dyn Source>> {
        self.sources
            .get(table)
            .map(|source| source.clone() as Rc<dyn Source>)
    }

    fn create_storage(&self) -> Box<dyn Storage> {
        Box::new(MemoryStorage::new())
    }

    fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::{ColumnSchema, Columns, ValueType};

    fn table(name: &str) -> MemorySource {
        let mut columns = Columns::new();
        columns.insert("id".into(), ColumnSchema::new(ValueType::Number));
        MemorySource::new(name, columns, vec!["id".into()])
    }

    #[test]
    fn test_sources_by_table() {
        let mut host = MemoryHost::new();
        let issue = host.add_source(table("issue"));
        assert!(host.get_source("user").is_none());
        let found = host.get_source("issue").map(|s| s.table_schema().table_name);
        assert_eq!(found.as_deref(), Some("issue"));
        assert!(Rc::ptr_eq(&issue, &host.source("issue").unwrap()));
    }

    #[test]
    fn test_storage_is_fresh_per_call() {
        let host = MemoryHost::new();
        let mut a = host.create_storage();
        a.set("k", serde_json::json!(1));
        assert!(host.create_storage().get("k").is_none());
        assert!(host.config().push_optional_filters);
    }
}
