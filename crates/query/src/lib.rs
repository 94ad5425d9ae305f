//! Rill Query - Query plans and the pipeline builder for the Rill IVM engine.
//!
//! This crate turns a declarative query plan into a wired operator pipeline:
//!
//! - `ast`: `Query`, `Condition` and related subquery definitions
//! - `predicate`: Compiles conditions into row predicates
//! - `host`: The `Host` seam supplying sources, storage and configuration
//! - `config`: `EngineConfig`, loadable from JSON
//! - `builder`: `build_pipeline`, the plan walker
//!
//! # Example
//!
//! ```rust
//! use rill_core::{row, ColumnSchema, Columns, ValueType};
//! use rill_incremental::{FetchRequest, MemorySource, Source, SourceChange};
//! use rill_query::{build_pipeline, Condition, MemoryHost, Query};
//!
//! let mut columns = Columns::new();
//! columns.insert("id".into(), ColumnSchema::new(ValueType::Number));
//! columns.insert("open".into(), ColumnSchema::new(ValueType::Boolean));
//!
//! let mut host = MemoryHost::new();
//! let issues = host.add_source(MemorySource::new("issue", columns, vec!["id".into()]));
//! issues.push(SourceChange::Add(row! { "id" => 1, "open" => true }));
//! issues.push(SourceChange::Add(row! { "id" => 2, "open" => false }));
//!
//! let query = Query::new("issue").where_clause(Condition::eq("open", true));
//! let pipeline = build_pipeline(&query, &host).unwrap();
//! assert_eq!(pipeline.fetch(FetchRequest::new()).count(), 1);
//! ```

pub mod ast;
pub mod builder;
pub mod config;
pub mod host;
pub mod predicate;

pub use ast::{Condition, Correlation, CorrelatedSubquery, Operand, Query, QueryStart, SimpleOperator};
pub use builder::build_pipeline;
pub use config::EngineConfig;
pub use host::{Host, MemoryHost};
pub use predicate::create_predicate;
