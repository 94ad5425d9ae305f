//! Builds operator pipelines from query plans.
//!
//! The plan is walked depth first. For each (sub)query the builder connects
//! to the table's source and stacks, in order: `Skip` for the start row, the
//! `Filter`s of the condition tree (`OR` as `FanOut` / `FanIn`), `Take` for
//! the limit, and one `Join` per related subquery.

use crate::ast::{Condition, CorrelatedSubquery, Query};
use crate::host::Host;
use crate::predicate::create_predicate;
use rill_core::{Error, Result};
use rill_incremental::{
    FanIn, FanOut, Filter, FilterMode, Input, Join, JoinArgs, Predicate, Skip, SkipBound, Snitch,
    Take,
};
use rill_storage::StorageRef;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, trace};

/// Builds the pipeline for `query` against `host`.
pub fn build_pipeline(query: &Query, host: &dyn Host) -> Result<Rc<dyn Input>> {
    debug!(table = %query.table, "building pipeline");
    build(query, host, None, false)
}

/// `hidden` marks the query's own rows as hidden: its joins carry the flag
/// so views splice their relationships into the parent row.
fn build(
    query: &Query,
    host: &dyn Host,
    partition_key: Option<&[String]>,
    hidden: bool,
) -> Result<Rc<dyn Input>> {
    let source = host
        .get_source(&query.table)
        .ok_or_else(|| Error::source_not_found(&query.table))?;
    let table = source.table_schema();
    let has_column = |column: &str| table.columns.contains_key(column);
    if hidden && query.related.is_empty() {
        return Err(Error::invalid_query(format!(
            "hidden subquery of {} must have related subqueries",
            table.table_name
        )));
    }

    let order = query.completed_order(&table.primary_key);
    if let Some(part) = order.iter().find(|part| !has_column(part.column.as_str())) {
        return Err(Error::column_not_found(&table.table_name, &part.column));
    }
    if let Some(condition) = &query.where_clause {
        if let Some(column) = condition.columns().into_iter().find(|c| !has_column(*c)) {
            return Err(Error::column_not_found(&table.table_name, column));
        }
    }

    let (optional_filters, applied_all) = match &query.where_clause {
        Some(condition) if host.config().push_optional_filters => optional_filters(condition)?,
        _ => (Vec::new(), false),
    };
    let mode = if applied_all {
        FilterMode::PushOnly
    } else {
        FilterMode::All
    };

    let mut end = instrument(
        host,
        &query.table,
        source.connect(order, optional_filters),
    );

    if let Some(start) = &query.start {
        let skip = Skip::new(
            end,
            SkipBound {
                row: start.row.clone(),
                exclusive: start.exclusive,
            },
        );
        end = instrument(host, &query.table, skip);
    }

    if let Some(condition) = &query.where_clause {
        end = apply_where(end, condition, mode, host, &query.table)?;
    }

    if let Some(limit) = query.limit {
        trace!(table = %query.table, limit, partition_key = ?partition_key, "adding take");
        let take = Take::new(end, storage(host), limit, partition_key.map(<[String]>::to_vec));
        end = instrument(host, &query.table, take);
    }

    for related in &query.related {
        end = apply_related(end, related, host, &query.table, &has_column, hidden)?;
    }

    Ok(end)
}

/// Simple conditions a source can apply while fetching, and whether they
/// cover the whole condition.
fn optional_filters(condition: &Condition) -> Result<(Vec<Predicate>, bool)> {
    match condition {
        Condition::Simple { .. } => Ok((vec![create_predicate(condition)?], true)),
        Condition::And { conditions } => {
            let mut filters = Vec::new();
            let mut applied_all = true;
            for c in conditions {
                match c {
                    Condition::Simple { .. } => filters.push(create_predicate(c)?),
                    _ => applied_all = false,
                }
            }
            Ok((filters, applied_all))
        }
        Condition::Or { .. } => Ok((Vec::new(), false)),
    }
}

fn apply_where(
    input: Rc<dyn Input>,
    condition: &Condition,
    mode: FilterMode,
    host: &dyn Host,
    table: &str,
) -> Result<Rc<dyn Input>> {
    match condition {
        Condition::Simple { .. } => {
            let filter = Filter::new(input, mode, create_predicate(condition)?);
            Ok(instrument(host, table, filter))
        }
        Condition::And { conditions } => conditions
            .iter()
            .try_fold(input, |end, c| apply_where(end, c, mode, host, table)),
        Condition::Or { conditions } => {
            if conditions.is_empty() {
                return Err(Error::invalid_query("OR needs at least one condition"));
            }
            let fan_out = FanOut::new(input);
            let branches = conditions
                .iter()
                .map(|c| apply_where(fan_out.clone(), c, mode, host, table))
                .collect::<Result<Vec<_>>>()?;
            trace!(table = %table, branches = branches.len(), "adding fan-out/fan-in");
            let fan_in = FanIn::new(&fan_out, branches);
            Ok(instrument(host, table, fan_in))
        }
    }
}

fn apply_related(
    parent: Rc<dyn Input>,
    related: &CorrelatedSubquery,
    host: &dyn Host,
    table: &str,
    has_column: &dyn Fn(&str) -> bool,
    hidden: bool,
) -> Result<Rc<dyn Input>> {
    let subquery = &related.subquery;
    let alias = subquery
        .alias
        .clone()
        .ok_or_else(|| Error::invalid_query(format!("subquery of {} must have an alias", table)))?;
    let correlation = &related.correlation;
    if correlation.parent_field.len() != correlation.child_field.len() {
        return Err(Error::invalid_query(format!(
            "correlation of {} has {} parent and {} child fields",
            alias,
            correlation.parent_field.len(),
            correlation.child_field.len()
        )));
    }
    if let Some(column) = correlation.parent_field.iter().find(|c| !has_column(c.as_str())) {
        return Err(Error::column_not_found(table, column));
    }

    let child = build(
        subquery,
        host,
        Some(correlation.child_field.as_slice()),
        related.hidden,
    )?;
    let child_schema = child.schema();
    if let Some(column) = correlation
        .child_field
        .iter()
        .find(|c| !child_schema.columns.contains_key(c.as_str()))
    {
        return Err(Error::column_not_found(&child_schema.table_name, column));
    }

    trace!(table = %table, relationship = %alias, hidden, "adding join");
    let join = Join::new(JoinArgs {
        parent,
        child,
        storage: storage(host),
        parent_key: correlation.parent_field.clone(),
        child_key: correlation.child_field.clone(),
        relationship_name: alias,
        hidden,
    });
    Ok(instrument(host, table, join))
}

fn storage(host: &dyn Host) -> StorageRef {
    Rc::new(RefCell::new(host.create_storage()))
}

/// Wraps `op` in a `Snitch` when the host asks for instrumentation.
fn instrument(host: &dyn Host, table: &str, op: Rc<dyn Input>) -> Rc<dyn Input> {
    if !host.config().instrument_operators {
        return op;
    }
    let name = format!("{}:{}", table, op.kind());
    Snitch::new(op, name, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SimpleOperator;
    use crate::config::EngineConfig;
    use crate::host::MemoryHost;
    use rill_core::{row, ColumnSchema, Columns, ValueType};
    use rill_incremental::{FetchRequest, MemorySource, OperatorKind, Source, SourceChange};

    fn host(config: EngineConfig) -> MemoryHost {
        let mut host = MemoryHost::with_config(config);
        let mut columns = Columns::new();
        for (name, ty) in [
            ("id", ValueType::Number),
            ("status", ValueType::String),
            ("priority", ValueType::Number),
        ] {
            columns.insert(name.into(), ColumnSchema::optional(ty));
        }
        let issue = host.add_source(MemorySource::new("issue", columns, vec!["id".into()]));
        for (id, status, priority) in [(1, "open", 1), (2, "closed", 3), (3, "open", 2), (4, "new", 5)] {
            issue.push(SourceChange::Add(
                row! { "id" => id, "status" => status, "priority" => priority },
            ));
        }
        host
    }

    fn ids(input: &Rc<dyn Input>) -> Vec<i64> {
        input
            .fetch(FetchRequest::new())
            .map(|n| n.row.get("id").as_f64().unwrap_or(f64::NAN) as i64)
            .collect()
    }

    #[test]
    fn test_where_order_limit() {
        let host = host(EngineConfig::default());
        let query = Query::new("issue")
            .where_clause(Condition::ne("status", "closed"))
            .order_by(vec![rill_core::desc("priority")])
            .limit(2);
        let input = build_pipeline(&query, &host).unwrap();
        assert_eq!(ids(&input), vec![4, 3]);
        assert_eq!(input.kind(), OperatorKind::Take);
    }

    #[test]
    fn test_or_builds_fan_out() {
        let host = host(EngineConfig::default());
        let query = Query::new("issue").where_clause(Condition::or(vec![
            Condition::eq("status", "new"),
            Condition::simple("priority", SimpleOperator::Le, 2),
        ]));
        let input = build_pipeline(&query, &host).unwrap();
        assert_eq!(input.kind(), OperatorKind::FanIn);
        assert_eq!(ids(&input), vec![1, 3, 4]);
    }

    #[test]
    fn test_start_skips_rows() {
        let host = host(EngineConfig::default());
        let query = Query::new("issue").start(row! { "id" => 2 }, true);
        assert_eq!(ids(&build_pipeline(&query, &host).unwrap()), vec![3, 4]);
    }

    #[test]
    fn test_optional_filters_are_pushed_to_source() {
        let (filters, applied_all) = optional_filters(&Condition::and(vec![
            Condition::eq("a", 1),
            Condition::or(vec![Condition::eq("b", 1)]),
            Condition::eq("c", 1),
        ]))
        .unwrap();
        assert_eq!(filters.len(), 2);
        assert!(!applied_all);

        let (filters, applied_all) = optional_filters(&Condition::eq("a", 1)).unwrap();
        assert_eq!(filters.len(), 1);
        assert!(applied_all);

        let (filters, _) = optional_filters(&Condition::or(vec![Condition::eq("a", 1)])).unwrap();
        assert!(filters.is_empty());
    }

    #[test]
    fn test_instrumented_pipeline_is_snitched() {
        let host = host(EngineConfig {
            instrument_operators: true,
            ..EngineConfig::default()
        });
        let query = Query::new("issue").where_clause(Condition::eq("status", "open"));
        let input = build_pipeline(&query, &host).unwrap();
        assert_eq!(input.kind(), OperatorKind::Snitch);
        assert_eq!(ids(&input), vec![1, 3]);
    }

    #[test]
    fn test_errors() {
        let host = host(EngineConfig::default());
        assert!(matches!(
            build_pipeline(&Query::new("user"), &host),
            Err(Error::SourceNotFound { .. })
        ));
        assert!(matches!(
            build_pipeline(&Query::new("issue").where_clause(Condition::eq("nope", 1)), &host),
            Err(Error::ColumnNotFound { .. })
        ));
        assert!(matches!(
            build_pipeline(&Query::new("issue").where_clause(Condition::or(vec![])), &host),
            Err(Error::InvalidQuery { .. })
        ));
        let unaliased = Query::new("issue").related(CorrelatedSubquery::new(
            ["id"],
            ["id"],
            Query::new("issue"),
        ));
        assert!(matches!(
            build_pipeline(&unaliased, &host),
            Err(Error::InvalidQuery { .. })
        ));
        let hidden_leaf = Query::new("issue").related(
            CorrelatedSubquery::new(["id"], ["id"], Query::new("issue").alias("self")).hidden(),
        );
        assert!(matches!(
            build_pipeline(&hidden_leaf, &host),
            Err(Error::InvalidQuery { .. })
        ));
        let mismatched = Query::new("issue").related(CorrelatedSubquery::new(
            ["id", "status"],
            ["id"],
            Query::new("issue").alias("other"),
        ));
        assert!(matches!(
            build_pipeline(&mismatched, &host),
            Err(Error::InvalidQuery { .. })
        ));
    }
}
