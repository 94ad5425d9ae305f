//! Query plan AST.
//!
//! A `Query` names a table, an optional condition tree, an ordering, an
//! optional start row and limit, and the related subqueries whose rows are
//! nested under each result row.

use rill_core::{asc, OrderPart, Row, SortOrder, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operators of a simple condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimpleOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "NOT LIKE")]
    NotLike,
    #[serde(rename = "ILIKE")]
    ILike,
    #[serde(rename = "NOT ILIKE")]
    NotILike,
    #[serde(rename = "IS")]
    Is,
    #[serde(rename = "IS NOT")]
    IsNot,
}

impl SimpleOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimpleOperator::Eq => "=",
            SimpleOperator::Ne => "!=",
            SimpleOperator::Lt => "<",
            SimpleOperator::Gt => ">",
            SimpleOperator::Le => "<=",
            SimpleOperator::Ge => ">=",
            SimpleOperator::In => "IN",
            SimpleOperator::NotIn => "NOT IN",
            SimpleOperator::Like => "LIKE",
            SimpleOperator::NotLike => "NOT LIKE",
            SimpleOperator::ILike => "ILIKE",
            SimpleOperator::NotILike => "NOT ILIKE",
            SimpleOperator::Is => "IS",
            SimpleOperator::IsNot => "IS NOT",
        }
    }

    /// True for operators taking a list operand.
    pub fn takes_list(&self) -> bool {
        matches!(self, SimpleOperator::In | SimpleOperator::NotIn)
    }
}

impl fmt::Display for SimpleOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a simple condition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Value(Value),
    List(Vec<Value>),
}

impl<T: Into<Value>> From<T> for Operand {
    fn from(value: T) -> Self {
        Operand::Value(value.into())
    }
}

/// A filter condition tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Condition {
    Simple {
        column: String,
        op: SimpleOperator,
        value: Operand,
    },
    And {
        conditions: Vec<Condition>,
    },
    Or {
        conditions: Vec<Condition>,
    },
}

impl Condition {
    pub fn simple(column: impl Into<String>, op: SimpleOperator, value: impl Into<Operand>) -> Self {
        Condition::Simple {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::simple(column, SimpleOperator::Eq, Operand::Value(value.into()))
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::simple(column, SimpleOperator::Ne, Operand::Value(value.into()))
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::simple(column, SimpleOperator::Lt, Operand::Value(value.into()))
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::simple(column, SimpleOperator::Gt, Operand::Value(value.into()))
    }

    pub fn in_list(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self::simple(column, SimpleOperator::In, Operand::List(values))
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::And { conditions }
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Or { conditions }
    }

    /// Columns referenced anywhere in the tree.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Condition::Simple { column, .. } => vec![column.as_str()],
            Condition::And { conditions } | Condition::Or { conditions } => {
                conditions.iter().flat_map(Condition::columns).collect()
            }
        }
    }
}

/// Columns linking a subquery's rows to their parent row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub parent_field: Vec<String>,
    pub child_field: Vec<String>,
}

/// A related subquery nested under each parent row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedSubquery {
    pub correlation: Correlation,
    pub subquery: Box<Query>,
    /// Hide the subquery's own rows and splice their relationships into the
    /// parent (junction tables).
    #[serde(default)]
    pub hidden: bool,
}

impl CorrelatedSubquery {
    pub fn new(
        parent_field: impl IntoIterator<Item = impl Into<String>>,
        child_field: impl IntoIterator<Item = impl Into<String>>,
        subquery: Query,
    ) -> Self {
        Self {
            correlation: Correlation {
                parent_field: parent_field.into_iter().map(Into::into).collect(),
                child_field: child_field.into_iter().map(Into::into).collect(),
            },
            subquery: Box::new(subquery),
            hidden: false,
        }
    }

    /// Marks the subquery as hidden.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// Row a query resumes from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryStart {
    pub row: Row,
    #[serde(default)]
    pub exclusive: bool,
}

/// A query plan.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<CorrelatedSubquery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<QueryStart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, rename = "orderBy", skip_serializing_if = "Option::is_none")]
    pub order_by: Option<SortOrder>,
}

impl Query {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Adds a condition, and-ing it with any existing one.
    pub fn where_clause(mut self, condition: Condition) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            None => condition,
            Some(Condition::And { mut conditions }) => {
                conditions.push(condition);
                Condition::And { conditions }
            }
            Some(existing) => Condition::And {
                conditions: vec![existing, condition],
            },
        });
        self
    }

    pub fn order_by(mut self, order: Vec<OrderPart>) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start(mut self, row: Row, exclusive: bool) -> Self {
        self.start = Some(QueryStart { row, exclusive });
        self
    }

    pub fn related(mut self, subquery: CorrelatedSubquery) -> Self {
        self.related.push(subquery);
        self
    }

    /// The ordering with the missing primary key columns appended ascending.
    pub fn completed_order(&self, primary_key: &[String]) -> SortOrder {
        let mut order = self.order_by.clone().unwrap_or_default();
        for column in primary_key {
            if !order.iter().any(|part| &part.column == column) {
                order.push(asc(column.as_str()));
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::desc;
    use serde_json::json;

    #[test]
    fn test_where_clause_ands_conditions() {
        let q = Query::new("issue")
            .where_clause(Condition::eq("open", true))
            .where_clause(Condition::gt("priority", 2))
            .where_clause(Condition::ne("owner", "bob"));
        match q.where_clause {
            Some(Condition::And { conditions }) => assert_eq!(conditions.len(), 3),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_completed_order_appends_missing_pk() {
        let q = Query::new("t").order_by(vec![desc("created"), asc("b")]);
        let order = q.completed_order(&["a".to_string(), "b".to_string()]);
        assert_eq!(order, vec![desc("created"), asc("b"), asc("a")]);
        assert_eq!(Query::new("t").completed_order(&["id".to_string()]), vec![asc("id")]);
    }

    #[test]
    fn test_query_from_json() {
        let q: Query = serde_json::from_value(json!({
            "table": "issue",
            "where": {
                "type": "or",
                "conditions": [
                    {"type": "simple", "column": "status", "op": "IN", "value": ["open", "new"]},
                    {"type": "simple", "column": "owner", "op": "IS", "value": null}
                ]
            },
            "orderBy": [{"column": "id", "direction": "desc"}],
            "limit": 10
        }))
        .unwrap();
        assert_eq!(q.limit, Some(10));
        assert_eq!(q.order_by, Some(vec![desc("id")]));
        assert_eq!(
            q.where_clause,
            Some(Condition::or(vec![
                Condition::in_list("status", vec![Value::from("open"), Value::from("new")]),
                Condition::simple("owner", SimpleOperator::Is, Value::Null),
            ]))
        );
    }
}
