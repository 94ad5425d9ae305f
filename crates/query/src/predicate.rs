//! Compiles conditions into row predicates.
//!
//! Comparisons involving NULL are false, except `IS` and `IS NOT` which
//! compare NULL as a value. Values of different types never compare.

use crate::ast::{Condition, Operand, SimpleOperator};
use rill_core::pattern_match::{ilike, like};
use rill_core::{compare_values, values_equal, Error, Result, Row, Value};
use rill_incremental::Predicate;
use std::cmp::Ordering;
use std::rc::Rc;

/// Compiles a condition tree into a predicate.
pub fn create_predicate(condition: &Condition) -> Result<Predicate> {
    match condition {
        Condition::Simple { column, op, value } => simple_predicate(column, *op, value),
        Condition::And { conditions } => {
            let parts = conditions
                .iter()
                .map(create_predicate)
                .collect::<Result<Vec<_>>>()?;
            Ok(Rc::new(move |row: &Row| parts.iter().all(|p| p(row))))
        }
        Condition::Or { conditions } => {
            let parts = conditions
                .iter()
                .map(create_predicate)
                .collect::<Result<Vec<_>>>()?;
            Ok(Rc::new(move |row: &Row| parts.iter().any(|p| p(row))))
        }
    }
}

fn simple_predicate(column: &str, op: SimpleOperator, operand: &Operand) -> Result<Predicate> {
    let column = column.to_string();
    match (op.takes_list(), operand) {
        (true, Operand::List(values)) => {
            let values = values.clone();
            let negated = op == SimpleOperator::NotIn;
            Ok(Rc::new(move |row: &Row| {
                let v = row.get(&column);
                if v.is_null() {
                    return false;
                }
                values.iter().any(|candidate| values_equal(v, candidate)) != negated
            }))
        }
        (false, Operand::List(_)) => Err(Error::invalid_query(format!(
            "operator {} on column {} does not take a list",
            op, column
        ))),
        (true, Operand::Value(_)) => Err(Error::invalid_query(format!(
            "operator {} on column {} takes a list",
            op, column
        ))),
        (false, Operand::Value(operand)) => {
            let operand = operand.clone();
            Ok(Rc::new(move |row: &Row| {
                compare_simple(row.get(&column), op, &operand)
            }))
        }
    }
}

/// Evaluates `value op operand` for scalar operators.
fn compare_simple(value: &Value, op: SimpleOperator, operand: &Value) -> bool {
    match op {
        SimpleOperator::Is => is_same(value, operand),
        SimpleOperator::IsNot => !is_same(value, operand),
        _ if value.is_null() || operand.is_null() => false,
        SimpleOperator::Eq => values_equal(value, operand),
        SimpleOperator::Ne => !values_equal(value, operand),
        SimpleOperator::Lt => ordering(value, operand) == Some(Ordering::Less),
        SimpleOperator::Gt => ordering(value, operand) == Some(Ordering::Greater),
        SimpleOperator::Le => matches!(
            ordering(value, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        SimpleOperator::Ge => matches!(
            ordering(value, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        SimpleOperator::Like => text_match(value, operand, like),
        SimpleOperator::NotLike => text_match(value, operand, |v, p| !like(v, p)),
        SimpleOperator::ILike => text_match(value, operand, ilike),
        SimpleOperator::NotILike => text_match(value, operand, |v, p| !ilike(v, p)),
        SimpleOperator::In | SimpleOperator::NotIn => false,
    }
}

/// `IS` equality: NULL is NULL, otherwise plain equality.
fn is_same(value: &Value, operand: &Value) -> bool {
    match (value.is_null(), operand.is_null()) {
        (true, true) => true,
        (false, false) => values_equal(value, operand),
        _ => false,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    if a.value_type() != b.value_type() {
        return None;
    }
    Some(compare_values(a, b))
}

fn text_match(value: &Value, pattern: &Value, matcher: impl Fn(&str, &str) -> bool) -> bool {
    match (value.as_str(), pattern.as_str()) {
        (Some(v), Some(p)) => matcher(v, p),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::row;

    fn check(condition: Condition, row: &Row) -> bool {
        create_predicate(&condition).unwrap()(row)
    }

    #[test]
    fn test_comparisons() {
        let r = row! { "n" => 5, "s" => "abc" };
        assert!(check(Condition::eq("n", 5), &r));
        assert!(check(Condition::ne("n", 4), &r));
        assert!(check(Condition::lt("n", 6), &r));
        assert!(!check(Condition::gt("n", 5), &r));
        assert!(check(Condition::simple("n", SimpleOperator::Ge, 5), &r));
        assert!(check(Condition::simple("s", SimpleOperator::Le, "abd"), &r));
        // Different types never compare.
        assert!(!check(Condition::lt("n", "z"), &r));
    }

    #[test]
    fn test_null_operands_are_false() {
        let r = row! { "n" => Value::Null };
        for op in [
            SimpleOperator::Eq,
            SimpleOperator::Ne,
            SimpleOperator::Lt,
            SimpleOperator::Ge,
            SimpleOperator::Like,
            SimpleOperator::NotLike,
        ] {
            assert!(!check(Condition::simple("n", op, Value::Null), &r), "{}", op);
            assert!(!check(Condition::simple("n", op, "x"), &r), "{}", op);
            assert!(!check(Condition::simple("missing", op, 1), &r), "{}", op);
        }
        assert!(!check(Condition::in_list("n", vec![Value::Null]), &r));
        assert!(!check(
            Condition::simple("n", SimpleOperator::NotIn, Operand::List(vec![Value::from(1)])),
            &r
        ));
    }

    #[test]
    fn test_is_and_is_not() {
        let null = row! { "n" => Value::Null };
        let one = row! { "n" => 1 };
        let is_null = Condition::simple("n", SimpleOperator::Is, Value::Null);
        let is_not_null = Condition::simple("n", SimpleOperator::IsNot, Value::Null);
        assert!(check(is_null.clone(), &null));
        assert!(!check(is_null, &one));
        assert!(check(is_not_null.clone(), &one));
        assert!(!check(is_not_null, &null));
        assert!(check(Condition::simple("n", SimpleOperator::Is, 1), &one));
    }

    #[test]
    fn test_in_lists() {
        let r = row! { "status" => "open" };
        let list = vec![Value::from("open"), Value::from("new")];
        assert!(check(Condition::in_list("status", list.clone()), &r));
        assert!(!check(
            Condition::simple("status", SimpleOperator::NotIn, Operand::List(list)),
            &r
        ));
    }

    #[test]
    fn test_like_family() {
        let r = row! { "title" => "Fix Bug" };
        assert!(check(Condition::simple("title", SimpleOperator::Like, "Fix%"), &r));
        assert!(!check(Condition::simple("title", SimpleOperator::Like, "fix%"), &r));
        assert!(check(Condition::simple("title", SimpleOperator::ILike, "fix%"), &r));
        assert!(check(Condition::simple("title", SimpleOperator::NotLike, "%z%"), &r));
        assert!(!check(Condition::simple("title", SimpleOperator::NotILike, "%BUG"), &r));
        assert!(!check(Condition::simple("title", SimpleOperator::Like, 1), &r));
    }

    #[test]
    fn test_and_or() {
        let r = row! { "a" => 1, "b" => 2 };
        assert!(check(
            Condition::and(vec![Condition::eq("a", 1), Condition::eq("b", 2)]),
            &r
        ));
        assert!(!check(
            Condition::and(vec![Condition::eq("a", 1), Condition::eq("b", 3)]),
            &r
        ));
        assert!(check(
            Condition::or(vec![Condition::eq("a", 0), Condition::eq("b", 2)]),
            &r
        ));
        assert!(check(Condition::and(vec![]), &r));
        assert!(!check(Condition::or(vec![]), &r));
    }

    #[test]
    fn test_operand_shape_errors() {
        let list_for_scalar = Condition::simple("a", SimpleOperator::Eq, Operand::List(vec![]));
        assert!(matches!(create_predicate(&list_for_scalar), Err(Error::InvalidQuery { .. })));
        let scalar_for_in = Condition::simple("a", SimpleOperator::In, 1);
        assert!(matches!(create_predicate(&scalar_for_in), Err(Error::InvalidQuery { .. })));
    }
}
