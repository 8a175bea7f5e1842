//! Tree-walking evaluation of compiled expressions against records.

use super::parser::{BinaryOperator, Expr, LiteralValue, UnaryOperator};
use crate::streamql::sql::error::{SqlError, SqlResult};
use crate::streamql::sql::execution::types::{FieldValue, Record};

/// Evaluate `expr` against `record`.
///
/// A missing field evaluates to `Null`. Calls are classification-only and
/// fail here.
pub fn eval(expr: &Expr, record: &Record) -> SqlResult<FieldValue> {
    match expr {
        Expr::Column(name) => Ok(record.get(name).cloned().unwrap_or(FieldValue::Null)),
        Expr::Literal(lit) => Ok(literal_value(lit)),
        Expr::UnaryOp { op, operand } => {
            let value = eval(operand, record)?;
            apply_unary(*op, value)
        }
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And => {
                // short-circuit
                if !eval_bool_operand(left, record)? {
                    return Ok(FieldValue::Boolean(false));
                }
                Ok(FieldValue::Boolean(eval_bool_operand(right, record)?))
            }
            BinaryOperator::Or => {
                if eval_bool_operand(left, record)? {
                    return Ok(FieldValue::Boolean(true));
                }
                Ok(FieldValue::Boolean(eval_bool_operand(right, record)?))
            }
            _ => {
                let lhs = eval(left, record)?;
                let rhs = eval(right, record)?;
                apply_binary(*op, lhs, rhs)
            }
        },
        Expr::Function { name, .. } => Err(SqlError::eval_error(
            format!("function '{}' cannot be evaluated in a predicate", name),
            None,
        )),
    }
}

fn literal_value(lit: &LiteralValue) -> FieldValue {
    match lit {
        LiteralValue::Integer(v) => FieldValue::Integer(*v),
        LiteralValue::Float(v) => FieldValue::Float(*v),
        LiteralValue::String(s) => FieldValue::String(s.clone()),
        LiteralValue::Boolean(b) => FieldValue::Boolean(*b),
    }
}

fn eval_bool_operand(expr: &Expr, record: &Record) -> SqlResult<bool> {
    match eval(expr, record)? {
        FieldValue::Boolean(b) => Ok(b),
        other => Err(SqlError::type_error(
            "boolean",
            other.type_name(),
            Some(other.to_string()),
        )),
    }
}

fn apply_unary(op: UnaryOperator, value: FieldValue) -> SqlResult<FieldValue> {
    match op {
        UnaryOperator::Minus => match value {
            FieldValue::Integer(i) => Ok(FieldValue::Integer(-i)),
            FieldValue::Float(v) => Ok(FieldValue::Float(-v)),
            other => Err(SqlError::type_error(
                "numeric",
                other.type_name(),
                Some(other.to_string()),
            )),
        },
    }
}

fn apply_binary(op: BinaryOperator, lhs: FieldValue, rhs: FieldValue) -> SqlResult<FieldValue> {
    match op {
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide => apply_arithmetic(op, lhs, rhs),
        BinaryOperator::Equal => Ok(FieldValue::Boolean(values_equal(&lhs, &rhs))),
        BinaryOperator::NotEqual => {
            if matches!(lhs, FieldValue::Null) || matches!(rhs, FieldValue::Null) {
                return Ok(FieldValue::Boolean(false));
            }
            Ok(FieldValue::Boolean(!values_equal(&lhs, &rhs)))
        }
        BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => apply_ordering(op, lhs, rhs),
        BinaryOperator::And | BinaryOperator::Or => unreachable!("handled with short-circuit"),
    }
}

fn apply_arithmetic(op: BinaryOperator, lhs: FieldValue, rhs: FieldValue) -> SqlResult<FieldValue> {
    use FieldValue::{Float, Integer};

    match (lhs, rhs) {
        (Integer(a), Integer(b)) => match op {
            BinaryOperator::Add => Ok(Integer(a.wrapping_add(b))),
            BinaryOperator::Subtract => Ok(Integer(a.wrapping_sub(b))),
            BinaryOperator::Multiply => Ok(Integer(a.wrapping_mul(b))),
            BinaryOperator::Divide => {
                if b == 0 {
                    Err(SqlError::eval_error("division by zero", None))
                } else {
                    Ok(Float(a as f64 / b as f64))
                }
            }
            _ => unreachable!(),
        },
        (lhs, rhs) => {
            let a = lhs.as_f64().ok_or_else(|| {
                SqlError::type_error("numeric", lhs.type_name(), Some(lhs.to_string()))
            })?;
            let b = rhs.as_f64().ok_or_else(|| {
                SqlError::type_error("numeric", rhs.type_name(), Some(rhs.to_string()))
            })?;
            match op {
                BinaryOperator::Add => Ok(Float(a + b)),
                BinaryOperator::Subtract => Ok(Float(a - b)),
                BinaryOperator::Multiply => Ok(Float(a * b)),
                BinaryOperator::Divide => {
                    if b == 0.0 {
                        Err(SqlError::eval_error("division by zero", None))
                    } else {
                        Ok(Float(a / b))
                    }
                }
                _ => unreachable!(),
            }
        }
    }
}

fn values_equal(lhs: &FieldValue, rhs: &FieldValue) -> bool {
    match (lhs, rhs) {
        (FieldValue::Null, FieldValue::Null) => true,
        (FieldValue::Null, _) | (_, FieldValue::Null) => false,
        (FieldValue::String(a), FieldValue::String(b)) => a == b,
        (FieldValue::Boolean(a), FieldValue::Boolean(b)) => a == b,
        (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a == b,
        (lhs, rhs) => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn apply_ordering(op: BinaryOperator, lhs: FieldValue, rhs: FieldValue) -> SqlResult<FieldValue> {
    let ordering = match (&lhs, &rhs) {
        (FieldValue::String(a), FieldValue::String(b)) => a.partial_cmp(b),
        (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a.partial_cmp(b),
        (lhs, rhs) => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(SqlError::type_error(
                    lhs.type_name(),
                    rhs.type_name(),
                    Some(format!("{} vs {}", lhs, rhs)),
                ));
            }
        },
    };

    let ordering = match ordering {
        Some(ord) => ord,
        None => return Ok(FieldValue::Boolean(false)),
    };

    let result = match op {
        BinaryOperator::LessThan => ordering.is_lt(),
        BinaryOperator::LessThanOrEqual => ordering.is_le(),
        BinaryOperator::GreaterThan => ordering.is_gt(),
        BinaryOperator::GreaterThanOrEqual => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(FieldValue::Boolean(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamql::sql::execution::expression::parse_expression;

    fn record(pairs: &[(&str, FieldValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn eval_text(text: &str, rec: &Record) -> SqlResult<FieldValue> {
        eval(&parse_expression(text).unwrap(), rec)
    }

    #[test]
    fn test_numeric_coercion() {
        let rec = record(&[
            ("a", FieldValue::Integer(3)),
            ("b", FieldValue::Float(1.5)),
        ]);
        assert_eq!(eval_text("a + b", &rec).unwrap(), FieldValue::Float(4.5));
        assert_eq!(eval_text("a * 2", &rec).unwrap(), FieldValue::Integer(6));
        assert_eq!(eval_text("a / 2", &rec).unwrap(), FieldValue::Float(1.5));
    }

    #[test]
    fn test_missing_field_is_null() {
        let rec = record(&[]);
        assert_eq!(
            eval_text("device == 'aa'", &rec).unwrap(),
            FieldValue::Boolean(false)
        );
        assert_eq!(
            eval_text("device != 'aa'", &rec).unwrap(),
            FieldValue::Boolean(false)
        );
    }

    #[test]
    fn test_comparison_across_int_and_float() {
        let rec = record(&[("age", FieldValue::Float(15.0))]);
        assert_eq!(
            eval_text("age > 10", &rec).unwrap(),
            FieldValue::Boolean(true)
        );
        assert_eq!(
            eval_text("age <= 14", &rec).unwrap(),
            FieldValue::Boolean(false)
        );
    }

    #[test]
    fn test_ordering_type_mismatch_errors() {
        let rec = record(&[("device", FieldValue::String("aa".into()))]);
        assert!(eval_text("device > 10", &rec).is_err());
    }

    #[test]
    fn test_short_circuit_and() {
        // right side would be a type error, but the left side already failed
        let rec = record(&[("flag", FieldValue::Boolean(false))]);
        assert_eq!(
            eval_text("flag && device", &rec).unwrap(),
            FieldValue::Boolean(false)
        );
    }
}
