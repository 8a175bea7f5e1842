//! Pluggable expression engine boundary.
//!
//! The pipeline consumes expressions (WHERE predicates, projection
//! classification) through the [`ExpressionEngine`] trait so the compiler
//! backing them can be swapped without touching the runtime. The crate ships
//! [`DefaultExpressionEngine`], a precedence-climbing parser and tree-walking
//! evaluator covering the query language's predicate grammar.

pub mod evaluator;
pub mod parser;

use crate::streamql::sql::error::{SqlError, SqlResult};
use crate::streamql::sql::execution::types::{FieldValue, Record};

pub use parser::{parse_expression, BinaryOperator, Expr, LiteralValue, UnaryOperator};

/// A compiled expression, ready to evaluate against records.
pub trait CompiledExpression: Send + Sync {
    /// Evaluate against a record.
    fn eval(&self, record: &Record) -> SqlResult<FieldValue>;

    /// Evaluate as a predicate. Non-boolean results are type errors.
    fn eval_bool(&self, record: &Record) -> SqlResult<bool> {
        match self.eval(record)? {
            FieldValue::Boolean(b) => Ok(b),
            other => Err(SqlError::type_error(
                "boolean",
                other.type_name(),
                Some(other.to_string()),
            )),
        }
    }

    /// The source text this expression was compiled from.
    fn text(&self) -> &str;
}

/// Expression compiler the pipeline is parameterized over.
pub trait ExpressionEngine: Send + Sync {
    fn compile(&self, text: &str) -> SqlResult<Box<dyn CompiledExpression>>;
}

/// Built-in engine: parses the predicate grammar (comparisons, `&&`/`||`,
/// arithmetic, parentheses, literals) and evaluates it directly.
#[derive(Debug, Default)]
pub struct DefaultExpressionEngine;

impl DefaultExpressionEngine {
    pub fn new() -> Self {
        DefaultExpressionEngine
    }
}

impl ExpressionEngine for DefaultExpressionEngine {
    fn compile(&self, text: &str) -> SqlResult<Box<dyn CompiledExpression>> {
        let expr = parse_expression(text)?;
        Ok(Box::new(DefaultCompiled {
            text: text.to_string(),
            expr,
        }))
    }
}

struct DefaultCompiled {
    text: String,
    expr: Expr,
}

impl CompiledExpression for DefaultCompiled {
    fn eval(&self, record: &Record) -> SqlResult<FieldValue> {
        evaluator::eval(&self.expr, record)
    }

    fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, FieldValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_compile_and_eval_predicate() {
        let engine = DefaultExpressionEngine::new();
        let compiled = engine
            .compile("device == 'aa' && age > 10")
            .expect("predicate should compile");

        let hit = record(&[
            ("device", FieldValue::String("aa".into())),
            ("age", FieldValue::Float(15.0)),
        ]);
        let miss = record(&[
            ("device", FieldValue::String("bb".into())),
            ("age", FieldValue::Float(15.0)),
        ]);
        assert!(compiled.eval_bool(&hit).unwrap());
        assert!(!compiled.eval_bool(&miss).unwrap());
    }

    #[test]
    fn test_eval_bool_rejects_non_boolean() {
        let engine = DefaultExpressionEngine::new();
        let compiled = engine.compile("age + 1").unwrap();
        let rec = record(&[("age", FieldValue::Integer(2))]);
        assert!(compiled.eval_bool(&rec).is_err());
    }

    #[test]
    fn test_compile_rejects_garbage() {
        let engine = DefaultExpressionEngine::new();
        assert!(engine.compile("a >").is_err());
        assert!(engine.compile("(a").is_err());
    }
}
