//! Predicate filter stage.
//!
//! The condition text is compiled once; the compiled predicate is then
//! applied per record. Evaluation failures drop the record and are never
//! surfaced upstream.

use crate::streamql::sql::error::SqlResult;
use crate::streamql::sql::execution::expression::{CompiledExpression, ExpressionEngine};
use crate::streamql::sql::execution::types::Record;
use log::debug;

pub struct Filter {
    predicate: Option<Box<dyn CompiledExpression>>,
}

impl Filter {
    /// A filter that accepts every record.
    pub fn pass_through() -> Filter {
        Filter { predicate: None }
    }

    /// Compile `condition` with `engine`. An empty condition yields the
    /// pass-through filter.
    pub fn compile(engine: &dyn ExpressionEngine, condition: &str) -> SqlResult<Filter> {
        let condition = condition.trim();
        if condition.is_empty() {
            return Ok(Filter::pass_through());
        }
        Ok(Filter {
            predicate: Some(engine.compile(condition)?),
        })
    }

    /// Whether `record` passes the predicate. A predicate that fails to
    /// evaluate counts as false.
    pub fn matches(&self, record: &Record) -> bool {
        let predicate = match &self.predicate {
            Some(predicate) => predicate,
            None => return true,
        };
        match predicate.eval_bool(record) {
            Ok(pass) => pass,
            Err(err) => {
                debug!(
                    "record dropped, predicate '{}' failed to evaluate: {}",
                    predicate.text(),
                    err
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamql::sql::execution::expression::DefaultExpressionEngine;
    use crate::streamql::sql::execution::types::FieldValue;

    fn record(device: &str, age: f64) -> Record {
        let mut data = Record::new();
        data.insert("device".to_string(), FieldValue::String(device.into()));
        data.insert("age".to_string(), FieldValue::Float(age));
        data
    }

    #[test]
    fn test_pass_through_accepts_everything() {
        let filter = Filter::compile(&DefaultExpressionEngine::new(), "  ").unwrap();
        assert!(filter.matches(&record("aa", 1.0)));
    }

    #[test]
    fn test_predicate_filters_records() {
        let filter =
            Filter::compile(&DefaultExpressionEngine::new(), "device == 'aa' && age > 10").unwrap();
        assert!(filter.matches(&record("aa", 15.0)));
        assert!(!filter.matches(&record("aa", 5.0)));
        assert!(!filter.matches(&record("bb", 15.0)));
    }

    #[test]
    fn test_eval_failure_drops_record() {
        // comparing a string field against a number fails, which must read
        // as "does not match" rather than an error
        let filter = Filter::compile(&DefaultExpressionEngine::new(), "device > 10").unwrap();
        assert!(!filter.matches(&record("aa", 15.0)));
    }

    #[test]
    fn test_filter_idempotence() {
        let filter =
            Filter::compile(&DefaultExpressionEngine::new(), "age > 10").unwrap();
        let rec = record("aa", 15.0);
        assert_eq!(filter.matches(&rec), filter.matches(&rec));
    }
}
