//! Per-batch grouping and aggregate materialization.
//!
//! On every window emission the batch is partitioned by the grouping key,
//! one accumulator is created per (group, select field) pair, and one result
//! record per group is produced carrying the grouping fields verbatim plus
//! the aggregate outputs.

use super::functions::AggregateFunction;
use super::{create_aggregator, AggregateType};
use crate::streamql::sql::execution::config::StreamConfig;
use crate::streamql::sql::execution::types::{FieldValue, Record, Row, TimeSlot};
use crate::streamql::utils::time::to_nanos;
use log::debug;
use std::sync::Arc;

/// Separator for concatenated grouping-key values. Control character so
/// ordinary field values cannot collide across positions.
const GROUP_KEY_SEPARATOR: char = '\u{1}';

struct GroupState {
    /// Grouping fields of the first row seen for this group, verbatim.
    key_fields: Vec<(String, FieldValue)>,
    /// One accumulator per numeric select field, keyed by alias order.
    aggregators: Vec<(String, AggregateType, Box<dyn AggregateFunction>)>,
    slot: Option<TimeSlot>,
}

/// The aggregator stage: folds one closed batch into result records.
pub struct GroupAggregator {
    config: Arc<StreamConfig>,
}

impl GroupAggregator {
    pub fn new(config: Arc<StreamConfig>) -> Self {
        GroupAggregator { config }
    }

    /// Partition `batch` by the grouping key and materialize one result
    /// record per group, in group-discovery order.
    ///
    /// Rows are folded in batch order, so arrival order within a group is
    /// preserved. A row missing an aggregated field, or holding a
    /// non-numeric value there, contributes nothing to that accumulator.
    pub fn aggregate(&self, batch: &[Row]) -> Vec<Record> {
        let mut groups: Vec<(String, GroupState)> = Vec::new();

        for row in batch {
            let key = self.group_key(&row.data);
            let state = match groups.iter().position(|(k, _)| *k == key) {
                Some(idx) => &mut groups[idx].1,
                None => {
                    groups.push((key, self.new_group_state(row)));
                    &mut groups.last_mut().expect("just pushed").1
                }
            };

            for (alias, kind, aggregator) in state.aggregators.iter_mut() {
                let field = self.config.source_field(alias);
                match row.data.get(field).and_then(FieldValue::as_f64) {
                    Some(value) => aggregator.add(value),
                    None => {
                        debug!(
                            "record contributes no {} value for field '{}'",
                            kind.suffix(),
                            field
                        );
                    }
                }
            }
        }

        groups
            .into_iter()
            .map(|(_, state)| self.materialize(state))
            .collect()
    }

    fn new_group_state(&self, row: &Row) -> GroupState {
        let key_fields = self
            .config
            .group_fields
            .iter()
            .map(|field| {
                let value = row.data.get(field).cloned().unwrap_or(FieldValue::Null);
                (field.clone(), value)
            })
            .collect();

        let aggregators = self
            .config
            .select_fields
            .iter()
            .filter_map(|(alias, kind)| {
                create_aggregator(*kind).map(|agg| (alias.clone(), *kind, agg))
            })
            .collect();

        GroupState {
            key_fields,
            aggregators,
            slot: row.slot,
        }
    }

    fn materialize(&self, state: GroupState) -> Record {
        let mut result = Record::new();
        for (field, value) in state.key_fields {
            result.insert(field, value);
        }

        for (alias, kind, aggregator) in &state.aggregators {
            let field = self.config.source_field(alias);
            let key = format!("{}_{}", field, kind.suffix());
            let value = match kind {
                AggregateType::Count => FieldValue::Integer(aggregator.result() as i64),
                _ => FieldValue::Float(aggregator.result()),
            };
            result.insert(key, value);
        }

        for (alias, kind) in &self.config.select_fields {
            if !kind.is_synthetic() {
                continue;
            }
            let boundary = state.slot.map(|slot| match kind {
                AggregateType::WindowStart => to_nanos(slot.start),
                _ => to_nanos(slot.end),
            });
            result.insert(alias.clone(), FieldValue::Integer(boundary.unwrap_or(0)));
        }

        result
    }

    fn group_key(&self, record: &Record) -> String {
        let mut key = String::new();
        for (i, field) in self.config.group_fields.iter().enumerate() {
            if i > 0 {
                key.push(GROUP_KEY_SEPARATOR);
            }
            match record.get(field) {
                Some(value) => key.push_str(&value.to_string()),
                None => key.push_str("NULL"),
            }
        }
        key
    }
}
