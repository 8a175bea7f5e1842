//! Runtime stream configuration produced by the plan builder.

use crate::streamql::sql::execution::aggregation::AggregateType;
use std::collections::HashMap;
use std::time::Duration;

/// Window variant and parameters.
///
/// The variant is fixed at plan-build time; every variant satisfies the same
/// add/start/output/reset contract at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowSpec {
    /// Fixed non-overlapping slots of `size`, aligned to `size` multiples of
    /// the epoch shifted by `offset`.
    Tumbling { size: Duration, offset: Duration },
    /// Overlapping slots of `size` opening every `slide`.
    Sliding {
        size: Duration,
        slide: Duration,
        offset: Duration,
    },
    /// Count-delimited batches of exactly `count` rows.
    Counting { count: usize },
    /// Gap-delimited slots closing after `timeout` of inactivity.
    Session { timeout: Duration },
}

impl WindowSpec {
    /// Short name used in error messages and logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            WindowSpec::Tumbling { .. } => "tumbling",
            WindowSpec::Sliding { .. } => "sliding",
            WindowSpec::Counting { .. } => "counting",
            WindowSpec::Session { .. } => "session",
        }
    }
}

/// Window configuration shared by every variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    pub spec: WindowSpec,
    /// Record field holding the event timestamp; arrival time when unset.
    pub ts_prop: Option<String>,
    /// Unit counting-window slot boundaries are aligned to.
    pub time_unit: Duration,
}

impl WindowConfig {
    pub fn new(spec: WindowSpec) -> Self {
        WindowConfig {
            spec,
            ts_prop: None,
            time_unit: DEFAULT_TIME_UNIT,
        }
    }
}

/// Default boundary-alignment unit when the query carries no TIMEUNIT.
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(60);

/// Complete runtime configuration for one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub window: WindowConfig,
    /// Grouping key fields, in declaration order.
    pub group_fields: Vec<String>,
    /// Select alias → aggregate kind.
    pub select_fields: HashMap<String, AggregateType>,
    /// Source field → select alias, for aliased aggregate projections.
    pub field_alias: HashMap<String, String>,
}

impl StreamConfig {
    pub fn new(window: WindowConfig) -> Self {
        StreamConfig {
            window,
            group_fields: Vec::new(),
            select_fields: HashMap::new(),
            field_alias: HashMap::new(),
        }
    }

    /// Source field an aggregate for `alias` reads from: the `field_alias`
    /// inverse when the projection carried an alias, else the alias itself.
    pub fn source_field<'a>(&'a self, alias: &'a str) -> &'a str {
        self.field_alias
            .iter()
            .find(|(_, a)| a.as_str() == alias)
            .map(|(field, _)| field.as_str())
            .unwrap_or(alias)
    }
}
