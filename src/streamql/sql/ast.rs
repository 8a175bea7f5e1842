//! Query AST and the plan builder.
//!
//! The parser produces a [`SelectStatement`]; [`SelectStatement::to_stream_config`]
//! turns it into the runtime configuration the orchestrator is built from.

use crate::streamql::sql::error::{SqlError, SqlResult};
use crate::streamql::sql::execution::aggregation::AggregateType;
use crate::streamql::sql::execution::config::{
    StreamConfig, WindowConfig, WindowSpec, DEFAULT_TIME_UNIT,
};
use crate::streamql::sql::execution::expression::{self, Expr};
use crate::streamql::utils::string::{split_args, strip_quotes};
use std::time::Duration;

/// One projection item: expression text plus optional alias.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Field {
    pub expression: String,
    pub alias: Option<String>,
}

/// Window call literals as they appear in the query.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowParam {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

/// Window clause as parsed, before plan building gives it a type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowDefinition {
    /// Window keyword as written, e.g. `TumblingWindow`.
    pub window_type: Option<String>,
    /// Positional call parameters.
    pub params: Vec<WindowParam>,
    /// TIMESTAMP property from the WITH clause.
    pub ts_prop: Option<String>,
    /// TIMEUNIT property from the WITH clause.
    pub time_unit: Option<Duration>,
}

/// Projection expression classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprKind {
    /// Bare field reference
    Field,
    /// Binary expression, e.g. `temperature/10`
    Expr,
    /// Call expression, e.g. `avg(temperature)`
    Func,
    /// Window call, e.g. `TumblingWindow('10s')`
    Win,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// `OVER (PARTITION BY ... ORDER BY ...)` metadata. Surfaced, never
/// evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct OverClause {
    /// The clause text as written.
    pub raw: String,
    pub partition_by: Vec<String>,
    pub order_by: Vec<(String, SortDirection)>,
}

/// Metadata for one projection item.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprMeta {
    /// Original expression text, e.g. `avg(price)`.
    pub expression: String,
    /// Canonical name: the expression with any trailing OVER clause
    /// stripped.
    pub name: String,
    pub alias: Option<String>,
    pub kind: ExprKind,
    /// Call arguments, quotes stripped, parenthesis nesting respected.
    pub args: Vec<String>,
    pub sort: SortDirection,
    pub over_clause: Option<OverClause>,
}

impl ExprMeta {
    /// Build the metadata for a projection item: classify the expression,
    /// strip a trailing OVER clause, and extract call arguments.
    pub fn from_projection(expression: &str, alias: Option<String>) -> ExprMeta {
        let mut meta = ExprMeta {
            expression: expression.to_string(),
            name: expression.to_string(),
            alias,
            kind: classify_expression(expression),
            args: Vec::new(),
            sort: SortDirection::default(),
            over_clause: None,
        };
        meta.parse_args();
        meta
    }

    /// For call expressions, split off the OVER clause and extract the
    /// argument list from between the outermost parentheses.
    pub fn parse_args(&mut self) {
        if self.kind != ExprKind::Func {
            return;
        }

        let (head, over) = split_over(&self.expression);
        self.name = head.to_string();
        self.over_clause = over.map(parse_over_clause);

        let first = match self.name.find('(') {
            Some(i) => i,
            None => return,
        };
        let last = match self.name.rfind(')') {
            Some(i) if i > first => i,
            _ => return,
        };
        self.args = split_args(self.name[first + 1..last].trim());
    }
}

/// Classify a projection expression.
///
/// The trailing OVER clause never affects classification. A bare
/// identifier is a field; a call is a window call when its callee is one
/// of the window constructors and a function otherwise; a binary
/// expression is an expression; anything unparseable falls back to field.
pub fn classify_expression(text: &str) -> ExprKind {
    const WINDOW_CALLEES: [&str; 3] = ["TumblingWindow", "SlidingWindow", "SessionWindow"];

    let (head, _) = split_over(text);
    match expression::parse_expression(head) {
        Ok(Expr::Column(_)) => ExprKind::Field,
        Ok(Expr::Function { name, .. }) => {
            if WINDOW_CALLEES.contains(&name.as_str()) {
                ExprKind::Win
            } else {
                ExprKind::Func
            }
        }
        Ok(Expr::BinaryOp { .. }) => ExprKind::Expr,
        _ => ExprKind::Field,
    }
}

/// Split `expr` into the text before a trailing `OVER (...)` and the
/// clause itself. The match is case-insensitive and requires a call-shaped
/// clause so identifiers containing "over" survive.
fn split_over(expr: &str) -> (&str, Option<&str>) {
    let upper = expr.to_ascii_uppercase();
    let bytes = upper.as_bytes();
    let mut search = 0;

    while let Some(found) = upper[search..].find("OVER") {
        let at = search + found;
        let end = at + 4;
        let preceded_ok = at == 0
            || !(bytes[at - 1].is_ascii_alphanumeric() || bytes[at - 1] == b'_');
        let followed_ok = upper[end..].trim_start().starts_with('(');
        if preceded_ok && followed_ok {
            return (expr[..at].trim_end(), Some(expr[at..].trim()));
        }
        search = end;
    }
    (expr, None)
}

/// Light structural split of an OVER clause into PARTITION BY and ORDER BY
/// expression lists.
fn parse_over_clause(raw: &str) -> OverClause {
    let mut clause = OverClause {
        raw: raw.to_string(),
        partition_by: Vec::new(),
        order_by: Vec::new(),
    };

    let inner = match (raw.find('('), raw.rfind(')')) {
        (Some(open), Some(close)) if close > open => &raw[open + 1..close],
        _ => return clause,
    };
    let upper = inner.to_ascii_uppercase();

    let partition_at = upper.find("PARTITION BY");
    let order_at = upper.find("ORDER BY");

    if let Some(start) = partition_at {
        let body_start = start + "PARTITION BY".len();
        let body_end = order_at.filter(|&o| o > start).unwrap_or(inner.len());
        clause.partition_by = split_args(inner[body_start..body_end].trim());
    }
    if let Some(start) = order_at {
        let body = inner[start + "ORDER BY".len()..].trim();
        clause.order_by = split_args(body)
            .into_iter()
            .map(|item| {
                let upper_item = item.to_ascii_uppercase();
                if let Some(stripped) = upper_item.strip_suffix(" DESC") {
                    (item[..stripped.len()].trim().to_string(), SortDirection::Desc)
                } else if let Some(stripped) = upper_item.strip_suffix(" ASC") {
                    (item[..stripped.len()].trim().to_string(), SortDirection::Asc)
                } else {
                    (item, SortDirection::Asc)
                }
            })
            .collect();
    }
    clause
}

/// Clause metadata surfaced alongside the plain field list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamContext {
    pub projection: Vec<ExprMeta>,
    pub group_by: Vec<ExprMeta>,
    pub order_by: Vec<ExprMeta>,
    pub having: Vec<ExprMeta>,
    pub window: Option<ExprMeta>,
    pub with: Option<ExprMeta>,
}

/// A parsed SELECT statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    pub fields: Vec<Field>,
    pub source: String,
    /// WHERE predicate translated to expression-engine syntax.
    pub condition: String,
    pub window: WindowDefinition,
    pub group_by: Vec<String>,
    pub context: StreamContext,
}

impl SelectStatement {
    /// Build the runtime configuration and the filter condition.
    pub fn to_stream_config(&self) -> SqlResult<(StreamConfig, String)> {
        if self.source.is_empty() {
            return Err(SqlError::config_error("missing FROM clause", None));
        }

        let spec = self.build_window_spec()?;
        let mut window = WindowConfig::new(spec);
        window.ts_prop = self.window.ts_prop.clone();
        window.time_unit = self.window.time_unit.unwrap_or(DEFAULT_TIME_UNIT);

        let mut config = StreamConfig::new(window);
        config.group_fields = self
            .group_by
            .iter()
            .filter(|field| !field.contains('('))
            .cloned()
            .collect();

        for field in &self.fields {
            let alias = match &field.alias {
                Some(alias) if !alias.is_empty() => alias.clone(),
                _ => continue,
            };
            let kind = match AggregateType::from_expression(&field.expression) {
                Some(kind) => kind,
                None => continue,
            };
            if !kind.is_synthetic() {
                if let Some(source) = aggregate_source_field(&field.expression) {
                    if source != alias {
                        config.field_alias.insert(source, alias.clone());
                    }
                }
            }
            config.select_fields.insert(alias, kind);
        }

        Ok((config, self.condition.clone()))
    }

    fn build_window_spec(&self) -> SqlResult<WindowSpec> {
        let window_type = match &self.window.window_type {
            Some(name) => name.to_ascii_uppercase(),
            None => {
                return Err(SqlError::config_error(
                    "query declares no window",
                    Some("window".to_string()),
                ));
            }
        };

        match window_type.as_str() {
            "TUMBLINGWINDOW" => Ok(WindowSpec::Tumbling {
                size: self.duration_param(0, "size")?,
                offset: self.optional_duration_param(2)?.unwrap_or(Duration::ZERO),
            }),
            "SLIDINGWINDOW" => Ok(WindowSpec::Sliding {
                size: self.duration_param(0, "size")?,
                slide: self.duration_param(1, "slide")?,
                offset: self.optional_duration_param(2)?.unwrap_or(Duration::ZERO),
            }),
            "SESSIONWINDOW" => Ok(WindowSpec::Session {
                timeout: self.duration_param(0, "timeout")?,
            }),
            "COUNTINGWINDOW" => {
                let count = match self.window.params.first() {
                    Some(WindowParam::Int(n)) if *n > 0 => *n as usize,
                    Some(WindowParam::Int(_)) => {
                        return Err(SqlError::config_error(
                            "threshold must be a positive integer",
                            Some("count".to_string()),
                        ));
                    }
                    Some(other) => {
                        return Err(SqlError::config_error(
                            format!("count must be an integer, got {:?}", other),
                            Some("count".to_string()),
                        ));
                    }
                    None => {
                        return Err(SqlError::config_error(
                            "counting window requires a count parameter",
                            Some("count".to_string()),
                        ));
                    }
                };
                Ok(WindowSpec::Counting { count })
            }
            other => Err(SqlError::config_error(
                format!("unknown window type '{}'", other),
                Some("window".to_string()),
            )),
        }
    }

    fn duration_param(&self, index: usize, name: &str) -> SqlResult<Duration> {
        match self.optional_duration_param(index)? {
            Some(duration) => Ok(duration),
            None => Err(SqlError::config_error(
                format!("window requires a {} parameter", name),
                Some(name.to_string()),
            )),
        }
    }

    fn optional_duration_param(&self, index: usize) -> SqlResult<Option<Duration>> {
        match self.window.params.get(index) {
            None => Ok(None),
            Some(WindowParam::Str(text)) => parse_duration(text).map(Some),
            Some(other) => Err(SqlError::config_error(
                format!("window parameter must be a duration string like '5s', got {:?}", other),
                None,
            )),
        }
    }
}

/// Field an aggregate call reads from: the leading identifier of its first
/// argument, e.g. `avg(temperature/10)` → `temperature`.
fn aggregate_source_field(expr: &str) -> Option<String> {
    let open = expr.find('(')?;
    let close = expr.rfind(')')?;
    if close <= open {
        return None;
    }
    let inner = expr[open + 1..close].trim();
    let ident: String = inner
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .collect();
    if ident.is_empty() {
        None
    } else {
        Some(ident)
    }
}

/// Parse a duration literal such as `10s`, `250ms`, or `1m`.
///
/// Supported units: ns, us, ms, s, m, h.
pub fn parse_duration(text: &str) -> SqlResult<Duration> {
    let text = strip_quotes(text.trim());
    let invalid = |unit: &str| {
        SqlError::config_error(
            format!("invalid '{}' duration: {}", unit, text),
            Some("duration".to_string()),
        )
    };

    if let Some(value) = text.strip_suffix("ns") {
        let nanos: u64 = value.parse().map_err(|_| invalid("ns"))?;
        Ok(Duration::from_nanos(nanos))
    } else if let Some(value) = text.strip_suffix("us") {
        let micros: u64 = value.parse().map_err(|_| invalid("us"))?;
        Ok(Duration::from_micros(micros))
    } else if let Some(value) = text.strip_suffix("ms") {
        let millis: u64 = value.parse().map_err(|_| invalid("ms"))?;
        Ok(Duration::from_millis(millis))
    } else if let Some(value) = text.strip_suffix('s') {
        let seconds: u64 = value.parse().map_err(|_| invalid("s"))?;
        Ok(Duration::from_secs(seconds))
    } else if let Some(value) = text.strip_suffix('m') {
        let minutes: u64 = value.parse().map_err(|_| invalid("m"))?;
        Ok(Duration::from_secs(minutes * 60))
    } else if let Some(value) = text.strip_suffix('h') {
        let hours: u64 = value.parse().map_err(|_| invalid("h"))?;
        Ok(Duration::from_secs(hours * 3600))
    } else {
        Err(SqlError::config_error(
            format!("invalid duration: {}", text),
            Some("duration".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("'5s'").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("100ns").unwrap(), Duration::from_nanos(100));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("xs").is_err());
    }

    #[test]
    fn test_split_over() {
        let (head, over) = split_over("lag(temperature) OVER (PARTITION BY deviceId)");
        assert_eq!(head, "lag(temperature)");
        assert_eq!(over, Some("OVER (PARTITION BY deviceId)"));

        let (head, over) = split_over("avg(turnover)");
        assert_eq!(head, "avg(turnover)");
        assert_eq!(over, None);

        // no parenthesized clause, no split
        let (head, over) = split_over("rollover + 1");
        assert_eq!(head, "rollover + 1");
        assert_eq!(over, None);
    }

    #[test]
    fn test_parse_over_clause() {
        let clause = parse_over_clause("OVER (PARTITION BY deviceId ORDER BY ts desc, id)");
        assert_eq!(clause.partition_by, vec!["deviceId"]);
        assert_eq!(
            clause.order_by,
            vec![
                ("ts".to_string(), SortDirection::Desc),
                ("id".to_string(), SortDirection::Asc),
            ]
        );
    }

    #[test]
    fn test_aggregate_source_field() {
        assert_eq!(
            aggregate_source_field("avg(temperature/10)"),
            Some("temperature".to_string())
        );
        assert_eq!(
            aggregate_source_field("max(humidity)"),
            Some("humidity".to_string())
        );
        assert_eq!(aggregate_source_field("deviceId"), None);
    }
}
