//! Core streaming data types.
//!
//! This module contains the fundamental data types used throughout the
//! engine:
//! - [`FieldValue`] - the dynamically typed value carried in record fields
//! - [`Record`] - the field-name → value mapping records arrive as
//! - [`Row`] - a record stamped with its stream timestamp and window slot
//! - [`TimeSlot`] - a half-open time interval defining one window instance

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::fmt;

/// A value in a record field
///
/// This enum represents the data types the engine understands. Arithmetic
/// coercion promotes `Integer` to `Float` when the two are mixed; every
/// other cross-type operation is a type error.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Boolean value (true/false)
    Boolean(bool),
    /// Instant with nanosecond precision
    Timestamp(DateTime<Utc>),
    /// Absent or unknown value
    Null,
}

impl FieldValue {
    /// Numeric view of this value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean view of this value, if it has one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Name of this value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::String(_) => "string",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Null => "null",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::Nanos, true)),
            FieldValue::Null => write!(f, "NULL"),
        }
    }
}

/// Serialize to the natural JSON shape (numbers as numbers, timestamps as
/// RFC 3339 strings, `Null` as JSON null) rather than an enum tagging.
impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Integer(i) => serializer.serialize_i64(*i),
            FieldValue::Float(v) => serializer.serialize_f64(*v),
            FieldValue::String(s) => serializer.serialize_str(s),
            FieldValue::Boolean(b) => serializer.serialize_bool(*b),
            FieldValue::Timestamp(t) => {
                serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Nanos, true))
            }
            FieldValue::Null => serializer.serialize_none(),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

/// A source record: an opaque mapping from field name to value.
pub type Record = HashMap<String, FieldValue>;

/// Serializable wrapper for a result batch, used by sinks that write JSON.
pub struct ResultBatch<'a>(pub &'a [Record]);

impl Serialize for ResultBatch<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|record| SerializableRecord(record)))
    }
}

struct SerializableRecord<'a>(&'a Record);

impl Serialize for SerializableRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// A half-open time interval `[start, end)` defining one window instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end, "time slot must be non-empty");
        TimeSlot { start, end }
    }

    /// A row belongs to this slot iff `start <= t < end`.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A record stamped with its stream timestamp and, once windowed, the slot
/// it was emitted under.
#[derive(Debug, Clone)]
pub struct Row {
    pub data: Record,
    pub timestamp: DateTime<Utc>,
    pub slot: Option<TimeSlot>,
}

impl Row {
    pub fn new(data: Record, timestamp: DateTime<Utc>) -> Self {
        Row {
            data,
            timestamp,
            slot: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamql::utils::time::from_nanos;

    #[test]
    fn test_field_value_coercion() {
        assert_eq!(FieldValue::Integer(3).as_f64(), Some(3.0));
        assert_eq!(FieldValue::Float(2.5).as_f64(), Some(2.5));
        assert_eq!(FieldValue::String("x".into()).as_f64(), None);
        assert_eq!(FieldValue::Boolean(true).as_bool(), Some(true));
        assert_eq!(FieldValue::Null.as_bool(), None);
    }

    #[test]
    fn test_time_slot_half_open() {
        let slot = TimeSlot::new(from_nanos(1_000), from_nanos(2_000));
        assert!(slot.contains(from_nanos(1_000)));
        assert!(slot.contains(from_nanos(1_999)));
        assert!(!slot.contains(from_nanos(2_000)));
        assert!(!slot.contains(from_nanos(999)));
    }
}
