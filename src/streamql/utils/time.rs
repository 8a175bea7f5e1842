//! Instant alignment against a unit boundary.
//!
//! Windows align slot boundaries to multiples of a duration measured from
//! the Unix epoch. All arithmetic is done on nanosecond counts; instants
//! outside the representable nanosecond range are clamped by chrono.

use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

/// Nanoseconds since the Unix epoch for `t`.
pub fn to_nanos(t: DateTime<Utc>) -> i64 {
    t.timestamp_nanos_opt().unwrap_or(0)
}

/// Instant at `nanos` nanoseconds since the Unix epoch.
pub fn from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

/// Align `t` down to the previous multiple of `unit`.
pub fn align_floor(t: DateTime<Utc>, unit: Duration) -> DateTime<Utc> {
    let step = unit.as_nanos() as i64;
    if step <= 0 {
        return t;
    }
    let n = to_nanos(t);
    from_nanos(n - n.rem_euclid(step))
}

/// Align `t` up to the next multiple of `unit`.
///
/// An instant already on a boundary is returned unchanged.
pub fn align_ceil(t: DateTime<Utc>, unit: Duration) -> DateTime<Utc> {
    let step = unit.as_nanos() as i64;
    if step <= 0 {
        return t;
    }
    let n = to_nanos(t);
    let rem = n.rem_euclid(step);
    if rem == 0 {
        t
    } else {
        from_nanos(n - rem + step)
    }
}

/// Align `t` down to the previous multiple of `size`, shifted by `offset`
/// from the epoch.
pub fn align_floor_offset(t: DateTime<Utc>, size: Duration, offset: Duration) -> DateTime<Utc> {
    let step = size.as_nanos() as i64;
    if step <= 0 {
        return t;
    }
    let shift = offset.as_nanos() as i64;
    let n = to_nanos(t) - shift;
    from_nanos(n - n.rem_euclid(step) + shift)
}
