//! Logical time

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied logical timestamp marking a version.
///
/// The store never derives timestamps from the wall clock; ordering is plain
/// integer ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Smallest representable timestamp
    pub const MIN: Timestamp = Timestamp(i64::MIN);

    /// Largest representable timestamp
    pub const MAX: Timestamp = Timestamp(i64::MAX);

    /// Create a timestamp from a raw logical time value
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Raw logical time value
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// Milliseconds since the Unix epoch, for front ends that default a
    /// missing timestamp to "now".
    pub fn now_millis() -> Self {
        Self(Utc::now().timestamp_millis())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Timestamp> for i64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}
