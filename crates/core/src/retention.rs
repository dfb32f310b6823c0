//! Retention policies
//!
//! Selects which listed objects a cleanup should delete. Selection is a pure
//! function of the listing and the policy; deleting is left to the caller.

use jiff::Timestamp;
use jiff::civil::Date;
use jiff::tz::TimeZone;

use crate::error::{Error, Result};
use crate::traits::RemoteObject;

/// How many / which objects under a prefix to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep the `n` most recently modified objects
    KeepLast(usize),
    /// Keep objects modified at or after the given instant
    ExpireBefore(Timestamp),
}

impl std::fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetentionPolicy::KeepLast(n) => write!(f, "keep last {n}"),
            RetentionPolicy::ExpireBefore(date) => write!(f, "expire before {date}"),
        }
    }
}

/// Objects to delete under `policy`, ordered oldest first
///
/// The input is stably sorted by modification time, so objects with equal
/// timestamps keep their listing order.
pub fn select(objects: &[RemoteObject], policy: RetentionPolicy) -> Vec<RemoteObject> {
    let mut sorted = objects.to_vec();
    sorted.sort_by_key(|o| o.last_modified);

    match policy {
        RetentionPolicy::KeepLast(n) => {
            let excess = sorted.len().saturating_sub(n);
            sorted.truncate(excess);
            sorted
        }
        RetentionPolicy::ExpireBefore(date) => sorted
            .into_iter()
            .filter(|o| o.last_modified < date)
            .collect(),
    }
}

/// Parse an expiry date given as an RFC 3339 instant or a `YYYY-MM-DD` date (UTC midnight)
pub fn parse_expire_date(value: &str) -> Result<Timestamp> {
    let value = value.trim();

    if let Ok(ts) = value.parse::<Timestamp>() {
        return Ok(ts);
    }

    let date: Date = value.parse().map_err(|e| {
        Error::Config(format!(
            "expireDate must be YYYY-MM-DD or an RFC 3339 timestamp, got '{value}': {e}"
        ))
    })?;

    date.to_zoned(TimeZone::UTC)
        .map(|zoned| zoned.timestamp())
        .map_err(|e| Error::Config(format!("expireDate '{value}' out of range: {e}")))
}
