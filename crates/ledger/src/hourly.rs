//! Sparse hourly usage log for dashboards.  Never consulted for
//! enforcement.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::usage::Usage;

/// `hourKey → Usage`.  Keys are fixed-width, so lexical order is
/// chronological order.
pub type HourlyLog = BTreeMap<String, Usage>;

/// `YYYY-MM-DDTHH` in the ledger timezone.
pub fn hour_key(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%Y-%m-%dT%H").to_string()
}

pub fn record(log: &mut HourlyLog, at: DateTime<Utc>, tz: Tz, usage: Usage) {
    *log.entry(hour_key(at, tz)).or_default() += usage;
}

/// Drop every entry older than `retention_hours` before `now`.
/// A retention reaching past the earliest representable time keeps
/// everything.
pub fn prune(log: &mut HourlyLog, now: DateTime<Utc>, tz: Tz, retention_hours: u32) {
    let Some(oldest) = now.checked_sub_signed(Duration::hours(i64::from(retention_hours))) else {
        return;
    };
    let cutoff = hour_key(oldest, tz);
    log.retain(|key, _| key.as_str() >= cutoff.as_str());
}
