//! Quota buckets and their calendar windows.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::usage::Usage;

/// The calendar window a bucket belongs to, in the ledger timezone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// `YYYY-MM-DD`
    pub day: String,
    /// `YYYY-MM`
    pub month: String,
}

impl Window {
    pub fn at(now: DateTime<Utc>, tz: Tz) -> Self {
        let local = now.with_timezone(&tz);
        Self {
            day: local.format("%Y-%m-%d").to_string(),
            month: local.format("%Y-%m").to_string(),
        }
    }
}

/// Live accounting for one `(lane, provider)` pair in one scope for the
/// current window.
///
/// `used` is committed spend; `reserved` is the sum of in-flight
/// reservations not yet committed or rolled back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub window_day: String,
    pub window_month: String,
    #[serde(default)]
    pub used: Usage,
    #[serde(default)]
    pub reserved: Usage,
    #[serde(default)]
    pub hard_stopped: bool,
    pub last_update: DateTime<Utc>,
}

impl Bucket {
    pub fn fresh(window: &Window, now: DateTime<Utc>) -> Self {
        Self {
            window_day: window.day.clone(),
            window_month: window.month.clone(),
            used: Usage::default(),
            reserved: Usage::default(),
            hard_stopped: false,
            last_update: now,
        }
    }

    /// Tokens already spent or promised in this window.
    pub fn committed_and_reserved_tokens(&self) -> u64 {
        self.used
            .total_tokens()
            .saturating_add(self.reserved.total_tokens())
    }

    pub fn committed_and_reserved_cost(&self) -> f64 {
        self.used.cost_units + self.reserved.cost_units
    }
}
