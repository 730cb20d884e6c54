//! The persisted ledger document and its bucket lookup/rollover logic.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bucket::{Bucket, Window};
use crate::hourly::HourlyLog;

/// Which bucket family an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    Global,
    Tenant(&'a str),
}

impl<'a> Scope<'a> {
    pub fn from_tenant(tenant_id: Option<&'a str>) -> Self {
        match tenant_id {
            Some(t) => Scope::Tenant(t),
            None => Scope::Global,
        }
    }
}

type BucketMap = BTreeMap<String, Bucket>;
type HistoryMap = BTreeMap<String, Vec<Bucket>>;

/// The JSON state file.  Bucket keys are `"{lane}:{provider}"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerState {
    #[serde(default)]
    pub global_buckets: BucketMap,
    #[serde(default)]
    pub global_history: HistoryMap,
    #[serde(default)]
    pub user_buckets: BTreeMap<String, BucketMap>,
    #[serde(default)]
    pub user_history: BTreeMap<String, HistoryMap>,
    #[serde(default)]
    pub global_hourly: BTreeMap<String, HourlyLog>,
    #[serde(default)]
    pub user_hourly: BTreeMap<String, BTreeMap<String, HourlyLog>>,
    #[serde(default)]
    pub unlimited_mode: bool,
    #[serde(default)]
    pub unlimited_users: BTreeSet<String>,
}

impl LedgerState {
    /// Fetch (or create) the bucket for the current window.
    ///
    /// When the stored bucket belongs to an earlier day it is replaced by
    /// a fresh one; the old bucket is archived to history if it carried
    /// any committed usage.  This is the only place quotas reset.
    ///
    /// Returns the bucket and whether a rollover happened.
    pub fn current_bucket(
        &mut self,
        scope: Scope<'_>,
        key: &str,
        window: &Window,
        now: DateTime<Utc>,
    ) -> (&mut Bucket, bool) {
        let (buckets, history) = match scope {
            Scope::Global => (&mut self.global_buckets, &mut self.global_history),
            Scope::Tenant(t) => (
                self.user_buckets.entry(t.to_string()).or_default(),
                self.user_history.entry(t.to_string()).or_default(),
            ),
        };

        let mut rolled = false;
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::fresh(window, now));

        if bucket.window_day != window.day {
            let retired = std::mem::replace(bucket, Bucket::fresh(window, now));
            if !retired.used.is_zero() {
                history.entry(key.to_string()).or_default().push(retired);
            }
            rolled = true;
        }
        (bucket, rolled)
    }

    /// Bring the stored bucket into `window`, archiving a stale one.
    /// Call before reading history so a bucket retired by this lookup is
    /// already counted there.
    pub fn roll_over(&mut self, scope: Scope<'_>, key: &str, window: &Window, now: DateTime<Utc>) -> bool {
        self.current_bucket(scope, key, window, now).1
    }

    pub fn history(&self, scope: Scope<'_>, key: &str) -> &[Bucket] {
        let list = match scope {
            Scope::Global => self.global_history.get(key),
            Scope::Tenant(t) => self.user_history.get(t).and_then(|m| m.get(key)),
        };
        list.map(Vec::as_slice).unwrap_or(&[])
    }

    /// Committed cost of all retired buckets for this key.
    pub fn history_cost(&self, scope: Scope<'_>, key: &str) -> f64 {
        self.history(scope, key)
            .iter()
            .map(|b| b.used.cost_units)
            .sum()
    }

    pub fn hourly_mut(&mut self, scope: Scope<'_>, key: &str) -> &mut HourlyLog {
        match scope {
            Scope::Global => self.global_hourly.entry(key.to_string()).or_default(),
            Scope::Tenant(t) => self
                .user_hourly
                .entry(t.to_string())
                .or_default()
                .entry(key.to_string())
                .or_default(),
        }
    }

    pub fn hourly(&self, scope: Scope<'_>, key: &str) -> Option<&HourlyLog> {
        match scope {
            Scope::Global => self.global_hourly.get(key),
            Scope::Tenant(t) => self.user_hourly.get(t).and_then(|m| m.get(key)),
        }
    }

    /// Zero every bucket's `reserved` total.  Reservations live only in
    /// memory, so after a restart nothing can ever release them.
    pub fn clear_reservations(&mut self) -> bool {
        let mut cleared = false;
        let all = self
            .global_buckets
            .values_mut()
            .chain(self.user_buckets.values_mut().flat_map(|m| m.values_mut()));
        for bucket in all {
            if !bucket.reserved.is_zero() {
                bucket.reserved = Default::default();
                cleared = true;
            }
        }
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::Usage;
    use chrono::{Duration, TimeZone};

    fn day(n: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, n, 9, 0, 0).unwrap()
    }

    #[test]
    fn rollover_archives_used_bucket_once() {
        let tz = chrono_tz::UTC;
        let mut state = LedgerState::default();

        let w1 = Window::at(day(1), tz);
        let (b, rolled) = state.current_bucket(Scope::Global, "stable:openai", &w1, day(1));
        assert!(!rolled);
        b.used += Usage::tokens(100, 50);

        let w2 = Window::at(day(2), tz);
        let (b, rolled) = state.current_bucket(Scope::Global, "stable:openai", &w2, day(2));
        assert!(rolled);
        assert!(b.used.is_zero());
        assert_eq!(b.window_day, "2026-05-02");

        // Second lookup on the same day does not archive again.
        let (_, rolled) = state.current_bucket(Scope::Global, "stable:openai", &w2, day(2));
        assert!(!rolled);

        let hist = state.history(Scope::Global, "stable:openai");
        assert_eq!(hist.len(), 1);
        assert_eq!(hist[0].window_day, "2026-05-01");
        assert_eq!(hist[0].used.total_tokens(), 150);
    }

    #[test]
    fn roll_over_archives_before_history_is_read() {
        let tz = chrono_tz::UTC;
        let mut state = LedgerState::default();
        state
            .current_bucket(Scope::Global, "burn:anthropic", &Window::at(day(1), tz), day(1))
            .0
            .used += Usage::cost(2.5);

        assert_eq!(state.history_cost(Scope::Global, "burn:anthropic"), 0.0);
        assert!(state.roll_over(Scope::Global, "burn:anthropic", &Window::at(day(2), tz), day(2)));
        assert_eq!(state.history_cost(Scope::Global, "burn:anthropic"), 2.5);
        assert!(!state.roll_over(Scope::Global, "burn:anthropic", &Window::at(day(2), tz), day(2)));
    }

    #[test]
    fn rollover_skips_empty_buckets() {
        let tz = chrono_tz::UTC;
        let mut state = LedgerState::default();
        state.current_bucket(Scope::Tenant("u1"), "k:p", &Window::at(day(1), tz), day(1));
        let (_, rolled) =
            state.current_bucket(Scope::Tenant("u1"), "k:p", &Window::at(day(3), tz), day(3));
        assert!(rolled);
        assert!(state.history(Scope::Tenant("u1"), "k:p").is_empty());
    }

    #[test]
    fn tenant_and_global_buckets_are_separate() {
        let tz = chrono_tz::UTC;
        let now = day(4);
        let w = Window::at(now, tz);
        let mut state = LedgerState::default();
        state.current_bucket(Scope::Tenant("u1"), "k:p", &w, now).0.used += Usage::tokens(5, 0);
        assert_eq!(state.user_buckets["u1"]["k:p"].used.total_tokens(), 5);
        assert!(!state.global_buckets.contains_key("k:p"));
    }

    #[test]
    fn clear_reservations_reports_change() {
        let tz = chrono_tz::UTC;
        let now = day(6) + Duration::hours(1);
        let w = Window::at(now, tz);
        let mut state = LedgerState::default();
        assert!(!state.clear_reservations());
        state.current_bucket(Scope::Global, "k:p", &w, now).0.reserved += Usage::tokens(1, 1);
        assert!(state.clear_reservations());
        assert!(state.global_buckets["k:p"].reserved.is_zero());
    }
}
