//! Budget admission and spend accounting: the [`QuotaLedger`].
//!
//! Every operation takes one `parking_lot::Mutex` for the whole
//! read-check-mutate-persist sequence.  Quota denial is a value
//! ([`CallDecision`]), never an error.  Persistence failures are logged,
//! the in-memory state is kept, and the next mutation rewrites the full
//! document again.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::Serialize;

use lg_domain::config::{LedgerConfig, Limits, LimitsTable};
use lg_domain::error::{Error, Result};
use lg_domain::LaneKey;

use crate::bucket::{Bucket, Window};
use crate::clock::{Clock, SystemClock};
use crate::hourly::{self, HourlyLog};
use crate::state::{LedgerState, Scope};
use crate::store::StateStore;
use crate::usage::Usage;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which budget a denied call ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedBudget {
    /// The bucket latched its hard stop earlier in this window.
    HardStopped,
    /// The caller's own daily token budget.
    DailyTokens,
    /// The shared daily token budget for the lane.
    SharedDailyTokens,
    /// The cumulative cost cap for the lane.
    LifetimeCost,
}

impl ExhaustedBudget {
    fn label(self) -> &'static str {
        match self {
            ExhaustedBudget::HardStopped => "the lane's hard spending stop",
            ExhaustedBudget::DailyTokens => "your daily token budget",
            ExhaustedBudget::SharedDailyTokens => "the shared daily token budget",
            ExhaustedBudget::LifetimeCost => "the lane's total spending cap",
        }
    }
}

/// Outcome of [`QuotaLedger::can_call`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallDecision {
    pub allowed: bool,
    pub reason: String,
    pub exhausted: Option<ExhaustedBudget>,
    /// Cheaper lane to try instead when `allowed` is false.
    pub fallback: Option<LaneKey>,
}

impl CallDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            exhausted: None,
            fallback: None,
        }
    }

    fn deny(exhausted: ExhaustedBudget, reason: String, fallback: LaneKey) -> Self {
        Self {
            allowed: false,
            reason,
            exhausted: Some(exhausted),
            fallback: Some(fallback),
        }
    }

    /// Text for the end caller.  Names the exhausted budget, never raw
    /// bucket numbers.
    pub fn policy_message(&self) -> Option<String> {
        self.exhausted.map(|b| {
            format!(
                "This request was not sent because {} has been used up. \
                 A lower-cost option will be used where possible.",
                b.label()
            )
        })
    }
}

/// How [`QuotaLedger::rollback`] treats the reservation's estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackMode {
    /// The call failed before incurring cost; drop the estimate.
    Release,
    /// The call partially succeeded; count the estimate as spent.
    Keep,
}

/// Result of reconciling against an external usage report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub updated: bool,
    pub drift_added: u64,
}

/// Headroom left before the buffered daily limit / lifetime cap.
/// `None` means that dimension is uncapped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RemainingBudget {
    pub tokens: Option<u64>,
    pub cost_units: Option<f64>,
}

/// One live bucket for status output.
#[derive(Debug, Clone, Serialize)]
pub struct BucketStatus {
    pub tenant_id: Option<String>,
    pub key: String,
    pub window_day: String,
    pub used: Usage,
    pub reserved: Usage,
    pub hard_stopped: bool,
    pub daily_token_limit: Option<u64>,
    pub lifetime_cost_limit: Option<f64>,
    pub usage_ratio: Option<f64>,
}

/// An in-flight hold on quota.  Lives only in memory.
#[derive(Debug, Clone)]
struct Reservation {
    key: LaneKey,
    tenant_id: Option<String>,
    estimate: Usage,
    /// Day whose bucket holds the estimate in `reserved`.
    window_day: String,
}

struct Inner {
    state: LedgerState,
    reservations: HashMap<String, Reservation>,
    /// Set when the last write failed; cleared by the next good write.
    dirty: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// QuotaLedger
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct QuotaLedger {
    tz: Tz,
    buffer_ratio: f64,
    fallback: LaneKey,
    hourly_retention_hours: u32,
    limits: LimitsTable,
    inner: Mutex<Inner>,
    store: Option<StateStore>,
    clock: Arc<dyn Clock>,
    orphaned_commits: AtomicU64,
}

impl QuotaLedger {
    /// Open a file-backed ledger at `config.state_path`.
    pub fn open(config: &LedgerConfig, limits: LimitsTable) -> Result<Self> {
        let (store, mut state) = StateStore::open(&config.state_path)?;
        if state.clear_reservations() {
            tracing::warn!(
                path = %config.state_path.display(),
                "dropped reserved totals left over from a previous process"
            );
            store.write(&state)?;
        }
        Ok(Self::build(config, limits, state, Some(store)))
    }

    /// A ledger that never touches disk.
    pub fn in_memory(config: &LedgerConfig, limits: LimitsTable) -> Self {
        Self::build(config, limits, LedgerState::default(), None)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn build(
        config: &LedgerConfig,
        limits: LimitsTable,
        state: LedgerState,
        store: Option<StateStore>,
    ) -> Self {
        Self {
            tz: config.tz(),
            buffer_ratio: config.buffer_ratio(),
            fallback: config.fallback_key(),
            hourly_retention_hours: config.hourly_retention_hours,
            limits,
            inner: Mutex::new(Inner {
                state,
                reservations: HashMap::new(),
                dirty: false,
            }),
            store,
            clock: Arc::new(SystemClock),
            orphaned_commits: AtomicU64::new(0),
        }
    }

    /// A fresh reservation id.
    pub fn new_reservation_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn fallback_lane(&self) -> &LaneKey {
        &self.fallback
    }

    pub fn limits(&self) -> &LimitsTable {
        &self.limits
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Commits that arrived with an unknown reservation id and were
    /// counted anyway.
    pub fn orphaned_commits(&self) -> u64 {
        self.orphaned_commits.load(Ordering::Relaxed)
    }

    // ── Admission ────────────────────────────────────────────────────

    /// Decide whether a call estimated at `estimate` may proceed.
    ///
    /// Checks, in order: hard-stop latch, the scope's buffered daily
    /// token limit, the shared (global) buffered daily limit when a
    /// tenant is given, and the lifetime cost cap.
    pub fn can_call(&self, key: &LaneKey, tenant_id: Option<&str>, estimate: &Usage) -> CallDecision {
        let mut inner = self.inner.lock();

        if inner.state.unlimited_mode {
            return CallDecision::allow("unlimited mode is enabled");
        }
        if let Some(t) = tenant_id {
            if inner.state.unlimited_users.contains(t) {
                return CallDecision::allow("tenant is exempt from quota");
            }
        }

        let limits = match self.limits.get(key) {
            None => return CallDecision::allow("no limits configured"),
            Some(l) if !l.hard_stop => return CallDecision::allow("limits are informational"),
            Some(l) => *l,
        };

        let now = self.clock.now();
        let window = Window::at(now, self.tz);
        let key_str = key.to_string();
        let scope = Scope::from_tenant(tenant_id);

        let (bucket, rolled) = inner.state.current_bucket(scope, &key_str, &window, now);
        let bucket = bucket.clone();
        let mut rolled_any = rolled;

        let decision = 'check: {
            if bucket.hard_stopped {
                break 'check Some(CallDecision::deny(
                    ExhaustedBudget::HardStopped,
                    format!("{key} is hard-stopped for {}", bucket.window_day),
                    self.fallback.clone(),
                ));
            }

            if let Some(daily) = limits.daily_token_limit {
                if self.exceeds_daily(&bucket, estimate, daily) {
                    let which = if tenant_id.is_some() {
                        ExhaustedBudget::DailyTokens
                    } else {
                        ExhaustedBudget::SharedDailyTokens
                    };
                    break 'check Some(CallDecision::deny(
                        which,
                        format!("daily token limit reached for {key}"),
                        self.fallback.clone(),
                    ));
                }

                if tenant_id.is_some() {
                    let (global, rolled) =
                        inner.state.current_bucket(Scope::Global, &key_str, &window, now);
                    rolled_any |= rolled;
                    if global.hard_stopped || self.exceeds_daily(global, estimate, daily) {
                        break 'check Some(CallDecision::deny(
                            ExhaustedBudget::SharedDailyTokens,
                            format!("shared daily token limit reached for {key}"),
                            self.fallback.clone(),
                        ));
                    }
                }
            }

            if let Some(cap) = limits.lifetime_cost_limit {
                let mut scopes = vec![scope];
                if tenant_id.is_some() {
                    scopes.push(Scope::Global);
                }
                for s in scopes {
                    let (b, rolled) = inner.state.current_bucket(s, &key_str, &window, now);
                    rolled_any |= rolled;
                    let current = b.committed_and_reserved_cost();
                    let spent = inner.state.history_cost(s, &key_str) + current;
                    if spent + estimate.cost_units > cap {
                        break 'check Some(CallDecision::deny(
                            ExhaustedBudget::LifetimeCost,
                            format!("lifetime cost limit {cap} reached for {key}"),
                            self.fallback.clone(),
                        ));
                    }
                }
            }

            None
        };

        if rolled_any {
            self.persist_locked(&mut inner);
        }

        match decision {
            Some(denied) => {
                tracing::info!(
                    key = %key,
                    tenant_id = tenant_id.unwrap_or("-"),
                    reason = %denied.reason,
                    fallback = %self.fallback,
                    "quota check denied call"
                );
                denied
            }
            None => CallDecision::allow("within quota"),
        }
    }

    fn exceeds_daily(&self, bucket: &Bucket, estimate: &Usage, daily: u64) -> bool {
        let projected = bucket
            .committed_and_reserved_tokens()
            .saturating_add(estimate.total_tokens());
        projected as f64 > daily as f64 * self.buffer_ratio
    }

    // ── Reservation lifecycle ────────────────────────────────────────

    /// Hold `estimate` against the bucket(s) until commit or rollback.
    ///
    /// Idempotent per `reservation_id`.  Does not re-check quota.
    pub fn reserve(&self, key: &LaneKey, tenant_id: Option<&str>, reservation_id: &str, estimate: Usage) {
        let mut inner = self.inner.lock();
        if inner.reservations.contains_key(reservation_id) {
            tracing::debug!(reservation_id, "reservation already recorded");
            return;
        }

        let now = self.clock.now();
        let window = Window::at(now, self.tz);
        let key_str = key.to_string();
        for scope in scopes_for(tenant_id) {
            let (bucket, _) = inner.state.current_bucket(scope, &key_str, &window, now);
            bucket.reserved += estimate;
            bucket.last_update = now;
        }

        inner.reservations.insert(
            reservation_id.to_string(),
            Reservation {
                key: key.clone(),
                tenant_id: tenant_id.map(str::to_string),
                estimate,
                window_day: window.day.clone(),
            },
        );
        tracing::debug!(key = %key, reservation_id, tokens = estimate.total_tokens(), "reserved");
        self.persist_locked(&mut inner);
    }

    /// Record `actual` as spent and release the reservation.
    ///
    /// An unknown `reservation_id` still counts `actual` (over-counting
    /// beats losing spend) and bumps [`orphaned_commits`](Self::orphaned_commits).
    /// Returns the scope bucket's committed cost after the update.
    pub fn commit(&self, key: &LaneKey, tenant_id: Option<&str>, reservation_id: &str, actual: Usage) -> f64 {
        let mut inner = self.inner.lock();
        let now = self.clock.now();
        let window = Window::at(now, self.tz);

        match inner.reservations.remove(reservation_id) {
            Some(r) => {
                if r.key != *key || r.tenant_id.as_deref() != tenant_id {
                    tracing::warn!(
                        reservation_id,
                        reserved_for = %r.key,
                        committed_to = %key,
                        "commit target differs from reservation"
                    );
                }
                self.release_locked(&mut inner.state, &r, &window, now);
            }
            None => {
                self.orphaned_commits.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    key = %key,
                    reservation_id,
                    tokens = actual.total_tokens(),
                    "commit for unknown reservation; counting usage anyway"
                );
            }
        }

        let committed = self.spend_locked(&mut inner.state, key, tenant_id, actual, &window, now);
        self.persist_locked(&mut inner);
        committed
    }

    /// Resolve a reservation without a normal commit.  Unknown ids are a
    /// no-op, which also makes a repeated rollback harmless.
    pub fn rollback(&self, key: &LaneKey, tenant_id: Option<&str>, reservation_id: &str, mode: RollbackMode) {
        let mut inner = self.inner.lock();
        let Some(r) = inner.reservations.remove(reservation_id) else {
            tracing::debug!(key = %key, reservation_id, "rollback for unknown reservation ignored");
            return;
        };
        if r.key != *key || r.tenant_id.as_deref() != tenant_id {
            tracing::warn!(reservation_id, reserved_for = %r.key, "rollback target differs from reservation");
        }

        let now = self.clock.now();
        let window = Window::at(now, self.tz);
        self.release_locked(&mut inner.state, &r, &window, now);
        if mode == RollbackMode::Keep {
            self.spend_locked(&mut inner.state, &r.key, r.tenant_id.as_deref(), r.estimate, &window, now);
        }
        self.persist_locked(&mut inner);
    }

    /// Drop the reservation's hold.  A hold taken in an earlier window
    /// was retired with that window's bucket, so the live bucket's
    /// `reserved` (other in-flight holds) is left alone.
    fn release_locked(&self, state: &mut LedgerState, r: &Reservation, window: &Window, now: DateTime<Utc>) {
        let key_str = r.key.to_string();
        for scope in scopes_for(r.tenant_id.as_deref()) {
            let (bucket, _) = state.current_bucket(scope, &key_str, window, now);
            if bucket.window_day == r.window_day {
                bucket.reserved.sub_assign_saturating(&r.estimate);
            }
            bucket.last_update = now;
        }
    }

    /// Add `usage` to `used` in the tenant bucket (if any) and the global
    /// bucket, log it hourly, and latch hard stops.  Returns the scope
    /// bucket's committed cost.
    fn spend_locked(
        &self,
        state: &mut LedgerState,
        key: &LaneKey,
        tenant_id: Option<&str>,
        usage: Usage,
        window: &Window,
        now: DateTime<Utc>,
    ) -> f64 {
        let key_str = key.to_string();
        let limits = self.limits.enforced(key).copied();
        let mut scope_cost = 0.0;

        for scope in scopes_for(tenant_id) {
            state.roll_over(scope, &key_str, window, now);
            let history_cost = state.history_cost(scope, &key_str);
            let (bucket, _) = state.current_bucket(scope, &key_str, window, now);
            bucket.used += usage;
            bucket.last_update = now;
            if let Some(l) = limits {
                latch_hard_stop(bucket, &l, history_cost, key, scope);
            }
            if scope == Scope::from_tenant(tenant_id) {
                scope_cost = bucket.used.cost_units;
            }

            let log = state.hourly_mut(scope, &key_str);
            hourly::record(log, now, self.tz, usage);
            hourly::prune(log, now, self.tz, self.hourly_retention_hours);
        }
        scope_cost
    }

    // ── Unlimited override ───────────────────────────────────────────

    /// Set or clear the global exemption (`tenant_id = None`) or one
    /// tenant's exemption.  Authorization is the caller's job.
    pub fn toggle_unlimited(&self, enabled: bool, tenant_id: Option<&str>) {
        let mut inner = self.inner.lock();
        match tenant_id {
            None => inner.state.unlimited_mode = enabled,
            Some(t) if enabled => {
                inner.state.unlimited_users.insert(t.to_string());
            }
            Some(t) => {
                inner.state.unlimited_users.remove(t);
            }
        }
        tracing::warn!(enabled, tenant_id = tenant_id.unwrap_or("*"), "unlimited mode toggled");
        self.persist_locked(&mut inner);
    }

    pub fn is_unlimited(&self, tenant_id: Option<&str>) -> bool {
        let inner = self.inner.lock();
        inner.state.unlimited_mode
            || tenant_id.is_some_and(|t| inner.state.unlimited_users.contains(t))
    }

    pub fn unlimited_tenants(&self) -> Vec<String> {
        self.inner.lock().state.unlimited_users.iter().cloned().collect()
    }

    // ── External reconciliation ──────────────────────────────────────

    /// The report date range `[today - lookback_days, today]` in the
    /// ledger timezone.
    pub fn report_range(&self, lookback_days: u32) -> (NaiveDate, NaiveDate) {
        let today = self.clock.now().with_timezone(&self.tz).date_naive();
        let start = today
            .checked_sub_signed(Duration::days(i64::from(lookback_days)))
            .unwrap_or(NaiveDate::MIN);
        (start, today)
    }

    /// Compare-and-correct step of usage sync.  Only ever ratchets the
    /// global bucket upward: a report lower than local tracking is
    /// ignored.
    ///
    /// Local tracking covers the current bucket plus archived buckets
    /// whose day falls on or after `range_start`.
    pub fn apply_external_total(&self, key: &LaneKey, range_start: NaiveDate, reported_total_tokens: u64) -> SyncOutcome {
        let mut inner = self.inner.lock();
        let now = self.clock.now();
        let window = Window::at(now, self.tz);
        let key_str = key.to_string();
        let start = range_start.format("%Y-%m-%d").to_string();

        let rolled = inner.state.roll_over(Scope::Global, &key_str, &window, now);
        let archived: u64 = inner
            .state
            .history(Scope::Global, &key_str)
            .iter()
            .filter(|b| b.window_day >= start)
            .map(|b| b.used.total_tokens())
            .sum();

        let history_cost = inner.state.history_cost(Scope::Global, &key_str);
        let (bucket, _) = inner.state.current_bucket(Scope::Global, &key_str, &window, now);
        let local = archived.saturating_add(bucket.used.total_tokens());

        if reported_total_tokens <= local {
            tracing::debug!(key = %key, local, reported = reported_total_tokens, "usage report not ahead of local tracking");
            if rolled {
                self.persist_locked(&mut inner);
            }
            return SyncOutcome {
                updated: false,
                drift_added: 0,
            };
        }

        let drift = reported_total_tokens - local;
        bucket.used.tokens_out = bucket.used.tokens_out.saturating_add(drift);
        bucket.last_update = now;
        if let Some(l) = self.limits.enforced(key).copied() {
            latch_hard_stop(bucket, &l, history_cost, key, Scope::Global);
        }
        tracing::info!(key = %key, local, reported = reported_total_tokens, drift, "applied usage drift from external report");
        self.persist_locked(&mut inner);

        SyncOutcome {
            updated: true,
            drift_added: drift,
        }
    }

    // ── Read-only queries ────────────────────────────────────────────

    /// Committed usage in the current window.
    pub fn current_usage(&self, key: &LaneKey, tenant_id: Option<&str>) -> Usage {
        self.with_bucket(key, tenant_id, |b, _| b.used)
    }

    /// In-flight reserved usage in the current window.
    pub fn reserved_usage(&self, key: &LaneKey, tenant_id: Option<&str>) -> Usage {
        self.with_bucket(key, tenant_id, |b, _| b.reserved)
    }

    /// Fraction of the nominal daily token limit already committed, or
    /// of the lifetime cost cap when only that is configured.
    pub fn usage_ratio(&self, key: &LaneKey, tenant_id: Option<&str>) -> Option<f64> {
        let limits = *self.limits.get(key)?;
        self.with_bucket(key, tenant_id, |b, history_cost| ratio_for(&limits, b, history_cost))
    }

    pub fn remaining_budget(&self, key: &LaneKey, tenant_id: Option<&str>) -> RemainingBudget {
        let limits = self.limits.get(key).copied();
        self.with_bucket(key, tenant_id, |b, history_cost| {
            let Some(l) = limits else {
                return RemainingBudget {
                    tokens: None,
                    cost_units: None,
                };
            };
            let tokens = l.daily_token_limit.map(|daily| {
                let buffered = (daily as f64 * self.buffer_ratio).floor() as u64;
                buffered.saturating_sub(b.committed_and_reserved_tokens())
            });
            let cost_units = l
                .lifetime_cost_limit
                .map(|cap| (cap - history_cost - b.committed_and_reserved_cost()).max(0.0));
            RemainingBudget { tokens, cost_units }
        })
    }

    /// Retired buckets for a key, oldest first.
    pub fn history(&self, key: &LaneKey, tenant_id: Option<&str>) -> Vec<Bucket> {
        let inner = self.inner.lock();
        inner
            .state
            .history(Scope::from_tenant(tenant_id), &key.to_string())
            .to_vec()
    }

    pub fn hourly(&self, key: &LaneKey, tenant_id: Option<&str>) -> HourlyLog {
        let inner = self.inner.lock();
        inner
            .state
            .hourly(Scope::from_tenant(tenant_id), &key.to_string())
            .cloned()
            .unwrap_or_default()
    }

    /// Every live bucket as of its last update, global first, then
    /// tenants in order.  Buckets left over from an earlier day are
    /// reported as-is; they reset on their next lookup.
    pub fn snapshot(&self) -> Vec<BucketStatus> {
        let inner = self.inner.lock();
        let state = &inner.state;
        let mut out = Vec::new();

        let mut push = |tenant: Option<&str>, buckets: &BTreeMap<String, Bucket>| {
            for (key_str, b) in buckets {
                let limits = key_str
                    .parse::<LaneKey>()
                    .ok()
                    .and_then(|k| self.limits.get(&k).copied());
                let history_cost = state.history_cost(Scope::from_tenant(tenant), key_str);
                out.push(BucketStatus {
                    tenant_id: tenant.map(str::to_string),
                    key: key_str.clone(),
                    window_day: b.window_day.clone(),
                    used: b.used,
                    reserved: b.reserved,
                    hard_stopped: b.hard_stopped,
                    daily_token_limit: limits.and_then(|l| l.daily_token_limit),
                    lifetime_cost_limit: limits.and_then(|l| l.lifetime_cost_limit),
                    usage_ratio: limits.and_then(|l| ratio_for(&l, b, history_cost)),
                });
            }
        };

        push(None, &state.global_buckets);
        for (tenant, buckets) in &state.user_buckets {
            push(Some(tenant.as_str()), buckets);
        }
        out
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Whether the last write failed and a rewrite is pending.
    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    /// Write the current state now, surfacing any error.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let Some(store) = &self.store else {
            return Ok(());
        };
        match store.write(&inner.state) {
            Ok(()) => {
                inner.dirty = false;
                Ok(())
            }
            Err(e) => {
                inner.dirty = true;
                Err(Error::Persistence(format!("{}: {e}", store.path().display())))
            }
        }
    }

    fn persist_locked(&self, inner: &mut Inner) {
        let Some(store) = &self.store else {
            return;
        };
        match store.write(&inner.state) {
            Ok(()) => {
                if inner.dirty {
                    tracing::info!(path = %store.path().display(), "ledger state write recovered");
                }
                inner.dirty = false;
            }
            Err(e) => {
                inner.dirty = true;
                tracing::warn!(
                    path = %store.path().display(),
                    error = %e,
                    "failed to persist ledger state; keeping in-memory state and retrying on next mutation"
                );
            }
        }
    }

    /// Run `f` on the current-window bucket (rolling it over if needed)
    /// together with the key's archived committed cost.
    fn with_bucket<T>(&self, key: &LaneKey, tenant_id: Option<&str>, f: impl FnOnce(&Bucket, f64) -> T) -> T {
        let mut inner = self.inner.lock();
        let now = self.clock.now();
        let window = Window::at(now, self.tz);
        let key_str = key.to_string();
        let scope = Scope::from_tenant(tenant_id);

        let rolled = inner.state.roll_over(scope, &key_str, &window, now);
        let history_cost = inner.state.history_cost(scope, &key_str);
        let (bucket, _) = inner.state.current_bucket(scope, &key_str, &window, now);
        let out = f(&*bucket, history_cost);
        if rolled {
            self.persist_locked(&mut inner);
        }
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A tenant-scoped operation also lands in the global bucket so the
/// shared pool sees every tenant's spend.
fn scopes_for(tenant_id: Option<&str>) -> Vec<Scope<'_>> {
    match tenant_id {
        Some(t) => vec![Scope::Tenant(t), Scope::Global],
        None => vec![Scope::Global],
    }
}

/// Latch the hard stop once committed spend reaches a nominal limit.
fn latch_hard_stop(bucket: &mut Bucket, limits: &Limits, history_cost: f64, key: &LaneKey, scope: Scope<'_>) {
    if bucket.hard_stopped {
        return;
    }
    let tokens_hit = limits
        .daily_token_limit
        .is_some_and(|d| bucket.used.total_tokens() >= d);
    let cost_hit = limits
        .lifetime_cost_limit
        .is_some_and(|cap| history_cost + bucket.used.cost_units >= cap);
    if tokens_hit || cost_hit {
        bucket.hard_stopped = true;
        let tenant = match scope {
            Scope::Tenant(t) => t,
            Scope::Global => "*",
        };
        tracing::warn!(key = %key, tenant_id = tenant, window = %bucket.window_day, "bucket hard-stopped");
    }
}

fn ratio_for(limits: &Limits, bucket: &Bucket, history_cost: f64) -> Option<f64> {
    if let Some(daily) = limits.daily_token_limit.filter(|d| *d > 0) {
        return Some(bucket.used.total_tokens() as f64 / daily as f64);
    }
    limits
        .lifetime_cost_limit
        .filter(|cap| *cap > 0.0)
        .map(|cap| (history_cost + bucket.used.cost_units) / cap)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
