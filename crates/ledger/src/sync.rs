//! Drift reconciliation against a provider's authoritative usage report.
//!
//! The network fetch happens without the ledger lock; only the final
//! compare-and-correct ([`QuotaLedger::apply_external_total`]) locks.
//! A failed fetch leaves local accounting untouched.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;

use lg_domain::config::SyncConfig;
use lg_domain::error::{Error, Result};
use lg_domain::LaneKey;

use crate::ledger::{QuotaLedger, SyncOutcome};
use crate::usage::Usage;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reporter trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Source of the aggregate token total for a date range.
#[async_trait]
pub trait UsageReporter: Send + Sync {
    /// Total tokens reported for `key` over `[start, end]` inclusive.
    async fn total_tokens(&self, key: &LaneKey, start: NaiveDate, end: NaiveDate) -> Result<u64>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP reporter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fetches `GET {base_url}?start_date=..&end_date=..` with a bearer
/// token and sums the per-day rows.
#[derive(Debug, Clone)]
pub struct HttpUsageReporter {
    http: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct UsageReport {
    #[serde(default)]
    data: Vec<DailyRow>,
}

/// One day of usage.  Accepts either a precomputed total or separate
/// input/output counts.
#[derive(Debug, Deserialize)]
struct DailyRow {
    #[serde(default)]
    total_tokens: Option<u64>,
    #[serde(default, alias = "n_context_tokens_total")]
    input_tokens: u64,
    #[serde(default, alias = "n_generated_tokens_total")]
    output_tokens: u64,
}

impl DailyRow {
    fn tokens(&self) -> u64 {
        self.total_tokens
            .unwrap_or_else(|| self.input_tokens.saturating_add(self.output_tokens))
    }
}

impl HttpUsageReporter {
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token,
        })
    }

    /// Build from the `[sync]` section.  `Ok(None)` when sync is not
    /// configured.
    pub fn from_config(cfg: &SyncConfig) -> Result<Option<Self>> {
        let Some(base_url) = cfg.base_url.as_deref() else {
            return Ok(None);
        };
        let token = cfg
            .token()
            .ok_or_else(|| Error::Config(format!("{} is not set", cfg.token_env)))?;
        Self::new(base_url, token, Duration::from_millis(cfg.timeout_ms)).map(Some)
    }
}

#[async_trait]
impl UsageReporter for HttpUsageReporter {
    async fn total_tokens(&self, key: &LaneKey, start: NaiveDate, end: NaiveDate) -> Result<u64> {
        let sync_err = |message: String| Error::Sync {
            key: key.to_string(),
            message,
        };

        let start_s = start.format("%Y-%m-%d").to_string();
        let end_s = end.format("%Y-%m-%d").to_string();
        let resp = self
            .http
            .get(&self.base_url)
            .bearer_auth(&self.token)
            .query(&[
                ("start_date", start_s.as_str()),
                ("end_date", end_s.as_str()),
                ("lane", key.lane.as_str()),
                ("provider", key.provider.as_str()),
            ])
            .send()
            .await
            .map_err(|e| sync_err(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(sync_err(format!("HTTP {status}: {}", truncate(&body, 200))));
        }

        let report: UsageReport = resp
            .json()
            .await
            .map_err(|e| sync_err(format!("unreadable usage report: {e}")))?;
        Ok(sum_rows(&report.data))
    }
}

fn sum_rows(rows: &[DailyRow]) -> u64 {
    rows.iter().fold(0u64, |acc, r| acc.saturating_add(r.tokens()))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sync driver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Reconcile one global bucket: fetch the report (unlocked), then
/// ratchet local tracking up to it (locked).
pub async fn sync_external_usage(
    ledger: &QuotaLedger,
    reporter: &dyn UsageReporter,
    key: &LaneKey,
    lookback_days: u32,
) -> Result<SyncOutcome> {
    let (start, end) = ledger.report_range(lookback_days);
    let reported = match reporter.total_tokens(key, start, end).await {
        Ok(total) => total,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "usage sync failed; local accounting unchanged");
            return Err(e);
        }
    };
    Ok(ledger.apply_external_total(key, start, reported))
}

/// Periodic and opportunistic reconciliation for the configured bucket.
pub struct UsageSync {
    ledger: Arc<QuotaLedger>,
    reporter: Arc<dyn UsageReporter>,
    key: LaneKey,
    lookback_days: u32,
    large_commit_tokens: u64,
    interval: Duration,
}

impl UsageSync {
    pub fn new(ledger: Arc<QuotaLedger>, reporter: Arc<dyn UsageReporter>, cfg: &SyncConfig) -> Self {
        Self {
            ledger,
            reporter,
            key: cfg.key(),
            lookback_days: cfg.lookback_days,
            large_commit_tokens: cfg.large_commit_tokens,
            interval: cfg.interval(),
        }
    }

    pub fn key(&self) -> &LaneKey {
        &self.key
    }

    pub async fn run_once(&self) -> Result<SyncOutcome> {
        sync_external_usage(&self.ledger, self.reporter.as_ref(), &self.key, self.lookback_days).await
    }

    /// Reconcile right after a large commit on the synced lane.  Returns
    /// `None` when the commit does not qualify.
    pub async fn after_commit(&self, key: &LaneKey, actual: &Usage) -> Option<Result<SyncOutcome>> {
        if *key != self.key || actual.total_tokens() < self.large_commit_tokens {
            return None;
        }
        tracing::debug!(key = %key, tokens = actual.total_tokens(), "large commit, reconciling usage");
        Some(self.run_once().await)
    }

    /// Reconcile every `[sync] interval_secs` until the task is aborted.
    /// The first pass runs immediately.
    pub fn spawn_periodic(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Ok(outcome) = self.run_once().await {
                    if outcome.updated {
                        tracing::info!(key = %self.key, drift = outcome.drift_added, "periodic usage sync corrected drift");
                    }
                }
            }
        })
    }
}
