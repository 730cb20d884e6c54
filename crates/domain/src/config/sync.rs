use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lane::LaneKey;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// External usage reconciliation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where to fetch the provider's authoritative usage report from, and
/// which global bucket it reconciles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Usage report endpoint.  `None` disables reconciliation.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the bearer token.
    #[serde(default = "d_token_env")]
    pub token_env: String,
    #[serde(default = "d_lane")]
    pub lane: String,
    #[serde(default = "d_provider")]
    pub provider: String,
    /// Days before today (in the ledger timezone) included in the report.
    #[serde(default)]
    pub lookback_days: u32,
    #[serde(default = "d_10000")]
    pub timeout_ms: u64,
    /// Committed token count at or above which a reconciliation is
    /// triggered right after the commit.
    #[serde(default = "d_50000")]
    pub large_commit_tokens: u64,
    /// Seconds between background reconciliations (`laneguard sync --watch`).
    #[serde(default = "d_300")]
    pub interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token_env: d_token_env(),
            lane: d_lane(),
            provider: d_provider(),
            lookback_days: 0,
            timeout_ms: d_10000(),
            large_commit_tokens: d_50000(),
            interval_secs: d_300(),
        }
    }
}

impl SyncConfig {
    pub fn key(&self) -> LaneKey {
        LaneKey::new(self.lane.clone(), self.provider.clone())
    }

    /// Background reconciliation period, never shorter than one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Read the bearer token from the configured env var.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }
}

fn d_token_env() -> String {
    "LG_USAGE_TOKEN".into()
}

fn d_lane() -> String {
    "stable".into()
}

fn d_provider() -> String {
    "openai".into()
}

fn d_10000() -> u64 {
    10_000
}

fn d_50000() -> u64 {
    50_000
}

fn d_300() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_clamped_to_one_second() {
        let cfg: SyncConfig = toml::from_str("interval_secs = 0").unwrap();
        assert_eq!(cfg.interval(), Duration::from_secs(1));
        assert_eq!(SyncConfig::default().interval(), Duration::from_secs(300));
    }
}
