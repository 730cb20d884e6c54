use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::lane::LaneKey;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-lane limits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One `[[limits]]` entry in the config file.
///
/// Both limits are optional; when `None` the corresponding dimension is
/// uncapped.  Entries with `hard_stop = false` are informational and
/// never block a call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneLimitConfig {
    pub lane: String,
    pub provider: String,
    /// Daily token limit (input + output).  `None` = uncapped.
    #[serde(default)]
    pub daily_token_limit: Option<u64>,
    /// Cumulative cost limit across all windows.  `None` = uncapped.
    #[serde(default)]
    pub lifetime_cost_limit: Option<f64>,
    #[serde(default = "d_true")]
    pub hard_stop: bool,
}

/// Resolved limits for one `(lane, provider)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Limits {
    pub daily_token_limit: Option<u64>,
    pub lifetime_cost_limit: Option<f64>,
    pub hard_stop: bool,
}

/// Immutable lookup table built once from the config entries.
#[derive(Debug, Clone, Default)]
pub struct LimitsTable {
    by_key: HashMap<LaneKey, Limits>,
}

impl LimitsTable {
    pub fn from_entries(entries: &[LaneLimitConfig]) -> Self {
        let mut by_key = HashMap::new();
        for e in entries {
            let key = LaneKey::new(e.lane.clone(), e.provider.clone());
            let limits = Limits {
                daily_token_limit: e.daily_token_limit,
                lifetime_cost_limit: e.lifetime_cost_limit,
                hard_stop: e.hard_stop,
            };
            if by_key.insert(key.clone(), limits).is_some() {
                tracing::warn!(key = %key, "duplicate limits entry, last one wins");
            }
        }
        Self { by_key }
    }

    pub fn get(&self, key: &LaneKey) -> Option<&Limits> {
        self.by_key.get(key)
    }

    /// Limits that actually block calls: present and `hard_stop = true`.
    pub fn enforced(&self, key: &LaneKey) -> Option<&Limits> {
        self.by_key.get(key).filter(|l| l.hard_stop)
    }
}

fn d_true() -> bool {
    true
}
