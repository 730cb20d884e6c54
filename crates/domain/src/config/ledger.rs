use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::lane::LaneKey;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Quota ledger
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Quota ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON state file, atomically rewritten on every mutation.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,

    /// IANA timezone whose calendar day defines the quota window
    /// (e.g. `"Asia/Seoul"`).  Unknown names fall back to UTC.
    #[serde(default = "d_timezone")]
    pub timezone: String,

    /// Fraction of a nominal daily limit that may actually be spent.
    /// Keeps headroom below the provider-side cap.
    #[serde(default = "d_buffer")]
    pub safety_buffer_ratio: f64,

    /// Lane suggested to callers when a quota check denies a call.
    #[serde(default = "d_local")]
    pub fallback_lane: String,
    #[serde(default = "d_local")]
    pub fallback_provider: String,

    /// How long hourly observability entries are kept.
    #[serde(default = "d_168")]
    pub hourly_retention_hours: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            timezone: d_timezone(),
            safety_buffer_ratio: d_buffer(),
            fallback_lane: d_local(),
            fallback_provider: d_local(),
            hourly_retention_hours: d_168(),
        }
    }
}

impl LedgerConfig {
    /// Parse the configured timezone, falling back to UTC.
    pub fn tz(&self) -> chrono_tz::Tz {
        match self.timezone.parse::<chrono_tz::Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!(timezone = %self.timezone, "unknown ledger timezone, using UTC");
                chrono_tz::UTC
            }
        }
    }

    /// The safety buffer clamped into `(0, 1]`.  Non-finite or
    /// non-positive values fall back to the default.
    pub fn buffer_ratio(&self) -> f64 {
        let r = self.safety_buffer_ratio;
        if !r.is_finite() || r <= 0.0 {
            d_buffer()
        } else {
            r.min(1.0)
        }
    }

    pub fn fallback_key(&self) -> LaneKey {
        LaneKey::new(self.fallback_lane.clone(), self.fallback_provider.clone())
    }
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./data/ledger.json")
}

fn d_timezone() -> String {
    "UTC".into()
}

fn d_buffer() -> f64 {
    0.95
}

fn d_local() -> String {
    "local".into()
}

fn d_168() -> u32 {
    168
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_ratio_is_clamped() {
        let mut cfg = LedgerConfig::default();
        assert_eq!(cfg.buffer_ratio(), 0.95);

        cfg.safety_buffer_ratio = 1.7;
        assert_eq!(cfg.buffer_ratio(), 1.0);

        cfg.safety_buffer_ratio = -0.2;
        assert_eq!(cfg.buffer_ratio(), 0.95);

        cfg.safety_buffer_ratio = f64::NAN;
        assert_eq!(cfg.buffer_ratio(), 0.95);
    }

    #[test]
    fn invalid_timezone_falls_back_to_utc() {
        let cfg = LedgerConfig {
            timezone: "Mars/Olympus".into(),
            ..Default::default()
        };
        assert_eq!(cfg.tz(), chrono_tz::UTC);

        let cfg = LedgerConfig {
            timezone: "Asia/Seoul".into(),
            ..Default::default()
        };
        assert_eq!(cfg.tz(), chrono_tz::Asia::Seoul);
    }
}
