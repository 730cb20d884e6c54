mod ledger;
mod limits;
mod observability;
mod routing;
mod sync;

pub use ledger::*;
pub use limits::*;
pub use observability::*;
pub use routing::*;
pub use sync::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GovernorConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub limits: Vec<LaneLimitConfig>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl GovernorConfig {
    /// Apply `LG_*` environment overrides on top of the parsed file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("LG_SAFETY_BUFFER") {
            match raw.trim().parse::<f64>() {
                Ok(v) => self.ledger.safety_buffer_ratio = v,
                Err(_) => tracing::warn!(value = %raw, "ignoring unparseable LG_SAFETY_BUFFER"),
            }
        }
        if let Some(tz) = lookup("LG_TIMEZONE").filter(|s| !s.trim().is_empty()) {
            self.ledger.timezone = tz.trim().to_string();
        }
        if let Some(path) = lookup("LG_STATE_PATH").filter(|s| !s.trim().is_empty()) {
            self.ledger.state_path = PathBuf::from(path.trim());
        }
    }

    pub fn limits_table(&self) -> LimitsTable {
        LimitsTable::from_entries(&self.limits)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl GovernorConfig {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let ratio = self.ledger.safety_buffer_ratio;
        if !ratio.is_finite() || ratio <= 0.0 || ratio > 1.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "ledger.safety_buffer_ratio".into(),
                message: format!("{ratio} is outside (0, 1]; it will be clamped"),
            });
        }

        if self.ledger.timezone.parse::<chrono_tz::Tz>().is_err() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "ledger.timezone".into(),
                message: format!("unknown timezone '{}', UTC will be used", self.ledger.timezone),
            });
        }

        for (i, entry) in self.limits.iter().enumerate() {
            if entry.lane.is_empty() || entry.provider.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("limits[{i}]"),
                    message: "lane and provider must not be empty".into(),
                });
            }
            if entry.lane.contains(':') {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("limits[{i}].lane"),
                    message: "lane names must not contain ':'".into(),
                });
            }
            if let Some(cost) = entry.lifetime_cost_limit {
                if !cost.is_finite() || cost < 0.0 {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("limits[{i}].lifetime_cost_limit"),
                        message: "must be a non-negative number".into(),
                    });
                }
            }
            if entry.daily_token_limit.is_none() && entry.lifetime_cost_limit.is_none() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("limits[{i}]"),
                    message: format!("{}:{} has no limit set", entry.lane, entry.provider),
                });
            }
        }

        let fallback = self.ledger.fallback_key();
        if self.limits_table().enforced(&fallback).is_some() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "ledger.fallback_lane".into(),
                message: format!("fallback lane {fallback} has enforced limits and may also be denied"),
            });
        }

        if self.sync.base_url.is_some() && self.sync.token().is_none() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "sync.token_env".into(),
                message: format!("{} is not set; usage sync will fail", self.sync.token_env),
            });
        }

        if self.routing.audit_capacity == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "routing.audit_capacity".into(),
                message: "must be greater than 0".into(),
            });
        }

        errors
    }
}
