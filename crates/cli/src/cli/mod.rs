pub mod config;
pub mod route;
pub mod status;
pub mod sync;
pub mod unlimited;

use std::path::Path;

use clap::{Parser, Subcommand, ValueEnum};
use lg_domain::config::GovernorConfig;

/// laneguard: quota ledger and route governor.
#[derive(Debug, Parser)]
#[command(name = "laneguard", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show today's usage, reservations and limits per bucket.
    Status {
        /// Only show buckets for this tenant.
        #[arg(long)]
        tenant: Option<String>,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Switch unlimited mode on or off, globally or for one tenant.
    Unlimited {
        #[arg(value_enum)]
        state: Toggle,
        /// Exempt (or un-exempt) a single tenant instead of everyone.
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Resolve a route for one work item and record it for audit.
    Route {
        /// Signals JSON.  Read from stdin when omitted.
        #[arg(long)]
        signals: Option<String>,
        /// Sub-operation (tool) selected for the work item.  Repeatable.
        #[arg(long = "tool")]
        tools: Vec<String>,
        /// Work item id for the audit record (random when omitted).
        #[arg(long)]
        work_item: Option<String>,
        /// Tenant whose quota the lane plan is checked against.
        #[arg(long)]
        tenant: Option<String>,
        /// Estimated tokens for the lane plan's quota check.
        #[arg(long, default_value_t = 0)]
        estimate_tokens: u64,
    },
    /// Reconcile the configured lane against the provider's usage report.
    Sync {
        /// Keep reconciling every `[sync] interval_secs` until Ctrl-C.
        #[arg(long)]
        watch: bool,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Toggle::On
    }
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from `LG_CONFIG` (or `laneguard.toml`), then
/// apply `LG_*` environment overrides.  Returns the config and the path
/// that was used.
pub fn load_config() -> anyhow::Result<(GovernorConfig, String)> {
    let config_path = std::env::var("LG_CONFIG").unwrap_or_else(|_| "laneguard.toml".into());
    let mut config = load_config_from(Path::new(&config_path))?;
    config.apply_env_overrides();
    Ok((config, config_path))
}

/// Parse a config file.  A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> anyhow::Result<GovernorConfig> {
    if !path.exists() {
        return Ok(GovernorConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert!(cfg.limits.is_empty());
        assert_eq!(cfg.ledger.timezone, "UTC");
    }

    #[test]
    fn parses_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("laneguard.toml");
        std::fs::write(
            &path,
            r#"
[ledger]
timezone = "Asia/Seoul"
safety_buffer_ratio = 0.9

[[limits]]
lane = "stable"
provider = "openai"
daily_token_limit = 200000

[[limits]]
lane = "high"
provider = "openai"
lifetime_cost_limit = 50.0
hard_stop = false

[routing.agent_loop]
lane = "burn"
provider = "anthropic"

[observability]
log_format = "pretty"
"#,
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.ledger.timezone, "Asia/Seoul");
        assert_eq!(cfg.limits.len(), 2);
        assert!(!cfg.limits[1].hard_stop);
        assert_eq!(cfg.routing.agent_loop.lane, "burn");
        assert_eq!(cfg.routing.task.lane, "stable");
    }

    #[test]
    fn bad_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[ledger\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("parsing"));
    }

    #[test]
    fn cli_parses_route_with_tools() {
        let cli = Cli::parse_from([
            "laneguard", "route", "--signals", "{}", "--tool", "a", "--tool", "b",
        ]);
        match cli.command {
            Command::Route { tools, signals, .. } => {
                assert_eq!(tools, ["a", "b"]);
                assert_eq!(signals.as_deref(), Some("{}"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cli_parses_sync_watch() {
        let cli = Cli::parse_from(["laneguard", "sync", "--watch"]);
        assert!(matches!(cli.command, Command::Sync { watch: true }));
        let cli = Cli::parse_from(["laneguard", "sync"]);
        assert!(matches!(cli.command, Command::Sync { watch: false }));
    }

    #[test]
    fn cli_parses_unlimited_toggle() {
        let cli = Cli::parse_from(["laneguard", "unlimited", "on", "--tenant", "acme"]);
        match cli.command {
            Command::Unlimited { state, tenant } => {
                assert!(state.enabled());
                assert_eq!(tenant.as_deref(), Some("acme"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
