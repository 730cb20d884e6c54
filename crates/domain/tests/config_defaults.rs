use lg_domain::config::{ConfigSeverity, GovernorConfig, LogFormat};
use lg_domain::LaneKey;

#[test]
fn default_state_path_is_under_data() {
    let config = GovernorConfig::default();
    assert_eq!(config.ledger.state_path, std::path::PathBuf::from("./data/ledger.json"));
    assert_eq!(config.ledger.fallback_key(), LaneKey::new("local", "local"));
}

#[test]
fn default_routing_lanes() {
    let config = GovernorConfig::default();
    assert_eq!(config.routing.instant.key(), LaneKey::new("local", "local"));
    assert_eq!(config.routing.task.key(), LaneKey::new("stable", "openai"));
    assert_eq!(config.routing.agent_loop.key(), LaneKey::new("high", "openai"));
    assert_eq!(config.routing.audit_capacity, 500);
    assert!(config.routing.audit_path.is_none());
}

#[test]
fn partial_sections_keep_other_defaults() {
    let toml_str = r#"
[ledger]
timezone = "Europe/Berlin"

[sync]
base_url = "https://usage.example.com/v1/usage"
lookback_days = 3
"#;
    let config: GovernorConfig = toml::from_str(toml_str).unwrap();
    assert_eq!(config.ledger.timezone, "Europe/Berlin");
    assert_eq!(config.ledger.safety_buffer_ratio, 0.95);
    assert_eq!(config.sync.lookback_days, 3);
    assert_eq!(config.sync.token_env, "LG_USAGE_TOKEN");
    assert_eq!(config.observability.log_format, LogFormat::Json);
}

#[test]
fn zero_audit_capacity_is_an_error() {
    let toml_str = r#"
[routing]
audit_capacity = 0
"#;
    let config: GovernorConfig = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|e| e.field == "routing.audit_capacity" && e.severity == ConfigSeverity::Error));
}

#[test]
fn enforced_fallback_lane_is_warned() {
    let toml_str = r#"
[[limits]]
lane = "local"
provider = "local"
daily_token_limit = 1000
"#;
    let config: GovernorConfig = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, ConfigSeverity::Warning);
    assert_eq!(issues[0].field, "ledger.fallback_lane");
}
