//! Commands run against a temp state file.

use lg_cli::cli::route::RouteArgs;
use lg_cli::cli::{route, status, unlimited, Toggle};
use lg_domain::config::GovernorConfig;
use lg_ledger::QuotaLedger;

fn config_in(dir: &std::path::Path) -> GovernorConfig {
    let mut cfg = GovernorConfig::default();
    cfg.ledger.state_path = dir.join("ledger.json");
    cfg.routing.audit_path = Some(dir.join("routes.jsonl"));
    cfg
}

#[test]
fn unlimited_toggle_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());

    unlimited::run(&cfg, Toggle::On, Some("acme")).unwrap();
    {
        let ledger = QuotaLedger::open(&cfg.ledger, cfg.limits_table()).unwrap();
        assert!(ledger.is_unlimited(Some("acme")));
        assert!(!ledger.is_unlimited(None));
    }

    unlimited::run(&cfg, Toggle::Off, Some("acme")).unwrap();
    let ledger = QuotaLedger::open(&cfg.ledger, cfg.limits_table()).unwrap();
    assert!(!ledger.is_unlimited(Some("acme")));
}

#[test]
fn route_appends_audit_line() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());

    route::run(
        &cfg,
        RouteArgs {
            signals: Some(r#"{"routeScore": 0.8}"#.into()),
            tools: vec!["browser".into()],
            work_item: Some("wi-1".into()),
            tenant: None,
            estimate_tokens: 100,
        },
    )
    .unwrap();

    let raw = std::fs::read_to_string(dir.path().join("routes.jsonl")).unwrap();
    let line: serde_json::Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
    assert_eq!(line["workItemId"], "wi-1");
    assert_eq!(line["route"]["mode"], "AgentLoop");
    assert_eq!(line["lane"], "high:openai");
}

#[test]
fn status_runs_on_empty_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());
    status::run(&cfg, None, true).unwrap();
    status::run(&cfg, Some("acme"), false).unwrap();
}
