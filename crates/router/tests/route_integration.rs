//! End-to-end routing: JSON signals in, bounded route out, then lane
//! planning against a live ledger and an audit record of the result.

use lg_domain::config::{LaneLimitConfig, LedgerConfig, LimitsTable, RoutingConfig};
use lg_domain::LaneKey;
use lg_ledger::{QuotaLedger, Usage};
use lg_router::codes;
use lg_router::{plan_lane, resolve, BudgetGuard, ExecutionBudget, Mode, RouteAuditLog, RouteSignals};
use serde_json::json;

const NO_TOOLS: &[&str] = &[];

fn signals(v: serde_json::Value) -> RouteSignals {
    RouteSignals::from_value(&v)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolution scenarios
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn low_score_resolves_instant() {
    let route = resolve(&signals(json!({"routeScore": 0.20})), NO_TOOLS);
    assert_eq!(route.mode(), Mode::Instant);
    assert_eq!(*route.budget(), ExecutionBudget::new(2, 0, 25));
    assert!(route.reason_codes().is_empty());
    assert!(route.source_hint_present());
}

#[test]
fn mid_score_resolves_task() {
    let route = resolve(&signals(json!({"routeScore": 0.50})), &["web_search"]);
    assert_eq!(route.mode(), Mode::Task);
    assert_eq!(*route.budget(), ExecutionBudget::new(5, 5, 120));
}

#[test]
fn risky_agent_loop_is_forced_down_to_task() {
    let route = resolve(
        &signals(json!({"routeScore": 0.90, "securityRiskScore": 0.8})),
        &["shell"],
    );
    assert_eq!(route.mode(), Mode::Task);
    assert_eq!(*route.budget(), ExecutionBudget::new(5, 5, 120));
    assert!(route.has_reason(codes::MODE_FORCED_SAFE));
}

#[test]
fn vision_floor_overrides_mode_hint() {
    let route = resolve(
        &signals(json!({
            "functionCategory": "vision",
            "routeScore": 0.10,
            "modeHint": "Instant"
        })),
        NO_TOOLS,
    );
    assert_eq!(route.route_score(), 0.35);
    assert_eq!(route.mode(), Mode::Task);
    assert!(route.has_reason(codes::VISION_FLOOR_APPLIED));
}

#[test]
fn boundary_scores_pick_cheaper_mode() {
    let at_030 = resolve(&signals(json!({"routeScore": 0.30})), NO_TOOLS);
    let at_060 = resolve(&signals(json!({"routeScore": 0.60})), NO_TOOLS);
    assert_eq!(at_030.mode(), Mode::Instant);
    assert_eq!(at_060.mode(), Mode::Task);
}

#[test]
fn garbage_signals_never_fail() {
    let route = resolve(
        &signals(json!({
            "difficultyScore": {"nested": true},
            "complexityScore": "NaN",
            "securityRiskScore": 42,
            "functionCategory": null,
            "hint": {"mode": 7, "budget": {"maxTurns": -5, "timeBudgetSeconds": 1e12}}
        })),
        NO_TOOLS,
    );
    // Risk clamps to 1.0, which always forces Task.
    assert_eq!(route.mode(), Mode::Task);
    assert_eq!(route.scores().security_risk, 1.0);
    assert_eq!(route.function_category(), "chat");
    assert!(route.source_hint_present());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Invariants over a grid of inputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn budgets_stay_in_bounds_and_tool_slots_are_consistent() {
    let scores = [0.0, 0.15, 0.3, 0.45, 0.6, 0.75, 1.0];
    let hints = [
        json!(null),
        json!({"maxTurns": 100, "maxSubOps": 100, "timeBudgetSeconds": 100000}),
        json!({"maxTurns": 0, "maxSubOps": -1, "timeBudgetSeconds": 0}),
    ];
    for &score in &scores {
        for &risk in &scores {
            for budget in &hints {
                for tools in [NO_TOOLS, &["t"][..]] {
                    let route = resolve(
                        &signals(json!({
                            "routeScore": score,
                            "securityRiskScore": risk,
                            "budgetHint": budget,
                        })),
                        tools,
                    );
                    let b = route.budget();
                    assert!((1..=20).contains(&b.max_turns));
                    assert!(b.max_sub_ops <= 20);
                    assert!((10..=1800).contains(&b.time_budget_seconds));
                    if route.mode() == Mode::Instant || tools.is_empty() {
                        assert_eq!(b.max_sub_ops, 0);
                    }
                    if !tools.is_empty() {
                        assert_ne!(route.mode(), Mode::Instant);
                    }
                    if risk >= 0.6 {
                        assert_eq!(route.mode(), Mode::Task);
                    }
                    let mut seen = std::collections::HashSet::new();
                    assert!(route.reason_codes().iter().all(|c| seen.insert(c)));
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Full work-item flow
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn work_item_flow_falls_back_and_is_audited() {
    let ledger = QuotaLedger::in_memory(
        &LedgerConfig::default(),
        LimitsTable::from_entries(&[LaneLimitConfig {
            lane: "high".into(),
            provider: "openai".into(),
            daily_token_limit: Some(1_000),
            lifetime_cost_limit: None,
            hard_stop: true,
        }]),
    );
    let high = LaneKey::new("high", "openai");
    let id = QuotaLedger::new_reservation_id();
    ledger.reserve(&high, Some("acme"), &id, Usage::tokens(900, 0));
    ledger.commit(&high, Some("acme"), &id, Usage::tokens(800, 200));

    let routing = RoutingConfig::default();
    let mut route = resolve(&signals(json!({"routeScore": 0.8})), &["browser"]);
    assert_eq!(route.mode(), Mode::AgentLoop);

    let plan = plan_lane(&route, &routing, &ledger, Some("acme"), &Usage::tokens(50, 50));
    assert_eq!(plan.preferred, high);
    assert_eq!(plan.lane, Some(LaneKey::new("local", "local")));
    plan.annotate(&mut route);

    let mut guard = BudgetGuard::new(&route);
    for _ in 0..route.budget().max_turns {
        guard.begin_turn().unwrap();
    }
    let breach = guard.begin_turn().unwrap_err();
    BudgetGuard::abort(&mut route, breach);

    let dir = tempfile::tempdir().unwrap();
    let audit = RouteAuditLog::new(8).with_persist_path(dir.path().join("routes.jsonl"));
    let record = audit.record("item-1", &route, plan.lane.as_ref().map(ToString::to_string));

    assert_eq!(
        record.route.reason_codes(),
        [codes::LANE_QUOTA_FALLBACK, codes::BUDGET_TURNS_EXCEEDED]
    );
    assert_eq!(record.lane.as_deref(), Some("local:local"));
    assert_eq!(audit.get("item-1").unwrap(), record);
}
