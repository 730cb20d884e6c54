//! Route resolution.
//!
//! Pure and synchronous: the same signals always yield the same route.
//! Malformed or missing input degrades to defaults; this never fails.

use crate::codes;
use crate::route::{EffectiveRoute, ExecutionBudget, Mode, ReasonCodes, RiskLevel, RouteScores};
use crate::signals::{BudgetHint, RouteSignals};

const DEFAULT_DIFFICULTY: f64 = 0.5;
const DEFAULT_RISK: f64 = 0.0;
const DEFAULT_CATEGORY: &str = "chat";

const COMPLEXITY_WEIGHT: f64 = 0.45;
const RISK_WEIGHT: f64 = 0.35;
const ACTION_WEIGHT: f64 = 0.20;

const VISION_FLOOR: f64 = 0.35;
const SAFE_RISK_SCORE: f64 = 0.6;

/// Resolve a work item's signals into an [`EffectiveRoute`].
///
/// `selected_sub_ops` lists the tools the caller has already picked for
/// this work item; only whether it is empty matters.
///
/// Steps, in order:
/// 1. Route score: supplied by the hint, else the weighted sum.
/// 2. Vision floor.
/// 3. Mode: the hint's mode unless the floor fired, else by threshold.
/// 4. Budget defaults for the mode, hint overrides, hard clamps.
/// 5. Elevated risk forces `Instant`/`AgentLoop` down to `Task`.
/// 6. Selected tools force `Instant` up to `Task`.
/// 7. No tool slots for `Instant` or when nothing was selected.
/// 8. Scores rounded to two decimals.
pub fn resolve<S: AsRef<str>>(signals: &RouteSignals, selected_sub_ops: &[S]) -> EffectiveRoute {
    let mut reasons = ReasonCodes::default();
    let hint = signals.hint.as_ref();
    let has_tools = !selected_sub_ops.is_empty();

    let difficulty = unit(signals.difficulty_score).unwrap_or(DEFAULT_DIFFICULTY);
    let complexity = unit(signals.complexity_score).unwrap_or(difficulty);
    let action = unit(signals.action_score).unwrap_or(difficulty);
    let security_risk = unit(signals.security_risk_score).unwrap_or(DEFAULT_RISK);
    let category = normalize_category(signals.function_category.as_deref());

    // 1. Route score.
    let mut route_score = match unit(hint.and_then(|h| h.route_score)) {
        Some(supplied) => supplied,
        None => snap(
            complexity * COMPLEXITY_WEIGHT + security_risk * RISK_WEIGHT + action * ACTION_WEIGHT,
        ),
    };

    // 2. Vision floor.
    let floor_applied = category == "vision" && route_score < VISION_FLOOR;
    if floor_applied {
        route_score = VISION_FLOOR;
        reasons.push(codes::VISION_FLOOR_APPLIED);
    }

    // 3. Mode.
    let mut mode = match hint.and_then(|h| h.mode) {
        Some(hinted) if !floor_applied => hinted,
        _ => Mode::for_score(route_score),
    };

    // 4. Budget.
    let mut budget = budget_with_hint(mode, hint.and_then(|h| h.budget), &mut reasons);

    // 5. Risk downgrade.
    let derived_level = RiskLevel::from_score(security_risk);
    let risk_level = match hint.and_then(|h| h.security_risk_level) {
        Some(supplied) => supplied.max(derived_level),
        None => derived_level,
    };
    let elevated = security_risk >= SAFE_RISK_SCORE || risk_level.is_elevated();
    if elevated && matches!(mode, Mode::Instant | Mode::AgentLoop) {
        tracing::debug!(from = %mode, risk = security_risk, "elevated risk, forcing Task");
        mode = Mode::Task;
        budget = ExecutionBudget::default_for(mode);
        reasons.push(codes::MODE_FORCED_SAFE);
    }

    // 6. Tool-presence upgrade.
    if has_tools && mode == Mode::Instant {
        mode = Mode::Task;
        budget = ExecutionBudget::default_for(mode);
        reasons.push(codes::MODE_FORCED_TOOLS);
    }

    // 7. Tool slots must be usable.
    if (mode == Mode::Instant || !has_tools) && budget.max_sub_ops > 0 {
        budget.max_sub_ops = 0;
        reasons.push(codes::TOOL_SLOTS_REMOVED);
    }

    // 8. Output.
    let route = EffectiveRoute {
        mode,
        function_category: category,
        route_score: round2(route_score),
        scores: RouteScores {
            difficulty: round2(difficulty),
            complexity: round2(complexity),
            action: round2(action),
            security_risk: round2(security_risk),
        },
        security_risk_level: risk_level,
        budget,
        reason_codes: reasons,
        source_hint_present: hint.is_some(),
    };

    tracing::debug!(
        mode = %route.mode,
        route_score = route.route_score,
        max_turns = route.budget.max_turns,
        max_sub_ops = route.budget.max_sub_ops,
        time_budget_seconds = route.budget.time_budget_seconds,
        reasons = ?route.reason_codes(),
        "route resolved"
    );
    route
}

// ── budget ──

fn budget_with_hint(mode: Mode, hint: Option<BudgetHint>, reasons: &mut ReasonCodes) -> ExecutionBudget {
    let mut budget = ExecutionBudget::default_for(mode);
    let Some(hint) = hint.filter(|h| !h.is_empty()) else {
        return budget;
    };
    reasons.push(codes::BUDGET_HINT_APPLIED);

    let mut clamped = false;
    let mut apply = |slot: &mut u32, value: Option<i64>, (lo, hi): (u32, u32)| {
        if let Some(v) = value {
            let bounded = v.clamp(i64::from(lo), i64::from(hi));
            clamped |= bounded != v;
            // Within u32 range after the clamp above.
            *slot = bounded as u32;
        }
    };
    apply(&mut budget.max_turns, hint.max_turns, ExecutionBudget::TURNS);
    apply(&mut budget.max_sub_ops, hint.max_sub_ops, ExecutionBudget::SUB_OPS);
    apply(
        &mut budget.time_budget_seconds,
        hint.time_budget_seconds,
        ExecutionBudget::TIME_SECONDS,
    );
    if clamped {
        reasons.push(codes::BUDGET_CLAMPED);
    }
    budget
}

// ── normalisation ──

/// Clamp a present, finite score into `[0, 1]`.
fn unit(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite()).map(|v| v.clamp(0.0, 1.0))
}

fn normalize_category(raw: Option<&str>) -> String {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.to_lowercase(),
        None => DEFAULT_CATEGORY.to_owned(),
    }
}

/// Drop floating-point noise from the weighted sum so scores that are
/// exactly on a threshold classify as such.
fn snap(v: f64) -> f64 {
    (v * 1e9).round() / 1e9
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
