//! Work-item signals fed into [`resolve`](crate::resolve::resolve).
//!
//! Signals usually arrive as loosely-typed JSON from upstream
//! classifiers.  [`RouteSignals::from_value`] never fails: a field of
//! the wrong type is treated as absent and numbers are clamped later.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::route::{Mode, RiskLevel};

/// Partial override of the per-mode budget defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sub_ops: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_budget_seconds: Option<i64>,
}

impl BudgetHint {
    pub fn is_empty(&self) -> bool {
        self.max_turns.is_none() && self.max_sub_ops.is_none() && self.time_budget_seconds.is_none()
    }
}

/// Caller-supplied routing hint.  Its mere presence is recorded on the
/// route even when every field is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_risk_level: Option<RiskLevel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSignals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_risk_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<RouteHint>,
}

impl RouteSignals {
    /// Signals carrying only a precomputed route score.
    pub fn with_route_score(score: f64) -> Self {
        Self {
            hint: Some(RouteHint {
                route_score: Some(score),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Lenient conversion from arbitrary JSON.
    ///
    /// Accepts camelCase or snake_case field names.  `modeHint`,
    /// `budgetHint` and `routeScore` may also appear at the top level;
    /// any of them implies a hint.  Numbers may be given as strings.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            tracing::debug!("route signals are not an object; using defaults");
            return Self::default();
        };

        let mut hint = match field(obj, "hint", "hint") {
            Some(Value::Object(h)) => Some(hint_from(h)),
            Some(Value::Null) | None => None,
            Some(_) => Some(RouteHint::default()),
        };

        let top_mode = field(obj, "modeHint", "mode_hint").map(mode_of);
        let top_budget = field(obj, "budgetHint", "budget_hint").map(budget_of);
        let top_score = field(obj, "routeScore", "route_score").map(number);
        if top_mode.is_some() || top_budget.is_some() || top_score.is_some() {
            let h = hint.get_or_insert_with(RouteHint::default);
            if let Some(m) = top_mode {
                h.mode = h.mode.or(m);
            }
            if let Some(b) = top_budget {
                h.budget = h.budget.or(b);
            }
            if let Some(s) = top_score {
                h.route_score = h.route_score.or(s);
            }
        }

        Self {
            difficulty_score: field(obj, "difficultyScore", "difficulty_score").and_then(number),
            complexity_score: field(obj, "complexityScore", "complexity_score").and_then(number),
            action_score: field(obj, "actionScore", "action_score").and_then(number),
            security_risk_score: field(obj, "securityRiskScore", "security_risk_score")
                .and_then(number),
            function_category: field(obj, "functionCategory", "function_category")
                .and_then(Value::as_str)
                .map(str::to_owned),
            hint,
        }
    }
}

fn hint_from(h: &Map<String, Value>) -> RouteHint {
    RouteHint {
        mode: field(h, "mode", "mode").and_then(mode_of),
        budget: field(h, "budget", "budget").and_then(budget_of),
        route_score: field(h, "routeScore", "route_score").and_then(number),
        security_risk_level: field(h, "securityRiskLevel", "security_risk_level")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok()),
    }
}

fn field<'a>(obj: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    obj.get(camel).or_else(|| obj.get(snake))
}

fn mode_of(v: &Value) -> Option<Mode> {
    let s = v.as_str()?;
    match s.parse() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring mode hint");
            None
        }
    }
}

fn budget_of(v: &Value) -> Option<BudgetHint> {
    let obj = v.as_object()?;
    let hint = BudgetHint {
        max_turns: field(obj, "maxTurns", "max_turns").and_then(integer),
        max_sub_ops: field(obj, "maxSubOps", "max_sub_ops").and_then(integer),
        time_budget_seconds: field(obj, "timeBudgetSeconds", "time_budget_seconds")
            .and_then(integer),
    };
    (!hint.is_empty()).then_some(hint)
}

/// A finite number, or a string holding one.
fn number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64),
        _ => None,
    }
}
