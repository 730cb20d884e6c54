//! Lane selection for a resolved route.
//!
//! Each mode has a preferred lane.  If the ledger refuses it the plan
//! falls back to the ledger's cheap lane, and if that is refused too the
//! plan carries no lane at all.  It never picks a costlier lane than the
//! one the mode asked for.

use serde::Serialize;

use lg_domain::config::RoutingConfig;
use lg_domain::LaneKey;
use lg_ledger::{CallDecision, QuotaLedger, Usage};

use crate::codes;
use crate::route::{EffectiveRoute, Mode};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanePlan {
    /// Lane to dispatch to; `None` when nothing has quota left.
    pub lane: Option<LaneKey>,
    /// Lane the route's mode maps to.
    pub preferred: LaneKey,
    /// Ledger verdict on the preferred lane.
    pub decision: CallDecision,
    /// `lane_quota_fallback` or `lane_quota_exhausted` when the preferred
    /// lane was refused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<&'static str>,
}

impl LanePlan {
    pub fn is_fallback(&self) -> bool {
        self.lane.as_ref().is_some_and(|l| *l != self.preferred)
    }

    /// Append this plan's reason code to the route, if any.
    pub fn annotate(&self, route: &mut EffectiveRoute) {
        if let Some(code) = self.reason_code {
            route.append_reason_code(code);
        }
    }
}

pub fn lane_for_mode(routing: &RoutingConfig, mode: Mode) -> LaneKey {
    match mode {
        Mode::Instant => routing.instant.key(),
        Mode::Task => routing.task.key(),
        Mode::AgentLoop => routing.agent_loop.key(),
    }
}

/// Pick the lane for `route` given the current quota state.
pub fn plan_lane(
    route: &EffectiveRoute,
    routing: &RoutingConfig,
    ledger: &QuotaLedger,
    tenant_id: Option<&str>,
    estimate: &Usage,
) -> LanePlan {
    let preferred = lane_for_mode(routing, route.mode());
    let decision = ledger.can_call(&preferred, tenant_id, estimate);
    if decision.allowed {
        return LanePlan {
            lane: Some(preferred.clone()),
            preferred,
            decision,
            reason_code: None,
        };
    }

    let fallback = decision
        .fallback
        .clone()
        .unwrap_or_else(|| ledger.fallback_lane().clone());

    let lane = if fallback == preferred {
        None
    } else {
        let retry = ledger.can_call(&fallback, tenant_id, estimate);
        retry.allowed.then_some(fallback)
    };

    let reason_code = if lane.is_some() {
        codes::LANE_QUOTA_FALLBACK
    } else {
        codes::LANE_QUOTA_EXHAUSTED
    };
    tracing::info!(
        preferred = %preferred,
        fallback = ?lane.as_ref().map(ToString::to_string),
        reason = %decision.reason,
        "preferred lane refused"
    );

    LanePlan {
        lane,
        preferred,
        decision,
        reason_code: Some(reason_code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::resolve;
    use crate::signals::{RouteHint, RouteSignals};
    use lg_domain::config::{LaneLimitConfig, LedgerConfig, LimitsTable};

    fn route(score: f64) -> EffectiveRoute {
        let signals = RouteSignals {
            hint: Some(RouteHint {
                route_score: Some(score),
                ..Default::default()
            }),
            ..Default::default()
        };
        resolve(&signals, &["tool"])
    }

    fn limit(lane: &str, provider: &str, daily: u64) -> LaneLimitConfig {
        LaneLimitConfig {
            lane: lane.into(),
            provider: provider.into(),
            daily_token_limit: Some(daily),
            lifetime_cost_limit: None,
            hard_stop: true,
        }
    }

    fn ledger(entries: &[LaneLimitConfig]) -> QuotaLedger {
        QuotaLedger::in_memory(&LedgerConfig::default(), LimitsTable::from_entries(entries))
    }

    #[test]
    fn allowed_lane_is_used_directly() {
        let ledger = ledger(&[]);
        let plan = plan_lane(&route(0.5), &RoutingConfig::default(), &ledger, None, &Usage::tokens(10, 0));
        assert_eq!(plan.lane, Some(LaneKey::new("stable", "openai")));
        assert!(!plan.is_fallback());
        assert!(plan.reason_code.is_none());
    }

    #[test]
    fn exhausted_lane_falls_back_to_local() {
        let ledger = ledger(&[limit("high", "openai", 1_000)]);
        ledger.commit(&LaneKey::new("high", "openai"), None, "x", Usage::tokens(940, 0));

        let mut r = route(0.9);
        let plan = plan_lane(&r, &RoutingConfig::default(), &ledger, None, &Usage::tokens(100, 0));
        assert!(!plan.decision.allowed);
        assert_eq!(plan.lane, Some(LaneKey::new("local", "local")));
        assert!(plan.is_fallback());

        plan.annotate(&mut r);
        assert!(r.has_reason(codes::LANE_QUOTA_FALLBACK));
    }

    #[test]
    fn no_lane_when_fallback_is_exhausted_too() {
        let ledger = ledger(&[limit("stable", "openai", 100), limit("local", "local", 100)]);
        let plan = plan_lane(&route(0.5), &RoutingConfig::default(), &ledger, Some("t"), &Usage::tokens(500, 0));
        assert_eq!(plan.lane, None);
        assert_eq!(plan.reason_code, Some(codes::LANE_QUOTA_EXHAUSTED));
        assert!(plan.decision.policy_message().is_some());
    }

    #[test]
    fn refused_fallback_lane_is_not_retried() {
        let ledger = ledger(&[limit("local", "local", 10)]);
        let instant = resolve(&RouteSignals::with_route_score(0.1), &[] as &[&str]);
        let plan = plan_lane(&instant, &RoutingConfig::default(), &ledger, None, &Usage::tokens(50, 0));
        assert_eq!(plan.preferred, LaneKey::new("local", "local"));
        assert_eq!(plan.lane, None);
    }
}
