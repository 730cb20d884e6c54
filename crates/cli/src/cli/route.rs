use std::io::Read;

use lg_domain::config::GovernorConfig;
use lg_ledger::{QuotaLedger, Usage};
use lg_router::{plan_lane, resolve, LanePlan, RouteAuditLog, RouteAuditRecord, RouteSignals};
use serde::Serialize;

pub struct RouteArgs {
    pub signals: Option<String>,
    pub tools: Vec<String>,
    pub work_item: Option<String>,
    pub tenant: Option<String>,
    pub estimate_tokens: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteOutput {
    #[serde(flatten)]
    record: RouteAuditRecord,
    plan: LanePlan,
}

pub fn run(config: &GovernorConfig, args: RouteArgs) -> anyhow::Result<()> {
    let raw = match args.signals {
        Some(s) => s,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let signals = parse_signals(&raw);
    let mut route = resolve(&signals, args.tools.as_slice());

    let ledger = QuotaLedger::open(&config.ledger, config.limits_table())?;
    let estimate = Usage::tokens(args.estimate_tokens, 0);
    let plan = plan_lane(&route, &config.routing, &ledger, args.tenant.as_deref(), &estimate);
    plan.annotate(&mut route);

    let work_item = args.work_item.unwrap_or_else(QuotaLedger::new_reservation_id);
    let audit = RouteAuditLog::from_config(&config.routing);
    let record = audit.record(&work_item, &route, plan.lane.as_ref().map(ToString::to_string));

    println!("{}", serde_json::to_string_pretty(&RouteOutput { record, plan })?);
    Ok(())
}

/// Signals from raw text.  Unparseable input routes with defaults.
pub fn parse_signals(raw: &str) -> RouteSignals {
    if raw.trim().is_empty() {
        return RouteSignals::default();
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(v) => RouteSignals::from_value(&v),
        Err(e) => {
            tracing::warn!(error = %e, "signals are not valid JSON; routing with defaults");
            RouteSignals::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_invalid_input_use_defaults() {
        assert_eq!(parse_signals(""), RouteSignals::default());
        assert_eq!(parse_signals("{not json"), RouteSignals::default());
    }

    #[test]
    fn json_input_is_coerced() {
        let s = parse_signals(r#"{"routeScore": "0.4", "functionCategory": "code"}"#);
        assert_eq!(s.hint.and_then(|h| h.route_score), Some(0.4));
        assert_eq!(s.function_category.as_deref(), Some("code"));
    }
}
