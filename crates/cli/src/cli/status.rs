use std::fmt::Write as _;

use lg_domain::config::GovernorConfig;
use lg_ledger::{BucketStatus, QuotaLedger};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport<'a> {
    timezone: String,
    unlimited_mode: bool,
    unlimited_tenants: Vec<String>,
    orphaned_commits: u64,
    buckets: &'a [BucketStatus],
}

pub fn run(config: &GovernorConfig, tenant: Option<&str>, json: bool) -> anyhow::Result<()> {
    let ledger = QuotaLedger::open(&config.ledger, config.limits_table())?;
    let buckets: Vec<BucketStatus> = ledger
        .snapshot()
        .into_iter()
        .filter(|b| tenant.is_none() || b.tenant_id.as_deref() == tenant)
        .collect();

    if json {
        let report = StatusReport {
            timezone: ledger.timezone().name().to_string(),
            unlimited_mode: ledger.is_unlimited(None),
            unlimited_tenants: ledger.unlimited_tenants(),
            orphaned_commits: ledger.orphaned_commits(),
            buckets: &buckets,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if ledger.is_unlimited(None) {
        println!("unlimited mode: ON (quota checks bypassed)");
    }
    let exempt = ledger.unlimited_tenants();
    if !exempt.is_empty() {
        println!("unlimited tenants: {}", exempt.join(", "));
    }
    print!("{}", render_table(&buckets));
    Ok(())
}

/// Plain-text table of bucket status, one row per bucket.
pub fn render_table(buckets: &[BucketStatus]) -> String {
    if buckets.is_empty() {
        return "no usage recorded\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<12} {:<24} {:<10} {:>12} {:>10} {:>12} {:>8} {:>5}",
        "SCOPE", "LANE", "DAY", "USED", "RESERVED", "DAILY LIMIT", "RATIO", "STOP"
    );
    for b in buckets {
        let limit = b
            .daily_token_limit
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".into());
        let ratio = b
            .usage_ratio
            .map(|r| format!("{:.0}%", r * 100.0))
            .unwrap_or_else(|| "-".into());
        let _ = writeln!(
            out,
            "{:<12} {:<24} {:<10} {:>12} {:>10} {:>12} {:>8} {:>5}",
            b.tenant_id.as_deref().unwrap_or("global"),
            b.key,
            b.window_day,
            b.used.total_tokens(),
            b.reserved.total_tokens(),
            limit,
            ratio,
            if b.hard_stopped { "yes" } else { "" },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lg_ledger::Usage;

    fn bucket(tenant: Option<&str>, used: u64, limit: Option<u64>) -> BucketStatus {
        BucketStatus {
            tenant_id: tenant.map(str::to_string),
            key: "stable:openai".into(),
            window_day: "2026-07-14".into(),
            used: Usage::tokens(used, 0),
            reserved: Usage::default(),
            hard_stopped: false,
            daily_token_limit: limit,
            lifetime_cost_limit: None,
            usage_ratio: limit.map(|l| used as f64 / l as f64),
        }
    }

    #[test]
    fn empty_table() {
        assert_eq!(render_table(&[]), "no usage recorded\n");
    }

    #[test]
    fn table_rows_show_scope_and_ratio() {
        let out = render_table(&[bucket(None, 500, Some(1_000)), bucket(Some("acme"), 10, None)]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("global"));
        assert!(lines[1].contains("50%"));
        assert!(lines[2].starts_with("acme"));
        assert!(lines[2].contains(" - "));
    }
}
