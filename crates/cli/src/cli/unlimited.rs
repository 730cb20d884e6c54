use lg_domain::config::GovernorConfig;
use lg_ledger::QuotaLedger;

use super::Toggle;

pub fn run(config: &GovernorConfig, state: Toggle, tenant: Option<&str>) -> anyhow::Result<()> {
    let ledger = QuotaLedger::open(&config.ledger, config.limits_table())?;
    ledger.toggle_unlimited(state.enabled(), tenant);
    ledger.flush()?;

    let scope = tenant.map_or_else(|| "all callers".to_string(), |t| format!("tenant {t}"));
    let word = if state.enabled() { "ON" } else { "OFF" };
    println!("unlimited mode {word} for {scope}");
    Ok(())
}
