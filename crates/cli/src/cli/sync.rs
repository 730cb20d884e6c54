use std::sync::Arc;

use lg_domain::config::GovernorConfig;
use lg_ledger::sync::sync_external_usage;
use lg_ledger::{HttpUsageReporter, QuotaLedger, UsageSync};

pub async fn run(config: &GovernorConfig, watch: bool) -> anyhow::Result<()> {
    let Some(reporter) = HttpUsageReporter::from_config(&config.sync)? else {
        anyhow::bail!("usage sync is not configured (set [sync] base_url)");
    };
    let ledger = QuotaLedger::open(&config.ledger, config.limits_table())?;
    let key = config.sync.key();

    if watch {
        return watch_until_interrupted(config, Arc::new(ledger), reporter).await;
    }

    let outcome = sync_external_usage(&ledger, &reporter, &key, config.sync.lookback_days).await?;
    ledger.flush()?;

    if outcome.updated {
        println!("{key}: added {} tokens of drift", outcome.drift_added);
    } else {
        println!("{key}: local usage already matches the report");
    }
    Ok(())
}

async fn watch_until_interrupted(
    config: &GovernorConfig,
    ledger: Arc<QuotaLedger>,
    reporter: HttpUsageReporter,
) -> anyhow::Result<()> {
    let sync = Arc::new(UsageSync::new(ledger.clone(), Arc::new(reporter), &config.sync));
    tracing::info!(
        key = %sync.key(),
        interval_secs = config.sync.interval().as_secs(),
        "watching provider usage"
    );
    let task = sync.spawn_periodic();

    tokio::signal::ctrl_c().await?;
    task.abort();
    ledger.flush()?;
    tracing::info!("usage watch stopped");
    Ok(())
}
