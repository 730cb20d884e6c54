use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use lg_cli::cli::route::RouteArgs;
use lg_cli::cli::{Cli, Command, ConfigCommand};
use lg_domain::config::{LogFormat, ObservabilityConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = lg_cli::cli::load_config()?;
    init_tracing(&config.observability);

    match cli.command {
        Command::Status { tenant, json } => lg_cli::cli::status::run(&config, tenant.as_deref(), json),
        Command::Unlimited { state, tenant } => {
            lg_cli::cli::unlimited::run(&config, state, tenant.as_deref())
        }
        Command::Route {
            signals,
            tools,
            work_item,
            tenant,
            estimate_tokens,
        } => lg_cli::cli::route::run(
            &config,
            RouteArgs {
                signals,
                tools,
                work_item,
                tenant,
                estimate_tokens,
            },
        ),
        Command::Sync { watch } => lg_cli::cli::sync::run(&config, watch).await,
        Command::Config(ConfigCommand::Validate) => {
            if !lg_cli::cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => lg_cli::cli::config::show(&config),
    }
}

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(obs: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lg_ledger=debug,lg_router=debug"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match obs.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init(),
    }
}
