use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use sigwatch_core::config::SigwatchConfig;
use sigwatch_daemon::check::check_rules;
use sigwatch_daemon::cli::DaemonCli;
use sigwatch_daemon::logging::init_tracing;
use sigwatch_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = DaemonCli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sigwatch-daemon: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: DaemonCli) -> Result<()> {
    if let Some(path) = &cli.check_rules {
        let report = check_rules(path).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut config = SigwatchConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    init_tracing(&config.general)?;
    tracing::info!(config = %cli.config.display(), "sigwatch-daemon starting");

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await
}
