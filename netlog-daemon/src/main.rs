use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use netlog_core::config::NetlogConfig;
use netlog_daemon::cli::DaemonCli;
use netlog_daemon::logging;
use netlog_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = DaemonCli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The subscriber may not be installed yet (bad config, bad log format).
            eprintln!("netlog-daemon: {e:#}");
            tracing::error!(error = %e, "netlog-daemon exiting with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: DaemonCli) -> Result<()> {
    // file -> NETLOG_* env -> CLI flags, then validate once
    let mut config = NetlogConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    if cli.validate {
        // Building compiles every device profile without binding any socket.
        config.metrics.enabled = false;
        let orchestrator = Orchestrator::build_from_config(config).await?;
        println!(
            "configuration OK: {} device profile(s) [{}]",
            orchestrator.engine().devices().len(),
            orchestrator.engine().devices().join(", ")
        );
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "netlog-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    tracing::info!("netlog-daemon shut down");
    Ok(())
}
