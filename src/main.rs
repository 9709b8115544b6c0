//! opcom-dam-prices CLI
//!
//! Without flags, refreshes on the configured interval until Ctrl+C.
//! With `--once`, runs a single cycle and prints the snapshot as JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use opcom_dam_prices::logging::{init_logging, LoggingConfig};
use opcom_dam_prices::{RefreshOrchestrator, TariffConfig};

#[derive(Parser)]
#[command(
    name = "opcom-dam-prices",
    about = "Romanian day-ahead electricity prices from the OPCOM CSV export"
)]
struct Cli {
    /// Run one refresh cycle, print the snapshot as JSON and exit.
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Artifact directory. Overrides OPCOM_DATA_DIR.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(LoggingConfig::from_env())
        .map_err(|e| anyhow::anyhow!(e))
        .context("initializing logging")?;

    let mut config = TariffConfig::from_env().context("loading configuration")?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let orchestrator =
        RefreshOrchestrator::with_http(config).context("creating refresh orchestrator")?;

    if cli.once {
        let snapshot = orchestrator.refresh_now().await.context("refresh cycle")?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    orchestrator.run(shutdown_signal()).await;

    if let Some(message) = orchestrator.last_error() {
        tracing::warn!(download_status = %format!("Error: {}", message), "Stopped after a failed cycle");
    }

    Ok(())
}
