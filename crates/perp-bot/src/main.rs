//! perpbot entry point.

use anyhow::Result;
use clap::Parser;
use perp_bot::{AppSettings, Application, Cli};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    perp_telemetry::init_logging()?;
    info!("Starting perpbot v{}", env!("CARGO_PKG_VERSION"));

    let settings = AppSettings::load(cli.config.clone())?;
    let app = Application::new(settings)?;

    // Loops observe the token between cycles.
    let stop = CancellationToken::new();
    let shutdown = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    let output = app.execute(cli.command, stop).await?;
    println!("{output}");
    Ok(())
}
