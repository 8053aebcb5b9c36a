use anyhow::Result;
use pmon_server::{logging, MonitorConfig, MonitoringService};
use std::path::Path;
use std::time::Duration;
use tokio::signal;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage: pmon-server [config.toml]");
    eprintln!();
    eprintln!("Runs host and project sampling, health probes and alerting until Ctrl-C.");
    eprintln!("Without a config file every setting takes its default.");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let config = match args.get(1).map(|s| s.as_str()) {
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(path) => MonitorConfig::load(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config '{path}': {e}"))?,
        None if Path::new("config/pmon.toml").exists() => MonitorConfig::load("config/pmon.toml")?,
        None => MonitorConfig::default(),
    };

    logging::init(&config.logging)?;
    pmon_common::id::init(1, 1);

    tracing::info!(
        channels = config.channels.len(),
        rules = config.rules.len(),
        health_checks = config.health_checks.len(),
        "pmon-server starting"
    );

    let service = MonitoringService::from_config(&config);
    service.start();

    signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully");

    service.stop(SHUTDOWN_TIMEOUT).await;
    tracing::info!("Server stopped");
    Ok(())
}
