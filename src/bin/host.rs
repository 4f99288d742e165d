//! Headless host binary for stdin/stdout JSON communication.
//!
//! Usage: `switchyard-host [routing.toml]`
//!
//! Reads `BridgeRequest` messages as newline-delimited JSON from stdin and
//! writes one `BridgeResponse` line per request to stdout. The background
//! health monitor runs for the lifetime of the process.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use std::path::PathBuf;
use std::sync::Arc;

use switchyard::bridge::Bridge;
use switchyard_router::monitor::DEFAULT_SWEEP_INTERVAL;
use switchyard_router::{HealthProbe, HttpHealthProbe};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise tracing to stderr only (stdout is reserved for the JSON
    // protocol).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(switchyard::config::default_config_path);
    tracing::info!(config = %config_path.display(), "switchyard-host starting");

    let router = Arc::new(
        switchyard::build_router(&config_path)
            .map_err(|e| anyhow::anyhow!("failed to build router: {e}"))?,
    );
    let probe: Arc<dyn HealthProbe> = Arc::new(
        HttpHealthProbe::new().map_err(|e| anyhow::anyhow!("failed to build health probe: {e}"))?,
    );
    router
        .start(Arc::clone(&probe), DEFAULT_SWEEP_INTERVAL)
        .map_err(|e| anyhow::anyhow!("failed to start health monitor: {e}"))?;

    let bridge = Bridge::new(Arc::clone(&router), probe);
    let result = bridge
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await;

    router.shutdown().await;
    result.map_err(|e| {
        tracing::error!(error = %e, "switchyard-host exited with error");
        anyhow::anyhow!("switchyard-host failed: {e}")
    })?;

    tracing::info!("switchyard-host shut down cleanly");
    Ok(())
}
