//! Bring up a local PostgreSQL instance and provision it
//!
//! Safe to re-run: an instance that is already serving only gets its
//! connection artifacts rewritten.

use common::init_logging;
use pg_bootstrap::{
    Binaries, BootstrapConfig, BootstrapError, LocalCluster, Orchestrator, Outcome, Telemetry,
    TelemetryEvent,
};
use tracing::{error, info};

async fn bootstrap(telemetry: &Telemetry) -> Result<Outcome, BootstrapError> {
    let config = BootstrapConfig::from_env()?;
    let binaries = Binaries::locate(config.bin_dir.as_deref())?;
    info!(
        bin_dir = %binaries.dir().display(),
        data_dir = %config.data_dir.display(),
        port = config.port,
        "=== pg-bootstrap ==="
    );

    let cluster = LocalCluster::new(config.clone(), binaries);
    Orchestrator::new(&config, cluster, telemetry).run().await
}

#[tokio::main]
async fn main() {
    let _guard = init_logging("pg-bootstrap");

    let telemetry = Telemetry::from_env("pg-bootstrap");

    match bootstrap(&telemetry).await {
        Ok(outcome) => {
            info!(outcome = %outcome, "Bootstrap finished");
        }
        Err(e) => {
            error!(error = %e, phase = e.phase(), "Bootstrap failed");
            let event = TelemetryEvent::BootstrapFailed {
                error: e.to_string(),
                phase: e.phase().to_string(),
            };
            let reporter = telemetry.clone();
            let _ = tokio::task::spawn_blocking(move || reporter.send_sync(event)).await;
            std::process::exit(1);
        }
    }
}
