//! Stop the PostgreSQL instance owning the configured data directory

use common::init_logging;
use pg_bootstrap::{stop_server, BootstrapConfig, StopOutcome, Telemetry, TelemetryEvent};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _guard = init_logging("pg-stop");
    let telemetry = Telemetry::from_env("pg-stop");

    let result = match BootstrapConfig::from_env() {
        Ok(config) => stop_server(&config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(StopOutcome::NotRunning { stale_lock_removed }) => {
            info!(stale_lock_removed, "Server not running");
        }
        Ok(StopOutcome::Stopped { pid, forced }) => {
            let event = TelemetryEvent::ServerStopped { pid, forced };
            let _ = tokio::task::spawn_blocking(move || telemetry.send_sync(event)).await;
        }
        Err(e) => {
            error!(error = %e, "Failed to stop server");
            std::process::exit(1);
        }
    }
}
