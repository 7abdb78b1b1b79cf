//! Bootstrap event reporting
//!
//! Every lifecycle decision is logged locally. When an endpoint is
//! configured the same event is also posted as JSON, fire and forget.

use crate::config::ConfigExt;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the optional event sink.
pub const TELEMETRY_URL_ENV: &str = "PG_BOOTSTRAP_TELEMETRY_URL";

/// All events the bootstrapper reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TelemetryEvent {
    /// A bootstrap run began
    BootstrapStarted { data_dir: String, port: u16 },

    /// The server was already accepting connections
    AlreadyRunning { port: u16 },

    /// A lock file pointed at a dead process and was removed
    StaleLockRemoved { pid: Option<i32>, path: String },

    /// initdb created a new cluster
    StorageInitialized { data_dir: String },

    /// The server process was spawned
    ServerStarted { pid: u32, port: u16 },

    /// The spawned server accepted connections
    ServerReady { attempts: u32, elapsed_ms: u64 },

    /// Database, role and grants are in place
    Provisioned {
        database: String,
        role: String,
        database_created: bool,
        role_created: bool,
    },

    /// Bootstrap finished and artifacts were written
    BootstrapCompleted { outcome: String, duration_ms: u64 },

    /// Bootstrap failed
    BootstrapFailed { error: String, phase: String },

    /// pg-stop shut a server down
    ServerStopped { pid: i32, forced: bool },
}

impl TelemetryEvent {
    /// Get the event type name for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BootstrapStarted { .. } => "PG_BOOTSTRAP_STARTED",
            Self::AlreadyRunning { .. } => "PG_BOOTSTRAP_ALREADY_RUNNING",
            Self::StaleLockRemoved { .. } => "PG_BOOTSTRAP_STALE_LOCK_REMOVED",
            Self::StorageInitialized { .. } => "PG_BOOTSTRAP_STORAGE_INITIALIZED",
            Self::ServerStarted { .. } => "PG_BOOTSTRAP_SERVER_STARTED",
            Self::ServerReady { .. } => "PG_BOOTSTRAP_SERVER_READY",
            Self::Provisioned { .. } => "PG_BOOTSTRAP_PROVISIONED",
            Self::BootstrapCompleted { .. } => "PG_BOOTSTRAP_COMPLETED",
            Self::BootstrapFailed { .. } => "PG_BOOTSTRAP_FAILED",
            Self::ServerStopped { .. } => "PG_BOOTSTRAP_SERVER_STOPPED",
        }
    }

    /// Convert event to a human-readable message.
    pub fn message(&self) -> String {
        match self {
            Self::BootstrapStarted { data_dir, port } => {
                format!("Bootstrap started for {} on port {}", data_dir, port)
            }
            Self::AlreadyRunning { port } => {
                format!("Server already accepting connections on port {}", port)
            }
            Self::StaleLockRemoved { pid, path } => match pid {
                Some(pid) => format!("Removed stale lock {} (pid {} not running)", path, pid),
                None => format!("Removed unreadable lock {}", path),
            },
            Self::StorageInitialized { data_dir } => {
                format!("Initialized storage in {}", data_dir)
            }
            Self::ServerStarted { pid, port } => {
                format!("Server started (pid {}) on port {}", pid, port)
            }
            Self::ServerReady {
                attempts,
                elapsed_ms,
            } => {
                format!(
                    "Server ready after {} probes in {}ms",
                    attempts, elapsed_ms
                )
            }
            Self::Provisioned {
                database,
                role,
                database_created,
                role_created,
            } => {
                format!(
                    "Provisioned database {} (created={}) and role {} (created={})",
                    database, database_created, role, role_created
                )
            }
            Self::BootstrapCompleted {
                outcome,
                duration_ms,
            } => {
                format!("Bootstrap completed ({}) in {}ms", outcome, duration_ms)
            }
            Self::BootstrapFailed { error, phase } => {
                format!("Bootstrap failed during {}: {}", phase, error)
            }
            Self::ServerStopped { pid, forced } => {
                format!("Server {} stopped (forced={})", pid, forced)
            }
        }
    }
}

/// Event reporter: local log plus an optional HTTP sink.
#[derive(Clone)]
pub struct Telemetry {
    endpoint: Option<Arc<str>>,
    component: String,
}

impl Telemetry {
    /// Create a reporter whose sink comes from `PG_BOOTSTRAP_TELEMETRY_URL`.
    pub fn from_env(component: &str) -> Self {
        Self::new(component, String::env_opt(TELEMETRY_URL_ENV))
    }

    /// Create a reporter with an explicit sink (`None` logs only).
    pub fn new(component: &str, endpoint: Option<String>) -> Self {
        Self {
            endpoint: endpoint.map(Arc::from),
            component: component.to_string(),
        }
    }

    /// Reporter that never leaves the process.
    pub fn disabled(component: &str) -> Self {
        Self::new(component, None)
    }

    fn payload(&self, event: &TelemetryEvent) -> serde_json::Value {
        json!({
            "event": event.event_type(),
            "message": event.message(),
            "component": self.component,
            "version": env!("CARGO_PKG_VERSION"),
            "data": event,
        })
    }

    /// Report an event (fire and forget, non-blocking).
    ///
    /// Posting happens on a spawned thread. Errors are logged and never
    /// reach the caller.
    pub fn send(&self, event: TelemetryEvent) {
        info!(event = %event.event_type(), "{}", event.message());

        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };
        let payload = self.payload(&event);

        thread::spawn(move || {
            if let Err(e) = post(&endpoint, &payload) {
                warn!("Telemetry send failed: {}", e);
            }
        });
    }

    /// Report an event synchronously (blocking).
    ///
    /// Use right before `process::exit`, where a spawned thread would be cut
    /// off. From async code call it through `spawn_blocking`: the blocking
    /// client must not run on a runtime thread.
    pub fn send_sync(&self, event: TelemetryEvent) -> Result<(), reqwest::Error> {
        info!(event = %event.event_type(), "{}", event.message());

        match self.endpoint.as_deref() {
            Some(endpoint) => post(endpoint, &self.payload(&event)),
            None => Ok(()),
        }
    }
}

fn post(endpoint: &str, payload: &serde_json::Value) -> Result<(), reqwest::Error> {
    let client = Client::builder().timeout(Duration::from_secs(5)).build()?;
    client
        .post(endpoint)
        .header("Content-Type", "application/json")
        .json(payload)
        .send()?
        .error_for_status()?;
    Ok(())
}
