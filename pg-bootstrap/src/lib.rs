//! Local PostgreSQL bootstrapper
//!
//! Brings one PostgreSQL instance from an unknown state to ready and
//! provisioned, then records how to connect to it:
//! - binary discovery and configuration
//! - lock file reconciliation and storage initialization
//! - server start with bounded readiness polling
//! - idempotent database, role and grant provisioning
//! - connection artifacts for downstream tools

pub mod artifacts;
pub mod backoff;
pub mod binaries;
pub mod cluster;
pub mod config;
pub mod datadir;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod probe;
pub mod provision;
pub mod stop;

pub use binaries::{Binaries, Tool};
pub use cluster::{Cluster, LocalCluster};
pub use config::BootstrapConfig;
pub use datadir::{DataDir, LockFile};
pub use error::BootstrapError;
pub use orchestrator::{Orchestrator, Outcome};
pub use stop::{stop_server, StopOutcome};

pub use common::{ConfigExt, Telemetry, TelemetryEvent};
