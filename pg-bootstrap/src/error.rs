//! Fatal bootstrap outcomes
//!
//! Anything that ends a run with exit status 1 is one of these. Transient
//! conditions (server still starting, object already exists) never become
//! errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("PostgreSQL binaries ({missing}) not found; searched: {searched}")]
    MissingBinaries { missing: String, searched: String },

    #[error("storage initialization failed: {0}")]
    StorageInitFailed(String),

    #[error("server process {pid} exited before accepting connections")]
    ServerExited { pid: u32 },

    #[error("server process {pid} still not accepting connections after {attempts} probes and a {grace_secs}s grace period")]
    NotReadyAfterGrace {
        pid: u32,
        attempts: u32,
        grace_secs: u64,
    },

    #[error("cannot inspect {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lock file {path}: {source}")]
    LockFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("provisioning failed: {0}")]
    Provisioning(String),

    #[error("failed to write {path}: {source}")]
    Artifacts {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Command(#[from] anyhow::Error),
}

impl BootstrapError {
    /// Phase name reported alongside failure events.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "config",
            Self::MissingBinaries { .. } => "locate_binaries",
            Self::StorageInitFailed(_) => "init_storage",
            Self::ServerExited { .. } | Self::NotReadyAfterGrace { .. } => "await_ready",
            Self::DataDir { .. } => "inspect_data_dir",
            Self::LockFile { .. } => "reconcile_lock",
            Self::Provisioning(_) => "provision",
            Self::Artifacts { .. } => "write_artifacts",
            Self::Command(_) => "command",
        }
    }
}

pub type Result<T> = std::result::Result<T, BootstrapError>;
