//! Operations against the managed PostgreSQL instance
//!
//! The orchestrator only talks to the server through [`Cluster`], so the
//! polling and grace logic can run against a fake in tests.

use crate::binaries::{Binaries, Tool};
use crate::config::BootstrapConfig;
use crate::datadir::DataDir;
use crate::error::{BootstrapError, Result};
use crate::lock;
use crate::probe::ProbeStatus;
use crate::provision::{ProvisionReport, Provisioner};
use anyhow::Context;
use common::sudo;
use std::fs::{self, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::process::Stdio;
use tokio::process::Child;
use tracing::{debug, info, warn};

/// Everything the orchestrator needs from a PostgreSQL instance.
#[allow(async_fn_in_trait)]
pub trait Cluster {
    /// Marker and lock file access, as the server account.
    fn data_dir(&self) -> &DataDir;

    /// Readiness of the configured host/port.
    async fn probe(&self) -> ProbeStatus;

    /// Whether the pid recorded in a lock file is a live server.
    fn lock_owner_alive(&self, pid: i32) -> bool;

    /// Create the data directory contents. Must leave `PG_VERSION` behind.
    async fn init_storage(&self) -> Result<()>;

    /// Spawn the server without waiting for it; returns its pid.
    async fn start_server(&mut self) -> Result<u32>;

    /// Whether the process from `start_server` is still running.
    async fn server_alive(&mut self) -> bool;

    /// Ensure database, role and grants.
    async fn provision(&self) -> Result<ProvisionReport>;
}

/// A PostgreSQL instance on this host, driven through its binaries
pub struct LocalCluster {
    config: BootstrapConfig,
    binaries: Binaries,
    data: DataDir,
    child: Option<Child>,
}

impl LocalCluster {
    pub fn new(config: BootstrapConfig, binaries: Binaries) -> Self {
        Self {
            data: DataDir::new(&config),
            config,
            binaries,
            child: None,
        }
    }

    fn run_as(&self) -> Option<&str> {
        self.config.run_as.as_deref()
    }

    /// Create the data directory with mode 0700, owned by the server account.
    async fn prepare_data_dir(&self) -> Result<()> {
        let data_dir = self.config.data_dir.to_string_lossy().into_owned();

        match self.run_as() {
            Some(account) => {
                info!(account, data_dir = %data_dir, "Preparing data directory");
                sudo(&["mkdir", "-p", data_dir.as_str()]).await?;
                sudo(&["chown", "-R", account, data_dir.as_str()]).await?;
                sudo(&["chmod", "700", data_dir.as_str()]).await?;
            }
            None => {
                fs::create_dir_all(&self.config.data_dir)
                    .context("Failed to create data directory")?;
                fs::set_permissions(&self.config.data_dir, fs::Permissions::from_mode(0o700))
                    .context("Failed to set data directory permissions")?;
            }
        }
        Ok(())
    }

    fn open_log(&self) -> Result<fs::File> {
        let log_file = &self.config.log_file;
        if let Some(parent) = log_file.parent() {
            fs::create_dir_all(parent).context("Failed to create log directory")?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .context(format!("Failed to open server log {}", log_file.display()))?;
        Ok(file)
    }
}

impl Cluster for LocalCluster {
    fn data_dir(&self) -> &DataDir {
        &self.data
    }

    async fn probe(&self) -> ProbeStatus {
        let result = self
            .binaries
            .invocation(Tool::PgIsReady, None)
            .args(["-h", self.config.host.as_str(), "-t", "2"])
            .args(["-p".to_string(), self.config.port.to_string()])
            .run()
            .await;

        match result {
            Ok(output) => {
                let status = ProbeStatus::from_exit_code(output.code);
                debug!(status = %status, output = %output.stdout, "pg_isready");
                status
            }
            Err(e) => {
                warn!(error = %e, "pg_isready could not run");
                ProbeStatus::NoAttempt
            }
        }
    }

    fn lock_owner_alive(&self, pid: i32) -> bool {
        lock::is_server_process(pid)
    }

    async fn init_storage(&self) -> Result<()> {
        self.prepare_data_dir().await?;

        let output = self
            .binaries
            .invocation(Tool::InitDb, self.run_as())
            .arg("-D")
            .arg(self.config.data_dir.to_string_lossy())
            .args(["-U", self.config.superuser.as_str()])
            .args(["-E", "UTF8", "--auth-local=trust", "--auth-host=scram-sha-256"])
            .run()
            .await?;

        if output.success {
            debug!(output = %output.stdout, "initdb finished");
            Ok(())
        } else {
            Err(BootstrapError::StorageInitFailed(format!(
                "initdb exit {}: {}",
                output.code_display(),
                output.stderr
            )))
        }
    }

    async fn start_server(&mut self) -> Result<u32> {
        let log = self.open_log()?;
        let log_err = log.try_clone().context("Failed to clone server log handle")?;

        let mut cmd = self
            .binaries
            .invocation(Tool::Postgres, self.run_as())
            .arg("-D")
            .arg(self.config.data_dir.to_string_lossy())
            .args(["-p".to_string(), self.config.port.to_string()])
            .args(["-h", self.config.host.as_str()])
            .arg("-k")
            .arg(self.config.socket_dir.to_string_lossy())
            .to_command();

        // Own process group: the server outlives us and ignores our terminal's signals.
        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .process_group(0)
            .kill_on_drop(false)
            .spawn()
            .context("Failed to start postgres")?;

        let pid = child
            .id()
            .ok_or_else(|| anyhow::anyhow!("postgres exited before reporting a pid"))?;
        info!(
            pid,
            log = %self.config.log_file.display(),
            "postgres spawned"
        );

        self.child = Some(child);
        Ok(pid)
    }

    async fn server_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!(
                    exit_code = ?status.code(),
                    log = %self.config.log_file.display(),
                    "postgres exited"
                );
                false
            }
            Err(e) => {
                warn!(error = %e, "Failed to poll postgres process");
                false
            }
        }
    }

    async fn provision(&self) -> Result<ProvisionReport> {
        Provisioner::new(&self.config, &self.binaries).run().await
    }
}
