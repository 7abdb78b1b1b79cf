//! Shut down a server started by pg-bootstrap
//!
//! SIGINT asks PostgreSQL for a fast shutdown; SIGQUIT is the immediate
//! fallback. SIGKILL is never sent since it skips shared memory cleanup.

use crate::config::BootstrapConfig;
use crate::datadir::{DataDir, LockFile};
use crate::error::{BootstrapError, Result};
use crate::lock;
use anyhow::anyhow;
use common::sudo;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const IMMEDIATE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running; a leftover lock may have been removed
    NotRunning { stale_lock_removed: bool },
    /// The server exited, after SIGQUIT if `forced`
    Stopped { pid: i32, forced: bool },
}

/// Stop the server recorded in the data directory's lock file.
pub async fn stop_server(config: &BootstrapConfig) -> Result<StopOutcome> {
    let data = DataDir::new(config);
    let pid = match data.read_lock().await? {
        LockFile::Absent => {
            info!(data_dir = %config.data_dir.display(), "No lock file, server not running");
            return Ok(StopOutcome::NotRunning {
                stale_lock_removed: false,
            });
        }
        LockFile::Present(Some(pid)) if lock::is_server_process(pid) => pid,
        LockFile::Present(pid) => {
            warn!(pid = ?pid, path = %data.lock_file().display(), "Lock owner not running, removing stale lock");
            data.remove_lock().await?;
            return Ok(StopOutcome::NotRunning {
                stale_lock_removed: true,
            });
        }
    };

    stop_pid(pid, config.stop_timeout, config.run_as.as_deref()).await
}

/// Signal `pid` and wait for it to exit, escalating once.
pub async fn stop_pid(pid: i32, timeout: Duration, run_as: Option<&str>) -> Result<StopOutcome> {
    info!(pid, timeout = ?timeout, "Requesting fast shutdown");
    send_signal(pid, Signal::SIGINT, run_as).await?;
    if wait_for_exit(pid, timeout).await {
        info!(pid, "Server stopped");
        return Ok(StopOutcome::Stopped { pid, forced: false });
    }

    warn!(pid, "Server still running, requesting immediate shutdown");
    send_signal(pid, Signal::SIGQUIT, run_as).await?;
    if wait_for_exit(pid, IMMEDIATE_TIMEOUT).await {
        return Ok(StopOutcome::Stopped { pid, forced: true });
    }

    Err(BootstrapError::Command(anyhow!(
        "server {} still running after SIGINT and SIGQUIT",
        pid
    )))
}

/// Deliver a signal directly, or through `sudo -u` when the server
/// belongs to another account.
async fn send_signal(pid: i32, signal: Signal, run_as: Option<&str>) -> Result<()> {
    match kill(Pid::from_raw(pid), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(Errno::EPERM) => match run_as {
            Some(account) => {
                let sig = signal.as_str().trim_start_matches("SIG").to_string();
                let pid = pid.to_string();
                sudo(&["-u", account, "kill", "-s", sig.as_str(), pid.as_str()]).await?;
                Ok(())
            }
            None => Err(BootstrapError::Command(anyhow!(
                "permission denied signalling pid {}; set PG_RUN_AS to the server account",
                pid
            ))),
        },
        Err(e) => Err(BootstrapError::Command(anyhow!(
            "failed to signal pid {}: {}",
            pid,
            e
        ))),
    }
}

async fn wait_for_exit(pid: i32, timeout: Duration) -> bool {
    let start = Instant::now();
    loop {
        if !lock::process_alive(pid) {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        sleep(POLL_INTERVAL).await;
    }
}
