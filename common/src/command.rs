//! Command execution utilities
//!
//! Every PostgreSQL tool the bootstrapper touches is an external program,
//! so all invocations funnel through here for consistent logging and
//! error reporting.

use anyhow::{anyhow, Context, Result};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

/// libpq settings that would redirect a tool away from its explicit flags.
pub const LIBPQ_ENV: [&str; 6] = [
    "PGHOST",
    "PGPORT",
    "PGUSER",
    "PGDATABASE",
    "PGSERVICE",
    "PGOPTIONS",
];

/// Keep the caller's libpq settings out of a child's environment.
pub fn clear_libpq_env(command: &mut Command) -> &mut Command {
    for var in LIBPQ_ENV {
        command.env_remove(var);
    }
    command
}

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Exit code rendered for messages; `signal` when the process was killed.
    pub fn code_display(&self) -> String {
        self.code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string())
    }
}

/// Run a command and return its output.
///
/// Non-zero exit is not an error here. Use `run_checked` for that.
#[instrument(skip_all, fields(cmd = %cmd))]
pub async fn run<S: AsRef<str>>(cmd: &str, args: &[S]) -> Result<CommandOutput> {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    debug!(args = ?args, "Running command");

    let output = clear_libpq_env(&mut Command::new(cmd))
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .await
        .context(format!("Failed to execute {}", cmd))?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        success: output.status.success(),
        code: output.status.code(),
    })
}

/// Run a command, feeding `input` on stdin, and return its output.
///
/// Used for multi-statement SQL scripts so they never show up in `ps`.
#[instrument(skip_all, fields(cmd = %cmd))]
pub async fn run_with_input<S: AsRef<str>>(
    cmd: &str,
    args: &[S],
    input: &str,
) -> Result<CommandOutput> {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    debug!(args = ?args, bytes = input.len(), "Running command with stdin");

    let mut child = clear_libpq_env(&mut Command::new(cmd))
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context(format!("Failed to spawn {}", cmd))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .await
            .context(format!("Failed to write stdin of {}", cmd))?;
        // Closing stdin lets the tool see EOF and exit.
        drop(stdin);
    }

    let output = child
        .wait_with_output()
        .await
        .context(format!("Failed to wait for {}", cmd))?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        success: output.status.success(),
        code: output.status.code(),
    })
}

/// Run a command and return stdout if successful, error otherwise.
///
/// # Example
/// ```ignore
/// let version = run_checked("postgres", &["--version"]).await?;
/// ```
pub async fn run_checked<S: AsRef<str>>(cmd: &str, args: &[S]) -> Result<String> {
    let output = run(cmd, args).await?;
    if output.success {
        Ok(output.stdout)
    } else {
        Err(anyhow!(
            "{} failed (exit {}): {}",
            cmd,
            output.code_display(),
            output.stderr
        ))
    }
}

/// Run a command with sudo.
///
/// # Example
/// ```ignore
/// sudo(&["chown", "-R", "postgres", "/srv/pgdata"]).await?;
/// ```
pub async fn sudo<S: AsRef<str>>(args: &[S]) -> Result<String> {
    run_checked("sudo", args).await
}
