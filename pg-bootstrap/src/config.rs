//! Bootstrap configuration from environment variables
//!
//! The same values drive initialization and provisioning, so they are read
//! once and passed around by reference.

use crate::backoff::Backoff;
use crate::error::{BootstrapError, Result};
use crate::provision::DOLLAR_TAG;
use common::ConfigExt;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATABASE: &str = "myapp";
pub const DEFAULT_USER: &str = "appuser";
pub const DEFAULT_PASSWORD: &str = "apppassword";
pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_DATA_DIR: &str = "pgdata";
pub const DEFAULT_CONNECTION_FILE: &str = ".db_connection";
pub const DEFAULT_ENV_FILE: &str = "db-visualizer/.env";

/// Written by the server at startup; first line is its pid.
pub const LOCK_FILE_NAME: &str = "postmaster.pid";
/// Written by initdb; its presence means the cluster exists.
pub const VERSION_MARKER_NAME: &str = "PG_VERSION";

/// Configuration for one bootstrap run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub database: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Bind address for the server and host for readiness probes
    pub host: String,
    pub schema: String,
    pub superuser: String,
    /// System account the server binaries run as (via `sudo -u`)
    pub run_as: Option<String>,
    pub bin_dir: Option<PathBuf>,
    pub socket_dir: PathBuf,
    pub log_file: PathBuf,
    pub connection_file: PathBuf,
    pub env_file: PathBuf,
    pub ready_backoff: Backoff,
    pub grace_period: Duration,
    pub lock_recheck_attempts: u32,
    pub lock_recheck_interval: Duration,
    pub stop_timeout: Duration,
}

impl BootstrapConfig {
    /// Built-in defaults with every relative path resolved against `base`.
    pub fn defaults(base: &Path) -> Self {
        let data_dir = base.join(DEFAULT_DATA_DIR);
        Self {
            database: DEFAULT_DATABASE.to_string(),
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            port: DEFAULT_PORT,
            host: "localhost".to_string(),
            schema: "public".to_string(),
            superuser: "postgres".to_string(),
            run_as: None,
            bin_dir: None,
            socket_dir: data_dir.clone(),
            log_file: sibling_log(&data_dir),
            data_dir,
            connection_file: base.join(DEFAULT_CONNECTION_FILE),
            env_file: base.join(DEFAULT_ENV_FILE),
            ready_backoff: Backoff::new(Duration::from_millis(250), Duration::from_secs(4), 12),
            grace_period: Duration::from_secs(10),
            lock_recheck_attempts: 5,
            lock_recheck_interval: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(30),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| {
            BootstrapError::InvalidConfig(format!("cannot resolve working directory: {}", e))
        })?;
        let d = Self::defaults(&cwd);

        let data_dir = absolutize(&cwd, &PathBuf::from(String::env_or(
            "PGDATA",
            &d.data_dir.to_string_lossy(),
        )));
        let socket_dir = String::env_opt("PG_SOCKET_DIR")
            .map(|p| absolutize(&cwd, Path::new(&p)))
            .unwrap_or_else(|| data_dir.clone());
        let log_file = String::env_opt("PG_LOG_FILE")
            .map(|p| absolutize(&cwd, Path::new(&p)))
            .unwrap_or_else(|| sibling_log(&data_dir));

        let initial = u64::env_parse("PG_READY_INITIAL_DELAY_MS", 250);
        let max = u64::env_parse("PG_READY_MAX_DELAY_MS", 4000);
        let attempts = u32::env_parse("PG_READY_ATTEMPTS", d.ready_backoff.attempts);

        let config = Self {
            database: String::env_or("DB_NAME", &d.database),
            user: String::env_or("DB_USER", &d.user),
            password: String::env_or("DB_PASSWORD", &d.password),
            port: u16::env_parse("DB_PORT", d.port),
            host: String::env_or("DB_HOST", &d.host),
            schema: String::env_or("DB_SCHEMA", &d.schema),
            superuser: String::env_or("PG_SUPERUSER", &d.superuser),
            run_as: String::env_opt("PG_RUN_AS"),
            bin_dir: String::env_opt("PG_BIN_DIR").map(PathBuf::from),
            socket_dir,
            log_file,
            data_dir,
            connection_file: absolutize(
                &cwd,
                Path::new(&String::env_or("CONNECTION_FILE", DEFAULT_CONNECTION_FILE)),
            ),
            env_file: absolutize(
                &cwd,
                Path::new(&String::env_or("VISUALIZER_ENV_FILE", DEFAULT_ENV_FILE)),
            ),
            ready_backoff: Backoff::new(
                Duration::from_millis(initial),
                Duration::from_millis(max),
                attempts,
            ),
            grace_period: Duration::from_secs(u64::env_parse("PG_READY_GRACE_SECS", 10)),
            lock_recheck_attempts: u32::env_parse(
                "PG_LOCK_RECHECK_ATTEMPTS",
                d.lock_recheck_attempts,
            ),
            lock_recheck_interval: Duration::from_millis(u64::env_parse(
                "PG_LOCK_RECHECK_INTERVAL_MS",
                1000,
            )),
            stop_timeout: Duration::from_secs(u64::env_parse("PG_STOP_TIMEOUT_SECS", 30)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would produce broken SQL or a useless poll loop.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("DB_NAME", &self.database),
            ("DB_USER", &self.user),
            ("DB_SCHEMA", &self.schema),
            ("PG_SUPERUSER", &self.superuser),
            ("DB_HOST", &self.host),
        ] {
            if value.is_empty() {
                return Err(BootstrapError::InvalidConfig(format!("{} is empty", field)));
            }
        }

        for (field, value) in [
            ("DB_NAME", &self.database),
            ("DB_USER", &self.user),
            ("DB_PASSWORD", &self.password),
            ("DB_SCHEMA", &self.schema),
        ] {
            if value.contains('\0') {
                return Err(BootstrapError::InvalidConfig(format!(
                    "{} contains a NUL byte",
                    field
                )));
            }
            if value.contains(DOLLAR_TAG) {
                return Err(BootstrapError::InvalidConfig(format!(
                    "{} must not contain {}",
                    field, DOLLAR_TAG
                )));
            }
        }

        if self.port == 0 {
            return Err(BootstrapError::InvalidConfig("DB_PORT must be non-zero".into()));
        }
        if self.ready_backoff.attempts == 0 {
            return Err(BootstrapError::InvalidConfig(
                "PG_READY_ATTEMPTS must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Path to the server's lock file
    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE_NAME)
    }

    /// Path to the initialization marker
    pub fn version_marker(&self) -> PathBuf {
        self.data_dir.join(VERSION_MARKER_NAME)
    }
}

/// `<data dir>.log`: next to the data directory, since initdb wants it empty.
fn sibling_log(data_dir: &Path) -> PathBuf {
    PathBuf::from(format!("{}.log", data_dir.display()))
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
