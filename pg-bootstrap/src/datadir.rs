//! Data directory state as the server account sees it
//!
//! With `PG_RUN_AS` the directory is owned by that account with mode 0700,
//! so the invoking user cannot even stat its contents. Every check then goes
//! through `sudo -u <account>` instead of the local filesystem. A denied
//! lookup is an error, never "absent".

use crate::binaries::Invocation;
use crate::config::BootstrapConfig;
use crate::error::{BootstrapError, Result};
use crate::lock::parse_lock_pid;
use common::CommandOutput;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What the server lock file says
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockFile {
    Absent,
    /// Present; `None` when the first line is not a usable pid
    Present(Option<i32>),
}

/// Marker and lock file access for one data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    lock_file: PathBuf,
    version_marker: PathBuf,
    /// Command prefix the file utilities run under; `None` reads directly
    via: Option<Invocation>,
}

impl DataDir {
    pub fn new(config: &BootstrapConfig) -> Self {
        Self {
            lock_file: config.lock_file(),
            version_marker: config.version_marker(),
            via: config.run_as.as_deref().map(Invocation::sudo_as),
        }
    }

    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    pub fn version_marker(&self) -> &Path {
        &self.version_marker
    }

    /// Whether initdb has populated the directory (`PG_VERSION` exists).
    pub async fn is_initialized(&self) -> Result<bool> {
        let path = &self.version_marker;
        let to_err = |source| BootstrapError::DataDir {
            path: path.clone(),
            source,
        };

        match &self.via {
            Some(via) => self.test(via, "-f", path).await.map_err(to_err),
            None => match fs::metadata(path) {
                Ok(meta) => Ok(meta.is_file()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(to_err(e)),
            },
        }
    }

    /// Read the lock file and the pid on its first line.
    pub async fn read_lock(&self) -> Result<LockFile> {
        let path = &self.lock_file;
        let to_err = |source| BootstrapError::LockFile {
            path: path.clone(),
            source,
        };

        let Some(via) = &self.via else {
            return match fs::read(path) {
                Ok(bytes) => Ok(LockFile::Present(parse_lock_pid(
                    &String::from_utf8_lossy(&bytes),
                ))),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(LockFile::Absent),
                Err(e) => Err(to_err(e)),
            };
        };

        if !self.test(via, "-e", path).await.map_err(to_err)? {
            return Ok(LockFile::Absent);
        }
        let output = self.util(via, &["cat"], path).await.map_err(to_err)?;
        if !output.success {
            return Err(to_err(command_error(&output)));
        }
        Ok(LockFile::Present(parse_lock_pid(&output.stdout)))
    }

    /// Delete the lock file. Already gone counts as success.
    pub async fn remove_lock(&self) -> Result<()> {
        let path = &self.lock_file;
        let to_err = |source| BootstrapError::LockFile {
            path: path.clone(),
            source,
        };

        match &self.via {
            Some(via) => {
                let output = self.util(via, &["rm", "-f"], path).await.map_err(to_err)?;
                if output.success {
                    Ok(())
                } else {
                    Err(to_err(command_error(&output)))
                }
            }
            None => match fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(to_err(e)),
            },
        }
    }

    /// `test <flag> <path>` as the server account.
    ///
    /// Exit 1 with nothing on stderr is a plain "no". Anything else (sudo
    /// refusing, a missing utility) is an error.
    async fn test(&self, via: &Invocation, flag: &str, path: &Path) -> io::Result<bool> {
        let output = via
            .clone()
            .args(["test", flag])
            .arg(path.to_string_lossy())
            .run()
            .await
            .map_err(io::Error::other)?;
        debug!(path = %path.display(), flag, code = ?output.code, "test");

        match output.code {
            Some(0) => Ok(true),
            Some(1) if output.stderr.is_empty() => Ok(false),
            _ => Err(command_error(&output)),
        }
    }

    async fn util(
        &self,
        via: &Invocation,
        util: &[&str],
        path: &Path,
    ) -> io::Result<CommandOutput> {
        via.clone()
            .args(util.iter().copied())
            .arg(path.to_string_lossy())
            .run()
            .await
            .map_err(io::Error::other)
    }
}

fn command_error(output: &CommandOutput) -> io::Error {
    io::Error::other(format!(
        "exit {}: {}",
        output.code_display(),
        output.stderr
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn setup() -> (TempDir, BootstrapConfig) {
        let dir = TempDir::new().unwrap();
        let config = BootstrapConfig::defaults(dir.path());
        fs::create_dir_all(&config.data_dir).unwrap();
        (dir, config)
    }

    /// Same code path as `sudo -u`, but `env` runs the utility as ourselves.
    fn through_env(config: &BootstrapConfig) -> DataDir {
        DataDir {
            via: Some(Invocation::new("env")),
            ..DataDir::new(config)
        }
    }

    #[test]
    fn test_run_as_goes_through_sudo() {
        let (_dir, mut config) = setup();
        assert_eq!(DataDir::new(&config).via, None);

        config.run_as = Some("postgres".to_string());
        let via = DataDir::new(&config).via.unwrap();
        assert_eq!(via.program, "sudo");
        assert_eq!(via.args, vec!["-u", "postgres", "--"]);
    }

    #[tokio::test]
    async fn test_direct_marker_and_lock() {
        let (_dir, config) = setup();
        let data = DataDir::new(&config);

        assert!(!data.is_initialized().await.unwrap());
        assert_eq!(data.read_lock().await.unwrap(), LockFile::Absent);

        fs::write(config.version_marker(), "16\n").unwrap();
        fs::write(config.lock_file(), "999999\n/srv/pgdata\n").unwrap();
        assert!(data.is_initialized().await.unwrap());
        assert_eq!(data.read_lock().await.unwrap(), LockFile::Present(Some(999999)));

        data.remove_lock().await.unwrap();
        assert_eq!(data.read_lock().await.unwrap(), LockFile::Absent);
        data.remove_lock().await.unwrap();
    }

    #[tokio::test]
    async fn test_wrapped_marker_and_lock() {
        let (_dir, config) = setup();
        let data = through_env(&config);

        assert!(!data.is_initialized().await.unwrap());
        assert_eq!(data.read_lock().await.unwrap(), LockFile::Absent);

        fs::write(config.version_marker(), "16\n").unwrap();
        fs::write(config.lock_file(), "garbage\n").unwrap();
        assert!(data.is_initialized().await.unwrap());
        assert_eq!(data.read_lock().await.unwrap(), LockFile::Present(None));

        fs::write(config.lock_file(), "4242\n").unwrap();
        assert_eq!(data.read_lock().await.unwrap(), LockFile::Present(Some(4242)));

        data.remove_lock().await.unwrap();
        assert!(!config.lock_file().exists());
        data.remove_lock().await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_account_switch_is_an_error_not_absence() {
        let (_dir, config) = setup();
        let data = DataDir {
            via: Some(Invocation::new("sh").args([
                "-c",
                "echo 'sudo: a password is required' >&2; exit 1",
                "sh",
            ])),
            ..DataDir::new(&config)
        };

        assert!(matches!(
            data.is_initialized().await,
            Err(BootstrapError::DataDir { .. })
        ));
        assert!(matches!(
            data.read_lock().await,
            Err(BootstrapError::LockFile { .. })
        ));
        assert!(data.remove_lock().await.is_err());
    }

    #[tokio::test]
    async fn test_unreadable_directory_is_an_error_not_absence() {
        let (_dir, config) = setup();
        fs::write(config.version_marker(), "16\n").unwrap();
        fs::set_permissions(&config.data_dir, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores directory permissions; nothing to check there.
        let denied = fs::metadata(config.version_marker()).is_err();
        let result = DataDir::new(&config).is_initialized().await;
        fs::set_permissions(&config.data_dir, fs::Permissions::from_mode(0o700)).unwrap();

        if denied {
            assert!(matches!(result, Err(BootstrapError::DataDir { .. })));
        } else {
            assert!(result.unwrap());
        }
    }
}
