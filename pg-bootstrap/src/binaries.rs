//! PostgreSQL binary discovery
//!
//! All tools must come from one directory so initdb and the server agree on
//! the on-disk format.

use crate::error::{BootstrapError, Result};
use common::{clear_libpq_env, CommandOutput};
use std::cmp::Reverse;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// External tools the bootstrapper invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    InitDb,
    Postgres,
    PgIsReady,
    Psql,
    CreateDb,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Tool::InitDb,
        Tool::Postgres,
        Tool::PgIsReady,
        Tool::Psql,
        Tool::CreateDb,
    ];

    pub fn binary_name(self) -> &'static str {
        match self {
            Tool::InitDb => "initdb",
            Tool::Postgres => "postgres",
            Tool::PgIsReady => "pg_isready",
            Tool::Psql => "psql",
            Tool::CreateDb => "createdb",
        }
    }
}

/// A program plus arguments, optionally wrapped in `sudo -u <account>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// `sudo -u <account> --`, ready for a program and its arguments.
    pub fn sudo_as(account: &str) -> Self {
        Self::new("sudo").args(["-u", account, "--"])
    }

    /// `program`, run through `sudo -u <account>` when an account is given.
    pub fn as_account(program: impl Into<String>, run_as: Option<&str>) -> Self {
        match run_as {
            Some(account) => Self::sudo_as(account).arg(program),
            None => Self::new(program),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub async fn run(&self) -> anyhow::Result<CommandOutput> {
        common::run(&self.program, &self.args).await
    }

    pub async fn run_with_input(&self, input: &str) -> anyhow::Result<CommandOutput> {
        common::run_with_input(&self.program, &self.args, input).await
    }

    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        clear_libpq_env(&mut cmd).args(&self.args);
        cmd
    }
}

/// Directory holding a complete set of PostgreSQL tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binaries {
    dir: PathBuf,
}

impl Binaries {
    /// Locate the tools: explicit directory, then `PATH`, then well-known
    /// install roots.
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        let candidates = candidate_dirs(explicit, env::var_os("PATH"));
        Self::locate_in(&candidates)
    }

    /// First candidate that holds every tool.
    pub fn locate_in(candidates: &[PathBuf]) -> Result<Self> {
        if let Some(dir) = candidates.iter().find(|dir| missing_tools(dir).is_empty()) {
            return Ok(Self { dir: dir.clone() });
        }

        // Report against the first directory that had anything at all.
        let missing = candidates
            .iter()
            .map(|dir| missing_tools(dir))
            .find(|m| m.len() < Tool::ALL.len())
            .unwrap_or_else(|| Tool::ALL.to_vec());

        Err(BootstrapError::MissingBinaries {
            missing: missing
                .iter()
                .map(|t| t.binary_name())
                .collect::<Vec<_>>()
                .join(", "),
            searched: candidates
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(":"),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, tool: Tool) -> PathBuf {
        self.dir.join(tool.binary_name())
    }

    /// Invocation of `tool`, run as `run_as` when given.
    pub fn invocation(&self, tool: Tool, run_as: Option<&str>) -> Invocation {
        Invocation::as_account(self.path(tool).to_string_lossy(), run_as)
    }
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn missing_tools(dir: &Path) -> Vec<Tool> {
    Tool::ALL
        .into_iter()
        .filter(|tool| !is_executable(&dir.join(tool.binary_name())))
        .collect()
}

/// Search order for tool directories.
pub fn candidate_dirs(explicit: Option<&Path>, path_var: Option<OsString>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Some(dir) = explicit {
        // An explicit directory is authoritative.
        dirs.push(dir.to_path_buf());
        return dirs;
    }

    if let Some(path_var) = path_var {
        dirs.extend(env::split_paths(&path_var).filter(|p| !p.as_os_str().is_empty()));
    }

    dirs.extend(versioned_dirs(Path::new("/usr/lib/postgresql"), "", "bin"));
    dirs.extend(versioned_dirs(Path::new("/usr"), "pgsql-", "bin"));
    dirs.push(PathBuf::from("/usr/local/pgsql/bin"));
    dirs.extend(versioned_dirs(Path::new("/opt/homebrew/opt"), "postgresql", "bin"));
    dirs.extend(versioned_dirs(Path::new("/usr/local/opt"), "postgresql", "bin"));
    dirs.push(PathBuf::from(
        "/Applications/Postgres.app/Contents/Versions/latest/bin",
    ));

    let mut seen = std::collections::HashSet::new();
    dirs.retain(|d| seen.insert(d.clone()));
    dirs
}

/// `<root>/<prefix><version>/<sub>` entries, newest version first.
fn versioned_dirs(root: &Path, prefix: &str, sub: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };

    let mut found: Vec<(Vec<u32>, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let rest = name.strip_prefix(prefix)?;
            Some((parse_version(rest), entry.path().join(sub)))
        })
        .collect();

    found.sort_by_key(|(version, _)| Reverse(version.clone()));
    found.into_iter().map(|(_, path)| path).collect()
}

/// Numeric components of a version suffix: "16" → [16], "@15" → [15], "9.6" → [9, 6].
fn parse_version(s: &str) -> Vec<u32> {
    s.split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok())
        .collect()
}
