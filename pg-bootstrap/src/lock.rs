//! Server lock file inspection
//!
//! `postmaster.pid` belongs to the server. We only read it, and delete it
//! once a liveness check says its owner is gone. File access itself lives in
//! [`crate::datadir`].

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs;

/// Parse the pid from lock file contents (first line).
pub fn parse_lock_pid(content: &str) -> Option<i32> {
    content
        .lines()
        .next()
        .and_then(|line| line.trim().parse::<i32>().ok())
        .filter(|pid| *pid > 0)
}

/// Whether any process with this pid exists.
///
/// EPERM means it exists but belongs to another user.
pub fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Whether `pid` is a live PostgreSQL server process.
///
/// Where `/proc` is available the command name must look like the server,
/// so a recycled pid is not mistaken for the lock owner.
pub fn is_server_process(pid: i32) -> bool {
    if !process_alive(pid) {
        return false;
    }
    match fs::read_to_string(format!("/proc/{}/comm", pid)) {
        Ok(comm) => looks_like_server(comm.trim()),
        Err(_) => true,
    }
}

fn looks_like_server(comm: &str) -> bool {
    comm.starts_with("postgres") || comm.starts_with("postmaster")
}
