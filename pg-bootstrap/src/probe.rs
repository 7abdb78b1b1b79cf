//! pg_isready result mapping

use std::fmt;

/// Connection status reported by `pg_isready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Exit 0: accepting connections
    Accepting,
    /// Exit 1: up but rejecting (startup or shutdown in progress)
    Rejecting,
    /// Exit 2: nothing answered
    NoResponse,
    /// Exit 3 or killed: the probe itself could not run
    NoAttempt,
}

impl ProbeStatus {
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Self::Accepting,
            Some(1) => Self::Rejecting,
            Some(2) => Self::NoResponse,
            _ => Self::NoAttempt,
        }
    }

    pub fn is_ready(self) -> bool {
        self == Self::Accepting
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Accepting => "accepting connections",
            Self::Rejecting => "rejecting connections",
            Self::NoResponse => "no response",
            Self::NoAttempt => "no attempt made",
        };
        f.write_str(s)
    }
}
