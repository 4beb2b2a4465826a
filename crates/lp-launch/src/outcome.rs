// SPDX-License-Identifier: MIT OR Apache-2.0
//! Termination status of a launched child.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExitOutcome {
    /// The process returned from `main` or called `exit`.
    Exited {
        /// Exit status reported by the OS.
        code: i32,
    },
    /// The process was terminated by a signal (POSIX only).
    Signaled {
        /// Signal number.
        signal: i32,
    },
    /// Waiting failed, so the real status is not known.
    Unknown,
}

impl ExitOutcome {
    /// `true` only for `Exited { code: 0 }`.
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited { code: 0 })
    }

    /// The exit code, if the process exited normally.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited { code } => Some(*code),
            _ => None,
        }
    }

    /// The terminating signal, if any.
    pub fn signal(&self) -> Option<i32> {
        match self {
            Self::Signaled { signal } => Some(*signal),
            _ => None,
        }
    }

    /// Status a shell would report: the code, `128 + signal`, or `1` when
    /// unknown.
    pub fn shell_status(&self) -> i32 {
        match self {
            Self::Exited { code } => *code,
            Self::Signaled { signal } => 128 + signal,
            Self::Unknown => 1,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited { code } => write!(f, "exited with code {code}"),
            Self::Signaled { signal } => write!(f, "terminated by signal {signal}"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}
