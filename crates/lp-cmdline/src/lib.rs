// SPDX-License-Identifier: MIT OR Apache-2.0
//! lp-cmdline
//!
//! The program-and-arguments half of a launch: [`CommandLine`] holds what the
//! caller asked for, [`PosixArgv`] turns it into the `argv` array `execve`
//! reads, [`quote_windows_arg`] and friends produce the single string
//! `CreateProcessW` parses, and [`resolve_executable`] finds the file to run.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod argv;
pub mod quote;
pub mod resolve;

pub use argv::PosixArgv;
pub use quote::{quote_windows_arg, split_windows_command_line};
pub use resolve::{resolve_executable, which};

use lp_error::LaunchError;
use serde::{Deserialize, Serialize};

/// A program followed by zero or more arguments.
///
/// No quoting or validation happens here; both are deferred to the platform
/// encoders so the same value can be rendered for either OS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandLine {
    program: String,
    #[serde(default)]
    args: Vec<String>,
}

impl CommandLine {
    /// Start a command line with `program` and no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program as given by the caller (not resolved).
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The arguments, without the program.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Program first, then every argument.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }

    /// Render the single command-line string `CreateProcessW` expects.
    pub fn to_windows_command_line(&self) -> Result<String, LaunchError> {
        let mut out = String::new();
        for (i, part) in self.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            quote_windows_arg(part, &mut out)?;
        }
        Ok(out)
    }
}

impl<S: Into<String>> FromIterator<S> for CommandLine {
    /// The first item is the program. An empty iterator yields an empty
    /// program, which the executor rejects as unresolvable.
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut it = iter.into_iter();
        let program = it.next().map(Into::into).unwrap_or_default();
        Self::new(program).args(it)
    }
}
