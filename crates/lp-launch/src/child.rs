// SPDX-License-Identifier: MIT OR Apache-2.0
//! Handle to a running child process.

use crate::monitor::Monitor;
use crate::outcome::ExitOutcome;
use crate::sys;
use lp_error::{ErrorCode, LaunchError};
use std::fs::File;
use std::io;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Supervision {
    Attached,
    Reaped,
    Detached,
}

/// A launched process and the parent ends of its redirected streams.
///
/// Dropping a handle does not wait for or kill the child. A handle dropped
/// while still attached only logs a warning, and on POSIX the exited child
/// stays a zombie until the parent exits. Call `monitor().join()` (or
/// [`Monitor::join_timeout`]) to reap it, or [`detach`](Self::detach) to
/// give up supervision on purpose.
#[derive(Debug)]
pub struct ChildHandle {
    process: sys::Process,
    /// Write end of a piped stdin.
    pub stdin: Option<File>,
    /// Read end of a piped stdout.
    pub stdout: Option<File>,
    /// Read end of a piped stderr.
    pub stderr: Option<File>,
    supervision: Supervision,
}

impl ChildHandle {
    pub(crate) fn new(
        process: sys::Process,
        stdin: Option<File>,
        stdout: Option<File>,
        stderr: Option<File>,
    ) -> Self {
        Self {
            process,
            stdin,
            stdout,
            stderr,
            supervision: Supervision::Attached,
        }
    }

    /// OS process identifier.
    pub fn pid(&self) -> u32 {
        self.process.id()
    }

    /// Terminate the process (SIGKILL / `TerminateProcess`).
    ///
    /// A no-op once the process has been reaped.
    pub fn kill(&mut self) -> Result<(), LaunchError> {
        if self.supervision == Supervision::Reaped {
            return Ok(());
        }
        self.process.kill().map_err(|e| {
            LaunchError::from_io(ErrorCode::WaitKillFailed, "cannot terminate child", e)
                .with_context("pid", self.pid())
        })?;
        debug!(target: "lp.launch", pid = self.pid(), "kill sent");
        Ok(())
    }

    /// Give up supervision. The process keeps running and is never reaped
    /// by this handle.
    pub fn detach(mut self) -> u32 {
        self.supervision = Supervision::Detached;
        debug!(target: "lp.launch", pid = self.pid(), "detached");
        self.pid()
    }

    /// Wrap the handle in a [`Monitor`].
    pub fn monitor(self) -> Monitor {
        Monitor::new(self)
    }

    pub(crate) fn wait(&mut self) -> io::Result<ExitOutcome> {
        let outcome = self.process.wait()?;
        self.supervision = Supervision::Reaped;
        Ok(outcome)
    }

    pub(crate) fn try_wait(&mut self) -> io::Result<Option<ExitOutcome>> {
        let outcome = self.process.try_wait()?;
        if outcome.is_some() {
            self.supervision = Supervision::Reaped;
        }
        Ok(outcome)
    }

    pub(crate) fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitOutcome>> {
        let outcome = self.process.wait_timeout(timeout)?;
        if outcome.is_some() {
            self.supervision = Supervision::Reaped;
        }
        Ok(outcome)
    }

    // A failed wait still ends supervision; the drop warning would be noise.
    pub(crate) fn mark_reaped(&mut self) {
        self.supervision = Supervision::Reaped;
    }
}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        if self.supervision == Supervision::Attached {
            warn!(
                target: "lp.launch",
                pid = self.pid(),
                "child handle dropped without being waited on or detached"
            );
        }
    }
}
