// SPDX-License-Identifier: MIT OR Apache-2.0
//! Waiting on a launched child.

use crate::child::ChildHandle;
use crate::outcome::ExitOutcome;
use lp_error::{ErrorCode, LaunchError};
use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Waits for a [`ChildHandle`] and remembers how it ended.
///
/// The first successful wait caches the outcome; every later call returns
/// the cached value without asking the OS again. A failed wait is cached as
/// [`ExitOutcome::Unknown`] and the error stays available through
/// [`last_error`](Self::last_error).
#[derive(Debug)]
pub struct Monitor {
    child: ChildHandle,
    outcome: Option<ExitOutcome>,
    last_error: Option<LaunchError>,
}

impl Monitor {
    /// Supervise `child`.
    pub fn new(child: ChildHandle) -> Self {
        Self {
            child,
            outcome: None,
            last_error: None,
        }
    }

    /// Block until the child terminates.
    pub fn join(&mut self) -> ExitOutcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        let result = self.child.wait().map(Some);
        self.record(result).unwrap_or(ExitOutcome::Unknown)
    }

    /// Poll without blocking. `None` while the child is still running.
    pub fn try_join(&mut self) -> Option<ExitOutcome> {
        if self.outcome.is_some() {
            return self.outcome;
        }
        let result = self.child.try_wait();
        self.record(result)
    }

    /// Wait at most `timeout`. `None` if the child is still running.
    pub fn join_timeout(&mut self, timeout: Duration) -> Option<ExitOutcome> {
        if self.outcome.is_some() {
            return self.outcome;
        }
        let result = self.child.wait_timeout(timeout);
        self.record(result)
    }

    /// Run [`join`](Self::join) on tokio's blocking pool.
    pub async fn join_async(mut self) -> Result<(Self, ExitOutcome), LaunchError> {
        tokio::task::spawn_blocking(move || {
            let outcome = self.join();
            (self, outcome)
        })
        .await
        .map_err(|e| LaunchError::new(ErrorCode::Internal, "wait task failed").with_source(e))
    }

    /// Cached outcome, if the child has been reaped.
    pub fn outcome(&self) -> Option<ExitOutcome> {
        self.outcome
    }

    /// The error behind an [`ExitOutcome::Unknown`].
    pub fn last_error(&self) -> Option<&LaunchError> {
        self.last_error.as_ref()
    }

    /// Terminate the child. A no-op after it has been reaped.
    pub fn kill(&mut self) -> Result<(), LaunchError> {
        if self.outcome.is_some() {
            return Ok(());
        }
        self.child.kill()
    }

    /// OS process identifier.
    pub fn pid(&self) -> u32 {
        self.child.pid()
    }

    /// Access the stream ends.
    pub fn child_mut(&mut self) -> &mut ChildHandle {
        &mut self.child
    }

    /// Give back the handle.
    pub fn into_child(self) -> ChildHandle {
        self.child
    }

    fn record(&mut self, result: io::Result<Option<ExitOutcome>>) -> Option<ExitOutcome> {
        let pid = self.child.pid();
        match result {
            Ok(Some(outcome)) => {
                info!(target: "lp.monitor", pid, %outcome, "child terminated");
                self.outcome = Some(outcome);
            }
            Ok(None) => {
                debug!(target: "lp.monitor", pid, "child still running");
            }
            Err(e) => {
                warn!(target: "lp.monitor", pid, error = %e, "wait failed");
                self.child.mark_reaped();
                self.last_error = Some(
                    LaunchError::from_io(ErrorCode::WaitFailed, "cannot wait for child", e)
                        .with_context("pid", pid),
                );
                self.outcome = Some(ExitOutcome::Unknown);
            }
        }
        self.outcome
    }
}
