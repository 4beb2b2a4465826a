// SPDX-License-Identifier: MIT OR Apache-2.0
//! Launch state machine: tracks and enforces valid state transitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Where a launch attempt currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchState {
    /// Initializers are being collected and validated.
    Building,
    /// OS resources are being acquired and the platform call is running.
    Launching,
    /// A child process exists.
    Succeeded,
    /// The attempt failed; every acquired resource has been released.
    LaunchFailed,
}

impl LaunchState {
    /// `true` for states with no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::LaunchFailed)
    }
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Building => "building",
            Self::Launching => "launching",
            Self::Succeeded => "succeeded",
            Self::LaunchFailed => "launch_failed",
        };
        f.write_str(s)
    }
}

/// Record of a single state transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LaunchTransition {
    /// State before the transition.
    pub from: LaunchState,
    /// State after the transition.
    pub to: LaunchState,
    /// RFC 3339 timestamp of the transition.
    pub timestamp: String,
    /// Optional human-readable reason.
    pub reason: Option<String>,
}

/// Rejected transition.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The state machine does not allow this edge.
    #[error("invalid launch transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: LaunchState,
        /// Requested state.
        to: LaunchState,
    },
    /// The tracker is already in the requested state.
    #[error("already in state {0}")]
    AlreadyInState(LaunchState),
}

/// Enforces `Building → Launching → {Succeeded, LaunchFailed}`.
///
/// A failure during validation moves straight from `Building` to
/// `LaunchFailed`.
#[derive(Debug)]
pub struct LaunchTracker {
    state: LaunchState,
    history: Vec<LaunchTransition>,
    started: Instant,
}

impl LaunchTracker {
    /// New tracker in [`LaunchState::Building`].
    pub fn new() -> Self {
        Self {
            state: LaunchState::Building,
            history: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Current state.
    pub fn state(&self) -> LaunchState {
        self.state
    }

    /// Move to `to`, recording the transition.
    pub fn transition(
        &mut self,
        to: LaunchState,
        reason: Option<String>,
    ) -> Result<(), TransitionError> {
        if self.state == to {
            return Err(TransitionError::AlreadyInState(to));
        }
        if !self.can_transition(to) {
            return Err(TransitionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        let from = self.state;
        self.state = to;
        self.history.push(LaunchTransition {
            from,
            to,
            timestamp: chrono::Utc::now().to_rfc3339(),
            reason,
        });
        Ok(())
    }

    /// Whether moving from the current state to `to` is allowed.
    pub fn can_transition(&self, to: LaunchState) -> bool {
        matches!(
            (self.state, to),
            (LaunchState::Building, LaunchState::Launching)
                | (LaunchState::Building, LaunchState::LaunchFailed)
                | (LaunchState::Launching, LaunchState::Succeeded)
                | (LaunchState::Launching, LaunchState::LaunchFailed)
        )
    }

    /// Every transition so far, oldest first.
    pub fn history(&self) -> &[LaunchTransition] {
        &self.history
    }

    /// Time since the tracker was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for LaunchTracker {
    fn default() -> Self {
        Self::new()
    }
}
