// SPDX-License-Identifier: MIT OR Apache-2.0
//! lp-launch
//!
//! The process-launch engine. An [`Executor`] collects [`Initializer`]s
//! (command, working directory, environment, redirections), validates and
//! merges them into a [`LaunchPlan`], opens the redirections and hands the
//! result to a [`Launcher`]. The native launcher uses fork/exec on POSIX and
//! `CreateProcessW` on Windows. The returned [`ChildHandle`] is waited on
//! through a [`Monitor`], which yields an [`ExitOutcome`].
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod child;
mod executor;
mod initializer;
pub mod lifecycle;
mod monitor;
mod outcome;
pub mod stdio;
mod sys;

pub use child::ChildHandle;
pub use executor::{Executor, LaunchPlan, LaunchRequest, Launcher, NativeLauncher};
pub use initializer::{
    CombinationCategory, EnvEdit, EnvSource, EnvironmentSource, Initializer,
};
pub use lifecycle::{LaunchState, LaunchTracker, LaunchTransition, TransitionError};
pub use monitor::Monitor;
pub use outcome::ExitOutcome;
pub use stdio::{Endpoint, Redirector, StdStream, Stdio, StdioKind};
