// SPDX-License-Identifier: MIT OR Apache-2.0
//! lp-env
//!
//! Environment model for child processes: an ordered, deduplicated
//! [`EnvironmentMap`] with platform-correct key comparison, and encoders that
//! turn it into the exact layout the native process-creation call expects
//! ([`PosixEnvBlock`] for `execve`, [`WindowsEnvBlock`] for `CreateProcessW`).
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod block;
pub mod map;
mod snapshot;

pub use block::{PosixEnvBlock, WindowsEnvBlock, decode_windows_block};
pub use map::{EnvCase, EnvVar, EnvironmentMap, Lines};
