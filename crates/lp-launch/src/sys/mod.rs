// SPDX-License-Identifier: MIT OR Apache-2.0
//! Platform launch protocols.
//!
//! Each backend exposes the same surface: `spawn`, `pipe`, `NULL_DEVICE` and
//! a `Process` type with `id`, `wait`, `try_wait`, `wait_timeout` and
//! `kill`.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use unix::{NULL_DEVICE, Process, pipe, spawn};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use windows::{NULL_DEVICE, Process, pipe, spawn};
