// SPDX-License-Identifier: MIT OR Apache-2.0
//! POSIX `argv` construction.

use crate::CommandLine;
use lp_error::{ErrorCode, LaunchError};
use std::ffi::{CString, c_char};
use std::fmt;
use std::ptr;

/// Owned, null-terminated argument vector for `execve`.
///
/// Arguments are passed through unchanged: POSIX has no quoting layer.
pub struct PosixArgv {
    args: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl PosixArgv {
    /// Encode `cmd`, program first.
    ///
    /// Fails with `VALIDATION_INVALID_ARGUMENT` when a part contains NUL. An
    /// empty string is a valid zero-length argument.
    pub fn build(cmd: &CommandLine) -> Result<Self, LaunchError> {
        let args = cmd
            .iter()
            .enumerate()
            .map(|(index, part)| {
                CString::new(part).map_err(|e| {
                    LaunchError::new(
                        ErrorCode::ValidationInvalidArgument,
                        "argument contains a NUL character",
                    )
                    .with_context("index", index)
                    .with_source(e)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let ptrs = args
            .iter()
            .map(|a| a.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();
        Ok(Self { args, ptrs })
    }

    /// `argv` pointer; valid while `self` is alive.
    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }

    /// The encoded arguments, program first.
    pub fn args(&self) -> &[CString] {
        &self.args
    }
}

impl fmt::Debug for PosixArgv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.args).finish()
    }
}
