// SPDX-License-Identifier: MIT OR Apache-2.0
//! Native environment-block encodings.
//!
//! Both encoders are pure: they only allocate, so they run in the parent
//! before any process is created, and the child side of a POSIX launch only
//! ever reads the prepared pointers.

use crate::map::{EnvCase, EnvironmentMap};
use lp_error::{ErrorCode, LaunchError};
use std::ffi::{CString, c_char};
use std::fmt;
use std::ptr;

// ---------------------------------------------------------------------------
// POSIX
// ---------------------------------------------------------------------------

/// Null-terminated array of `name=value` C strings, as `execve` expects.
///
/// The pointer array borrows from heap buffers owned by the same value, so
/// [`as_ptr`](Self::as_ptr) stays valid for as long as the block is alive,
/// including after the block itself has been moved.
pub struct PosixEnvBlock {
    entries: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl PosixEnvBlock {
    /// Encode `map` in key order.
    pub fn encode(map: &EnvironmentMap) -> Result<Self, LaunchError> {
        map.validate()?;
        let entries = map
            .to_lines()
            .map(|line| {
                CString::new(line).map_err(|e| {
                    LaunchError::new(
                        ErrorCode::ValidationInvalidVariable,
                        "environment entry contains a NUL character",
                    )
                    .with_source(e)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let ptrs = entries
            .iter()
            .map(|s| s.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();
        Ok(Self { entries, ptrs })
    }

    /// The calling process's environment, copied byte for byte.
    ///
    /// Unlike [`EnvironmentMap::derive`], entries that are not valid UTF-8
    /// are kept, so a child launched with no explicit environment sees
    /// exactly what the parent has.
    #[cfg(unix)]
    pub fn inherit() -> Self {
        use std::os::unix::ffi::OsStrExt;

        let entries: Vec<CString> = std::env::vars_os()
            .filter_map(|(name, value)| {
                let mut line = Vec::with_capacity(name.len() + value.len() + 1);
                line.extend_from_slice(name.as_bytes());
                line.push(b'=');
                line.extend_from_slice(value.as_bytes());
                // The OS environment cannot hold NUL bytes.
                CString::new(line).ok()
            })
            .collect();
        let ptrs = entries
            .iter()
            .map(|s| s.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();
        Self { entries, ptrs }
    }

    /// Pointer to the first element of the null-terminated array.
    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }

    /// The encoded entries, without the terminating null pointer.
    pub fn entries(&self) -> &[CString] {
        &self.entries
    }

    /// The entries decoded back into `name=value` strings.
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|c| c.to_string_lossy().into_owned())
            .collect()
    }

    /// Number of entries, not counting the terminator.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the child will start with no variables.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for PosixEnvBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.entries).finish()
    }
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// Contiguous UTF-16 block `name=value\0...name=value\0\0`.
///
/// Passed to `CreateProcessW` together with `CREATE_UNICODE_ENVIRONMENT`. An
/// empty map encodes to `\0\0`, which gives the child an empty environment
/// rather than the parent's.
#[derive(Clone, PartialEq, Eq)]
pub struct WindowsEnvBlock {
    units: Vec<u16>,
}

impl WindowsEnvBlock {
    /// Encode `map`.
    ///
    /// The block must be sorted case-insensitively with one entry per name.
    /// A case-sensitive map is re-folded first, so `Path` and `PATH` collapse
    /// to whichever sorts last.
    pub fn encode(map: &EnvironmentMap) -> Result<Self, LaunchError> {
        map.validate()?;
        let folded;
        let map = if map.case() == EnvCase::Insensitive {
            map
        } else {
            let mut m = EnvironmentMap::with_case(EnvCase::Insensitive);
            m.extend(map.iter());
            folded = m;
            &folded
        };

        let mut units = Vec::new();
        for line in map.to_lines() {
            units.extend(line.encode_utf16());
            units.push(0);
        }
        if units.is_empty() {
            units.push(0);
        }
        units.push(0);
        Ok(Self { units })
    }

    /// The raw UTF-16 units including both terminators.
    pub fn as_slice(&self) -> &[u16] {
        &self.units
    }

    /// Pointer handed to `lpEnvironment`.
    pub fn as_ptr(&self) -> *const u16 {
        self.units.as_ptr()
    }
}

impl fmt::Debug for WindowsEnvBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(decode_windows_block(&self.units))
            .finish()
    }
}

/// Split a UTF-16 environment block back into its `name=value` lines.
///
/// Stops at the first empty entry, so trailing data after the double NUL is
/// ignored. Unpaired surrogates are replaced with U+FFFD.
pub fn decode_windows_block(units: &[u16]) -> Vec<String> {
    units
        .split(|&u| u == 0)
        .take_while(|entry| !entry.is_empty())
        .map(String::from_utf16_lossy)
        .collect()
}
