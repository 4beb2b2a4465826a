// SPDX-License-Identifier: MIT OR Apache-2.0
//! Capture of the calling process's environment.

#[cfg(windows)]
use crate::map::EnvVar;
use crate::map::{EnvCase, EnvironmentMap};
use lp_error::LaunchError;
use tracing::debug;
#[cfg(unix)]
use tracing::warn;

#[cfg(unix)]
pub(crate) fn capture() -> Result<EnvironmentMap, LaunchError> {
    let mut map = EnvironmentMap::with_case(EnvCase::Sensitive);
    let mut skipped = 0usize;
    for (name, value) in std::env::vars_os() {
        match (name.into_string(), value.into_string()) {
            (Ok(name), Ok(value)) => {
                map.set(name, value);
            }
            (name, _) => {
                skipped += 1;
                warn!(
                    target: "lp.env",
                    name = ?name.unwrap_or_else(|n| n.to_string_lossy().into_owned()),
                    "skipping environment variable that is not valid UTF-8"
                );
            }
        }
    }
    debug!(target: "lp.env", vars = map.len(), skipped, "derived environment");
    Ok(map)
}

#[cfg(windows)]
pub(crate) fn capture() -> Result<EnvironmentMap, LaunchError> {
    let units = win::environment_strings()?;
    let mut map = EnvironmentMap::with_case(EnvCase::Insensitive);
    for line in crate::block::decode_windows_block(&units) {
        let var = EnvVar::parse(&line);
        map.set(var.name, var.value);
    }
    debug!(target: "lp.env", vars = map.len(), "derived environment");
    Ok(map)
}

#[cfg(windows)]
#[allow(unsafe_code)]
mod win {
    use lp_error::{ErrorCode, LaunchError};
    use std::io;
    use windows_sys::Win32::System::Environment::{
        FreeEnvironmentStringsW, GetEnvironmentStringsW,
    };

    // Frees the block on every exit path, including a panic while copying.
    struct Strings(*mut u16);

    impl Drop for Strings {
        fn drop(&mut self) {
            // SAFETY: pointer came from GetEnvironmentStringsW and is freed once.
            unsafe {
                FreeEnvironmentStringsW(self.0);
            }
        }
    }

    /// Copy the current block, both terminators included.
    pub(super) fn environment_strings() -> Result<Vec<u16>, LaunchError> {
        // SAFETY: no preconditions; null signals failure.
        let raw = unsafe { GetEnvironmentStringsW() };
        if raw.is_null() {
            return Err(LaunchError::from_io(
                ErrorCode::SystemEnvironmentUnavailable,
                "GetEnvironmentStringsW failed",
                io::Error::last_os_error(),
            ));
        }
        let guard = Strings(raw);

        let mut len = 0usize;
        // SAFETY: the block is terminated by two consecutive NULs, so every
        // read below stays inside it.
        unsafe {
            while !(*guard.0.add(len) == 0 && *guard.0.add(len + 1) == 0) {
                len += 1;
            }
            Ok(std::slice::from_raw_parts(guard.0, len + 2).to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_uses_native_case() {
        let map = capture().unwrap();
        assert_eq!(map.case(), EnvCase::native());
    }

    #[test]
    fn capture_contains_path() {
        let map = capture().unwrap();
        assert!(map.contains("PATH"));
    }
}
