// SPDX-License-Identifier: MIT OR Apache-2.0
//! Executable discovery.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::trace;

const WINDOWS_EXTENSIONS: [&str; 4] = [".exe", ".cmd", ".bat", ".com"];

/// Locate `program` the way the launcher will see it.
///
/// * Absolute paths are checked as-is.
/// * Paths with a directory component are joined onto `cwd_base`, the
///   parent's current directory (not the child's working directory).
/// * Bare names are searched in each entry of `search_path`, itself a
///   `PATH`-style list. Relative entries are taken relative to `cwd_base`.
///
/// On Windows a name without a match is retried with `.exe`, `.cmd`, `.bat`
/// and `.com` appended. Only existence is checked; whether the file can
/// actually be executed is left to the OS.
pub fn resolve_executable(
    program: &str,
    cwd_base: &Path,
    search_path: Option<&OsStr>,
) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    let candidate = Path::new(program);
    if candidate.is_absolute() || has_dir_component(candidate) {
        let full = cwd_base.join(candidate);
        return with_extensions(&full);
    }

    let path = search_path?;
    std::env::split_paths(path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .find_map(|dir| {
            let dir = cwd_base.join(dir);
            trace!(target: "lp.launch", dir = %dir.display(), program, "probing");
            with_extensions(&dir.join(program))
        })
}

/// Resolve `program` against the current process's directory and `PATH`.
pub fn which(program: &str) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let path = std::env::var_os("PATH");
    resolve_executable(program, &cwd, path.as_deref())
}

fn has_dir_component(candidate: &Path) -> bool {
    candidate.components().count() > 1
}

fn with_extensions(full: &Path) -> Option<PathBuf> {
    if full.is_file() {
        return Some(full.to_path_buf());
    }
    if !cfg!(windows) {
        return None;
    }
    WINDOWS_EXTENSIONS
        .into_iter()
        .map(|ext| {
            let mut s = full.as_os_str().to_owned();
            s.push(ext);
            PathBuf::from(s)
        })
        .find(|p| p.is_file())
}
