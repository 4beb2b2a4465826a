// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz the Windows command-line splitter with arbitrary text.
//!
//! Splitting never panics, and re-rendering a split result and splitting it
//! again is stable.
#![no_main]
use libfuzzer_sys::fuzz_target;
use lp_cmdline::{CommandLine, split_windows_command_line};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let parts = split_windows_command_line(s);
    if parts.iter().skip(1).any(|p| p.contains('\0')) {
        return;
    }
    let Some((_, args)) = parts.split_first() else {
        return;
    };
    let cmd = CommandLine::new("prog").args(args.iter().cloned());
    if let Ok(line) = cmd.to_windows_command_line() {
        let again = split_windows_command_line(&line);
        assert_eq!(&again[1..], args);
    }
});
