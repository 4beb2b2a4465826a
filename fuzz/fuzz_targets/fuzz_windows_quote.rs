// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz Windows command-line rendering.
//!
//! For any argument vector without NUL bytes, splitting the rendered line
//! with the C runtime rules must give back the original vector. Vectors
//! containing NUL must be rejected, never rendered.
#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lp_cmdline::{CommandLine, split_windows_command_line};

#[derive(Debug, Arbitrary)]
struct Argv {
    program: String,
    args: Vec<String>,
}

fuzz_target!(|input: Argv| {
    // The program token follows different rules (no backslash escapes), so
    // only simple program names are checked for an exact round trip.
    let simple_program = !input.program.is_empty()
        && !input
            .program
            .chars()
            .any(|c| matches!(c, '"' | '\\' | ' ' | '\t' | '\n' | '\x0b' | '\0'));
    let program = if simple_program {
        input.program.clone()
    } else {
        "prog".to_string()
    };

    let cmd = CommandLine::new(program.clone()).args(input.args.iter().cloned());
    let has_nul = input.args.iter().any(|a| a.contains('\0'));
    match cmd.to_windows_command_line() {
        Ok(line) => {
            assert!(!has_nul, "NUL argument was rendered");
            let parsed = split_windows_command_line(&line);
            let mut expected = vec![program];
            expected.extend(input.args);
            assert_eq!(parsed, expected, "line: {line:?}");
        }
        Err(_) => assert!(has_nul, "rendering failed without a NUL"),
    }
});
