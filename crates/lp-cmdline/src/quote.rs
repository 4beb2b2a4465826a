// SPDX-License-Identifier: MIT OR Apache-2.0
//! Windows command-line quoting.
//!
//! `CreateProcessW` receives one string; the child's C runtime splits it
//! again. These functions follow the runtime's rules so every argument
//! survives the trip unchanged.

use lp_error::{ErrorCode, LaunchError};

fn needs_quotes(arg: &str) -> bool {
    arg.is_empty() || arg.contains([' ', '\t', '\n', '\x0b', '"'])
}

fn push_backslashes(out: &mut String, n: usize) {
    out.extend(std::iter::repeat_n('\\', n));
}

/// Append `arg` to `out`, quoted if needed.
///
/// Arguments that are empty or contain space, tab, newline, vertical tab or
/// `"` are wrapped in quotes. Inside quotes, `n` backslashes followed by `"`
/// become `2n + 1` backslashes and the quote; `n` trailing backslashes become
/// `2n`. Everything else is copied verbatim.
pub fn quote_windows_arg(arg: &str, out: &mut String) -> Result<(), LaunchError> {
    if arg.contains('\0') {
        return Err(LaunchError::new(
            ErrorCode::ValidationInvalidArgument,
            "argument contains a NUL character",
        ));
    }
    if !needs_quotes(arg) {
        out.push_str(arg);
        return Ok(());
    }

    out.push('"');
    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                push_backslashes(out, backslashes + 1);
                backslashes = 0;
            }
            _ => backslashes = 0,
        }
        out.push(c);
    }
    push_backslashes(out, backslashes);
    out.push('"');
    Ok(())
}

/// Split a command line into arguments using the C runtime's rules.
///
/// Every token, including the first, follows the argument rules, which is
/// the inverse of [`quote_windows_arg`].
pub fn split_windows_command_line(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_arg = false;
    let mut in_quotes = false;
    let mut backslashes = 0usize;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                backslashes += 1;
                in_arg = true;
            }
            '"' => {
                push_backslashes(&mut cur, backslashes / 2);
                if backslashes % 2 == 1 {
                    cur.push('"');
                } else if in_quotes && chars.peek() == Some(&'"') {
                    cur.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
                backslashes = 0;
                in_arg = true;
            }
            ' ' | '\t' if !in_quotes => {
                push_backslashes(&mut cur, backslashes);
                backslashes = 0;
                if in_arg {
                    out.push(std::mem::take(&mut cur));
                    in_arg = false;
                }
            }
            _ => {
                push_backslashes(&mut cur, backslashes);
                backslashes = 0;
                cur.push(c);
                in_arg = true;
            }
        }
    }
    push_backslashes(&mut cur, backslashes);
    if in_arg {
        out.push(cur);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quoted(arg: &str) -> String {
        let mut s = String::new();
        quote_windows_arg(arg, &mut s).unwrap();
        s
    }

    #[test]
    fn plain_arguments_are_verbatim() {
        assert_eq!(quoted("abc"), "abc");
        assert_eq!(quoted(r"C:\dir\file"), r"C:\dir\file");
        assert_eq!(quoted(r"trailing\"), r"trailing\");
    }

    #[test]
    fn whitespace_triggers_quotes() {
        assert_eq!(quoted("a b"), r#""a b""#);
        assert_eq!(quoted("a\tb"), "\"a\tb\"");
        assert_eq!(quoted("a\nb"), "\"a\nb\"");
        assert_eq!(quoted("a\x0bb"), "\"a\x0bb\"");
    }

    #[test]
    fn empty_argument_becomes_pair_of_quotes() {
        assert_eq!(quoted(""), r#""""#);
    }

    #[test]
    fn quote_is_escaped() {
        assert_eq!(quoted(r#"a"b"#), r#""a\"b""#);
        assert_eq!(quoted(r#"a\"b"#), r#""a\\\"b""#);
    }

    #[test]
    fn trailing_backslashes_doubled_when_quoted() {
        assert_eq!(quoted(r"a b\"), r#""a b\\""#);
        assert_eq!(quoted(r"a b\\"), r#""a b\\\\""#);
    }

    #[test]
    fn nul_is_rejected() {
        let err = quote_windows_arg("a\0", &mut String::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationInvalidArgument);
    }

    #[test]
    fn split_handles_runtime_rules() {
        assert_eq!(split_windows_command_line(r#"a "b c" d"#), vec!["a", "b c", "d"]);
        assert_eq!(split_windows_command_line(r#""" x"#), vec!["", "x"]);
        assert_eq!(split_windows_command_line(r#"a\\\"b"#), vec![r#"a\"b"#]);
        assert_eq!(split_windows_command_line(r"a\\b c"), vec![r"a\\b", "c"]);
        assert_eq!(split_windows_command_line("  a   b  "), vec!["a", "b"]);
        assert!(split_windows_command_line("").is_empty());
    }

    #[test]
    fn split_inverts_quote() {
        let args = ["", "a b", r#"x"y"#, r"tail\", r"sp ace\", "tab\there"];
        let mut line = String::new();
        for (i, a) in args.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            quote_windows_arg(a, &mut line).unwrap();
        }
        assert_eq!(split_windows_command_line(&line), args);
    }
}
