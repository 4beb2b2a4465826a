// SPDX-License-Identifier: MIT OR Apache-2.0
//! Descriptor accounting around failed and successful launches.
//!
//! Every test here is `#[serial]` and lives in its own binary so the
//! descriptor count is not disturbed by other tests.
#![cfg(target_os = "linux")]

use lp_cmdline::CommandLine;
use lp_error::ErrorCode;
use lp_launch::{Executor, StdStream, Stdio};
use serial_test::serial;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;

fn open_fds() -> usize {
    std::fs::read_dir("/proc/self/fd").unwrap().count()
}

#[test]
#[serial]
fn unresolvable_program_leaks_nothing() {
    let before = open_fds();
    let err = Executor::new()
        .with(CommandLine::new("/no/such/program"))
        .redirect(StdStream::Stdout, Stdio::Piped)
        .launch()
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationExecutableNotFound);
    assert_eq!(open_fds(), before);
}

#[test]
#[serial]
fn exec_failure_leaks_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain");
    std::fs::write(&path, "not a program").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

    let before = open_fds();
    let err = Executor::new()
        .with(CommandLine::new(path.to_str().unwrap()))
        .redirect(StdStream::Stdin, Stdio::Piped)
        .redirect(StdStream::Stdout, Stdio::Piped)
        .redirect(StdStream::Stderr, Stdio::Null)
        .launch()
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::LaunchExecFailed);
    assert_eq!(open_fds(), before);
}

#[test]
#[serial]
fn successful_launch_keeps_only_parent_ends() {
    let before = open_fds();
    let mut child = Executor::new()
        .with(CommandLine::new("/bin/sh").args(["-c", "echo done"]))
        .redirect(StdStream::Stdin, Stdio::Piped)
        .redirect(StdStream::Stdout, Stdio::Piped)
        .launch()
        .unwrap();
    // stdin write end + stdout read end.
    assert_eq!(open_fds(), before + 2);

    drop(child.stdin.take());
    let mut out = String::new();
    child.stdout.take().unwrap().read_to_string(&mut out).unwrap();
    assert_eq!(out, "done\n");
    child.monitor().join();
    assert_eq!(open_fds(), before);
}

#[test]
#[serial]
fn child_sees_only_standard_descriptors() {
    let mut child = Executor::new()
        .with(CommandLine::new("/bin/sh").args(["-c", "ls /proc/self/fd | wc -l"]))
        .redirect(StdStream::Stdout, Stdio::Piped)
        .launch()
        .unwrap();
    let mut out = String::new();
    child.stdout.take().unwrap().read_to_string(&mut out).unwrap();
    child.monitor().join();
    // 0, 1, 2, plus the directory handle `ls` itself opens.
    let n: usize = out.trim().parse().unwrap();
    assert!(n <= 4, "child inherited {n} descriptors");
}
