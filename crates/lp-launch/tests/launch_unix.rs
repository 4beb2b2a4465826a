// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end launches through the POSIX fork/exec protocol.
#![cfg(unix)]

use lp_cmdline::{CommandLine, which};
use lp_env::EnvironmentMap;
use lp_error::ErrorCode;
use lp_launch::{EnvEdit, EnvSource, ExitOutcome, Executor, LaunchState, StdStream, Stdio};
use serial_test::serial;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

// ── helpers ─────────────────────────────────────────────────────────────

const EACCES: i32 = 13;

fn sh(script: &str) -> CommandLine {
    CommandLine::new("/bin/sh").args(["-c", script])
}

fn bin(name: &str) -> String {
    which(name)
        .unwrap_or_else(|| panic!("{name} not found on PATH"))
        .to_string_lossy()
        .into_owned()
}

fn read_all(file: &mut Option<std::fs::File>) -> String {
    let mut out = String::new();
    file.take().unwrap().read_to_string(&mut out).unwrap();
    out
}

// ── environment ─────────────────────────────────────────────────────────

#[test]
fn clean_environment_with_one_variable() {
    let mut child = Executor::new()
        .with(CommandLine::new(bin("env")))
        .with(EnvSource::Clean)
        .env("A", "1")
        .redirect(StdStream::Stdout, Stdio::Piped)
        .launch()
        .unwrap();
    let out = read_all(&mut child.stdout);
    assert_eq!(out, "A=1\n");
    assert!(child.monitor().join().success());
}

#[test]
fn empty_environment_prints_nothing() {
    let mut child = Executor::new()
        .with(CommandLine::new(bin("env")))
        .with(EnvSource::Clean)
        .redirect(StdStream::Stdout, Stdio::Piped)
        .launch()
        .unwrap();
    assert_eq!(read_all(&mut child.stdout), "");
    child.monitor().join();
}

#[test]
fn explicit_map_is_sorted_in_child() {
    let mut map = EnvironmentMap::clean();
    map.set("B", "2").set("A", "1").set("EMPTY", "");
    let mut child = Executor::new()
        .with(CommandLine::new(bin("env")))
        .with(map)
        .redirect(StdStream::Stdout, Stdio::Piped)
        .launch()
        .unwrap();
    assert_eq!(read_all(&mut child.stdout), "A=1\nB=2\nEMPTY=\n");
    child.monitor().join();
}

#[test]
#[serial]
fn inherits_parent_environment_by_default() {
    // SAFETY: serialized with other tests that touch the environment.
    unsafe { std::env::set_var("LP_LAUNCH_INHERIT", "yes") };
    let mut child = Executor::new()
        .with(sh("printf %s \"$LP_LAUNCH_INHERIT\""))
        .redirect(StdStream::Stdout, Stdio::Piped)
        .launch()
        .unwrap();
    let out = read_all(&mut child.stdout);
    child.monitor().join();
    // SAFETY: as above.
    unsafe { std::env::remove_var("LP_LAUNCH_INHERIT") };
    assert_eq!(out, "yes");
}

#[test]
#[serial]
fn inherit_passes_non_utf8_values_through() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    // SAFETY: serialized with other tests that touch the environment.
    unsafe { std::env::set_var("LP_LAUNCH_BYTES", OsStr::from_bytes(b"caf\xe9")) };
    let mut child = Executor::new()
        .with(sh("printf '[%s]' \"${LP_LAUNCH_BYTES-UNSET}\""))
        .redirect(StdStream::Stdout, Stdio::Piped)
        .launch()
        .unwrap();
    let mut out = Vec::new();
    child.stdout.take().unwrap().read_to_end(&mut out).unwrap();
    child.monitor().join();
    // SAFETY: as above.
    unsafe { std::env::remove_var("LP_LAUNCH_BYTES") };
    assert_eq!(out, b"[caf\xe9]");
}

#[test]
fn edits_apply_on_top_of_derived_environment() {
    let mut child = Executor::new()
        .with(sh("printf %s \"$LP_EDIT\""))
        .with(EnvEdit::Set("LP_EDIT".into(), "a".into()))
        .with(EnvEdit::Append("LP_EDIT".into(), "b".into()))
        .redirect(StdStream::Stdout, Stdio::Piped)
        .launch()
        .unwrap();
    assert_eq!(read_all(&mut child.stdout), "ab");
    child.monitor().join();
}

// ── exit status ─────────────────────────────────────────────────────────

#[test]
fn exit_code_is_reported() {
    let child = Executor::new().with(sh("exit 3")).launch().unwrap();
    assert_eq!(child.monitor().join(), ExitOutcome::Exited { code: 3 });
}

#[test]
fn signal_is_reported() {
    let child = Executor::new().with(sh("kill -9 $$")).launch().unwrap();
    assert_eq!(child.monitor().join(), ExitOutcome::Signaled { signal: 9 });
}

#[test]
fn join_twice_returns_cached_outcome() {
    let mut monitor = Executor::new().with(sh("exit 7")).launch().unwrap().monitor();
    let first = monitor.join();
    // A second waitpid would fail with ECHILD and turn into Unknown.
    let second = monitor.join();
    assert_eq!(first, ExitOutcome::Exited { code: 7 });
    assert_eq!(first, second);
    assert!(monitor.last_error().is_none());
    assert_eq!(monitor.try_join(), Some(first));
}

#[test]
fn try_join_and_kill_running_child() {
    let mut monitor = Executor::new().with(sh("sleep 30")).launch().unwrap().monitor();
    assert_eq!(monitor.try_join(), None);
    monitor.kill().unwrap();
    assert_eq!(monitor.join(), ExitOutcome::Signaled { signal: 9 });
    monitor.kill().unwrap();
}

#[test]
fn join_timeout_expires_then_completes() {
    let mut monitor = Executor::new().with(sh("sleep 30")).launch().unwrap().monitor();
    assert_eq!(monitor.join_timeout(Duration::from_millis(30)), None);
    monitor.kill().unwrap();
    assert_eq!(
        monitor.join_timeout(Duration::from_secs(10)),
        Some(ExitOutcome::Signaled { signal: 9 })
    );
}

#[tokio::test]
async fn join_async_hands_monitor_back() {
    let monitor = Executor::new().with(sh("exit 0")).launch().unwrap().monitor();
    let (monitor, outcome) = monitor.join_async().await.unwrap();
    assert!(outcome.success());
    assert_eq!(monitor.outcome(), Some(outcome));
}

// ── redirection ─────────────────────────────────────────────────────────

#[test]
fn piped_stdin_round_trips_through_cat() {
    let mut child = Executor::new()
        .with(CommandLine::new(bin("cat")))
        .redirect(StdStream::Stdin, Stdio::Piped)
        .redirect(StdStream::Stdout, Stdio::Piped)
        .launch()
        .unwrap();
    let mut stdin = child.stdin.take().unwrap();
    stdin.write_all(b"ping").unwrap();
    drop(stdin);
    assert_eq!(read_all(&mut child.stdout), "ping");
    assert!(child.monitor().join().success());
}

#[test]
fn stderr_can_be_piped_separately() {
    let mut child = Executor::new()
        .with(sh("echo out; echo err >&2"))
        .redirect(StdStream::Stdout, Stdio::Null)
        .redirect(StdStream::Stderr, Stdio::Piped)
        .launch()
        .unwrap();
    assert_eq!(read_all(&mut child.stderr), "err\n");
    assert!(child.stdout.is_none());
    child.monitor().join();
}

#[test]
fn stdout_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let file = std::fs::File::create(&path).unwrap();
    let child = Executor::new()
        .with(sh("echo hello"))
        .redirect(StdStream::Stdout, file)
        .launch()
        .unwrap();
    assert!(child.monitor().join().success());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
}

#[test]
fn null_stdin_reads_eof() {
    let mut child = Executor::new()
        .with(CommandLine::new(bin("cat")))
        .redirect(StdStream::Stdin, Stdio::Null)
        .redirect(StdStream::Stdout, Stdio::Piped)
        .launch()
        .unwrap();
    assert_eq!(read_all(&mut child.stdout), "");
    assert!(child.monitor().join().success());
}

// ── working directory ───────────────────────────────────────────────────

#[test]
fn working_directory_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = Executor::new()
        .with(sh("pwd -P"))
        .working_dir(dir.path())
        .redirect(StdStream::Stdout, Stdio::Piped)
        .launch()
        .unwrap();
    let out = read_all(&mut child.stdout);
    child.monitor().join();
    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(out.trim_end(), expected.to_str().unwrap());
}

// ── failures ────────────────────────────────────────────────────────────

#[test]
fn non_executable_file_fails_in_child() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-exec");
    std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

    let (result, tracker) = Executor::new()
        .with(CommandLine::new(path.to_str().unwrap()))
        .launch_tracked();
    let err = result.unwrap_err();
    assert_eq!(err.code, ErrorCode::LaunchExecFailed);
    assert_eq!(err.os_code, Some(EACCES));
    assert_eq!(tracker.state(), LaunchState::LaunchFailed);
    assert_eq!(tracker.history().len(), 2);
}

#[test]
fn missing_program_is_validation_error() {
    let err = Executor::new()
        .with(CommandLine::new("/definitely/not/a/program"))
        .launch()
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationExecutableNotFound);
}

#[test]
fn successful_launch_is_tracked() {
    let (result, tracker) = Executor::new().with(sh("exit 0")).launch_tracked();
    let child = result.unwrap();
    assert_eq!(tracker.state(), LaunchState::Succeeded);
    let states: Vec<_> = tracker.history().iter().map(|t| t.to).collect();
    assert_eq!(states, vec![LaunchState::Launching, LaunchState::Succeeded]);
    child.monitor().join();
}

#[cfg(target_os = "linux")]
#[test]
fn dropping_attached_handle_leaves_child_unreaped() {
    let child = Executor::new().with(sh("exit 0")).launch().unwrap();
    let stat = format!("/proc/{}/stat", child.pid());
    drop(child);

    // The entry survives as a zombie because nothing waited on it.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let state = loop {
        let text = std::fs::read_to_string(&stat).unwrap();
        let state = text.rsplit(')').next().unwrap().trim_start().chars().next();
        if state == Some('Z') || std::time::Instant::now() > deadline {
            break state;
        }
        std::thread::sleep(Duration::from_millis(10));
    };
    assert_eq!(state, Some('Z'));
}

#[test]
fn detached_child_keeps_running() {
    let child = Executor::new().with(sh("exit 0")).launch().unwrap();
    let pid = child.detach();
    assert!(pid > 0);
}
