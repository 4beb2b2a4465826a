// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subcommand implementations for the `lp` binary.

use anyhow::{Context, Result};
use lp_cmdline::CommandLine;
use lp_config::{LaunchConfig, validate_config};
use lp_env::{WindowsEnvBlock, decode_windows_block};
use lp_error::{ErrorCode, LaunchError, LaunchErrorDto};
use lp_launch::{EnvironmentSource, ExitOutcome, LaunchTransition};
use schemars::schema_for;
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Schema types that can be printed by the `schema` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// JSON schema for [`LaunchConfig`].
    Config,
    /// JSON schema for [`LaunchErrorDto`].
    Error,
}

/// How `env` prints the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvEncoding {
    /// `NAME=value` lines in map order.
    Lines,
    /// Lines decoded back out of a Windows environment block.
    Windows,
}

/// Status for a launch that never produced a child.
pub fn launch_failure_status(err: &LaunchError) -> i32 {
    match err.code {
        ErrorCode::ValidationExecutableNotFound => 127,
        _ => 126,
    }
}

#[derive(Serialize)]
struct RunReport {
    pid: u32,
    outcome: ExitOutcome,
    status: i32,
    timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stderr: Option<String>,
    transitions: Vec<LaunchTransition>,
}

#[derive(Serialize)]
struct ErrorReport {
    error: LaunchErrorDto,
    status: i32,
    transitions: Vec<LaunchTransition>,
}

fn drain(file: Option<File>) -> Option<JoinHandle<String>> {
    file.map(|mut f| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = f.read_to_end(&mut buf) {
                warn!(target: "lp.cli", error = %e, "reading child output failed");
            }
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> Option<String> {
    handle.map(|h| h.join().unwrap_or_default())
}

/// Launch `cfg` and wait for it, returning the status `lp` should exit with.
///
/// Piped output is captured; it is echoed to the matching stream unless
/// `json` is set, in which case it is embedded in the report.
pub fn run(cfg: &LaunchConfig, json: bool) -> Result<i32> {
    for w in validate_config(cfg)? {
        warn!(target: "lp.cli", "{w}");
    }
    let exec = cfg.to_executor()?;
    let (result, tracker) = exec.launch_tracked();
    let transitions = tracker.history().to_vec();

    let mut child = match result {
        Ok(child) => child,
        Err(err) => {
            let status = launch_failure_status(&err);
            if json {
                let report = ErrorReport {
                    error: LaunchErrorDto::from(&err),
                    status,
                    transitions,
                };
                println!("{}", serde_json::to_string(&report)?);
            } else {
                eprintln!("lp: {err}");
            }
            return Ok(status);
        }
    };

    let pid = child.pid();
    drop(child.stdin.take());
    let out = drain(child.stdout.take());
    let err = drain(child.stderr.take());

    let mut monitor = child.monitor();
    let (outcome, timed_out) = match cfg.timeout() {
        Some(limit) => match monitor.join_timeout(limit) {
            Some(outcome) => (outcome, false),
            None => {
                warn!(target: "lp.cli", pid, ms = limit.as_millis() as u64, "timed out, killing child");
                monitor.kill().context("kill timed-out child")?;
                (monitor.join(), true)
            }
        },
        None => (monitor.join(), false),
    };
    if let Some(e) = monitor.last_error() {
        warn!(target: "lp.cli", error = %e, "wait failed");
    }
    let stdout = collect(out);
    let stderr = collect(err);
    let status = outcome.shell_status();
    debug!(target: "lp.cli", pid, %outcome, status, "child finished");

    if json {
        let report = RunReport {
            pid,
            outcome,
            status,
            timed_out,
            stdout,
            stderr,
            transitions,
        };
        println!("{}", serde_json::to_string(&report)?);
    } else {
        if let Some(s) = stdout {
            std::io::stdout().write_all(s.as_bytes())?;
        }
        if let Some(s) = stderr {
            std::io::stderr().write_all(s.as_bytes())?;
        }
    }
    Ok(status)
}

/// Render the environment a launch of `cfg` would receive.
pub fn env(cfg: &LaunchConfig, encoding: EnvEncoding) -> Result<String> {
    let mut map = cfg.env_source().base_environment()?;
    cfg.env.apply(&mut map);
    map.validate()?;
    let lines = match encoding {
        EnvEncoding::Lines => map.to_lines().collect::<Vec<_>>(),
        EnvEncoding::Windows => decode_windows_block(WindowsEnvBlock::encode(&map)?.as_slice()),
    };
    let mut out = String::new();
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Quote `argv` (program first) as a Windows command line.
pub fn quote(argv: &[String]) -> Result<String> {
    let cmd: CommandLine = argv.iter().cloned().collect();
    Ok(cmd.to_windows_command_line()?)
}

/// Return the JSON schema string for the given kind.
pub fn schema_json(kind: SchemaKind) -> Result<String> {
    let value = match kind {
        SchemaKind::Config => serde_json::to_value(schema_for!(LaunchConfig))?,
        SchemaKind::Error => serde_json::to_value(schema_for!(LaunchErrorDto))?,
    };
    serde_json::to_string_pretty(&value).context("serialize schema")
}
