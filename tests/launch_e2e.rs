// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end scenarios across the workspace: a TOML description is loaded,
//! turned into an executor, launched and monitored.

use lp_cmdline::CommandLine;
use lp_config::{LaunchConfig, merge_configs, parse_toml};
use lp_env::EnvironmentMap;
use lp_launch::{EnvSource, ExitOutcome, Executor, LaunchState, StdStream, Stdio};
use std::io::Read;

fn read_stdout(child: &mut lp_launch::ChildHandle) -> String {
    let mut out = String::new();
    child
        .stdout
        .take()
        .expect("stdout was piped")
        .read_to_string(&mut out)
        .unwrap();
    out
}

// ── POSIX ───────────────────────────────────────────────────────────────

#[cfg(unix)]
mod posix {
    use super::*;

    #[test]
    fn config_file_to_exit_status() {
        let cfg = parse_toml(
            r#"
            program = "/bin/sh"
            args = ["-c", "printf '%s:%s' \"$GREETING\" \"$(pwd -P)\"; exit 5"]
            working_dir = "/"

            [env]
            mode = "clean"
            vars = { GREETING = "hi" }

            [stdio]
            stdout = "piped"
            "#,
        )
        .unwrap();
        let mut child = cfg.to_executor().unwrap().launch().unwrap();
        let out = read_stdout(&mut child);
        assert_eq!(out, "hi:/");
        assert_eq!(child.monitor().join(), ExitOutcome::Exited { code: 5 });
    }

    #[test]
    fn overlay_switches_program() {
        let base = parse_toml("program = \"/bin/false\"\n[stdio]\nstdout = \"piped\"\n").unwrap();
        let overlay =
            LaunchConfig::from_command(&CommandLine::new("/bin/sh").args(["-c", "echo over"]));
        let cfg = merge_configs(base, overlay);
        let mut child = cfg.to_executor().unwrap().launch().unwrap();
        assert_eq!(read_stdout(&mut child), "over\n");
        assert!(child.monitor().join().success());
    }

    #[test]
    fn path_search_uses_child_environment() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("lp-e2e-tool");
        std::fs::write(&script, "#!/bin/sh\necho found-in-child-path\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let mut map = EnvironmentMap::clean();
        map.set("PATH", dir.path().to_str().unwrap());
        let mut child = Executor::new()
            .with(CommandLine::new("lp-e2e-tool"))
            .with(map)
            .redirect(StdStream::Stdout, Stdio::Piped)
            .launch()
            .unwrap();
        assert_eq!(read_stdout(&mut child), "found-in-child-path\n");
        child.monitor().join();
    }

    #[test]
    fn tracker_records_failure_before_spawn() {
        let (result, tracker) = Executor::new()
            .with(CommandLine::new("/bin/sh"))
            .with(EnvSource::Clean)
            .working_dir("/definitely/not/a/dir")
            .launch_tracked();
        assert!(result.unwrap_err().is_validation());
        assert_eq!(tracker.state(), LaunchState::LaunchFailed);
    }
}

// ── Windows ─────────────────────────────────────────────────────────────

#[cfg(windows)]
mod windows {
    use super::*;

    #[test]
    fn cmd_echo_round_trip() {
        let mut child = Executor::new()
            .with(CommandLine::new("cmd").args(["/c", "echo %GREETING%"]))
            .env("GREETING", "hi")
            .redirect(StdStream::Stdout, Stdio::Piped)
            .launch()
            .unwrap();
        assert_eq!(read_stdout(&mut child).trim_end(), "hi");
        assert!(child.monitor().join().success());
    }

    #[test]
    fn exit_code_is_reported() {
        let child = Executor::new()
            .with(CommandLine::new("cmd").args(["/c", "exit 3"]))
            .launch()
            .unwrap();
        assert_eq!(child.monitor().join(), ExitOutcome::Exited { code: 3 });
    }

    #[test]
    fn path_and_path_collide() {
        let mut map = EnvironmentMap::derive().unwrap();
        map.set("Path", "C:\\one");
        assert_eq!(map.get("PATH"), Some("C:\\one"));
    }
}
