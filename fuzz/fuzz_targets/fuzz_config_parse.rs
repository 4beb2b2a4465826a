// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz launch config parsing and its conversion into launch initializers.
//!
//! For any TOML that parses as a `LaunchConfig`:
//! 1. `validate_config` never panics and its warnings render.
//! 2. Serializing back to TOML and re-parsing yields the same config.
//! 3. `to_executor` agrees with `validate_config` and emits one initializer
//!    per command, working directory, base environment and env edit.
//! 4. The env table applies deterministically to a clean map.
//! 5. `from_command(command())` keeps program and arguments.
#![no_main]
use libfuzzer_sys::fuzz_target;
use lp_config::{LaunchConfig, StdioConfig};
use lp_env::{EnvCase, EnvironmentMap};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = lp_config::parse_toml(s) else {
        return;
    };

    match lp_config::validate_config(&config) {
        Ok(warnings) => {
            for w in &warnings {
                let _ = w.to_string();
            }
        }
        Err(e) => {
            let _ = e.to_string();
        }
    }

    if let Ok(text) = toml::to_string(&config) {
        if let Ok(back) = lp_config::parse_toml(&text) {
            assert_eq!(config, back, "TOML round trip must be lossless");
        }
    }

    // File redirections would touch the filesystem; drop them.
    let stripped = LaunchConfig {
        stdio: StdioConfig::default(),
        ..config.clone()
    };
    let valid = lp_config::validate_config(&stripped).is_ok();
    match stripped.to_executor() {
        Ok(exec) => {
            assert!(valid, "to_executor accepted a config validation rejects");
            let expected = usize::from(stripped.program.is_some())
                + usize::from(stripped.working_dir.is_some())
                + 1
                + stripped.env.edits().len();
            assert_eq!(exec.initializers().len(), expected);
        }
        Err(_) => assert!(!valid, "to_executor rejected a valid config"),
    }

    for case in [EnvCase::Sensitive, EnvCase::Insensitive] {
        let mut first = EnvironmentMap::with_case(case);
        let mut second = EnvironmentMap::with_case(case);
        config.env.apply(&mut first);
        config.env.apply(&mut second);
        assert_eq!(first, second);
        let _ = first.validate();
    }

    if let Some(cmd) = config.command() {
        let back = LaunchConfig::from_command(&cmd).command();
        assert_eq!(back.as_ref(), Some(&cmd));
    }
});
