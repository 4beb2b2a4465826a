// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz `NAME=value` parsing and environment-block encoding.
//!
//! 1. `EnvVar::parse` never panics and its `Display` reproduces lines that
//!    contain an `=` after the first character.
//! 2. A map built from the lines either fails validation or encodes into
//!    both native blocks, and the Windows block decodes to the same entries.
#![no_main]
use libfuzzer_sys::fuzz_target;
use lp_env::{EnvCase, EnvVar, EnvironmentMap, WindowsEnvBlock, decode_windows_block};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    let mut map = EnvironmentMap::with_case(EnvCase::Insensitive);
    for line in s.split('\n') {
        let var = EnvVar::parse(line);
        if line.chars().skip(1).any(|c| c == '=') {
            assert_eq!(var.to_string(), line);
        }
        map.set_line(line);
    }

    if map.validate().is_err() {
        return;
    }
    let block = WindowsEnvBlock::encode(&map).expect("validated map encodes");
    let decoded = decode_windows_block(block.as_slice());
    let lines: Vec<String> = map.to_lines().collect();
    assert_eq!(decoded, lines);
    #[cfg(unix)]
    {
        let posix = lp_env::PosixEnvBlock::encode(&map).expect("validated map encodes");
        assert_eq!(posix.len(), map.len());
    }
});
