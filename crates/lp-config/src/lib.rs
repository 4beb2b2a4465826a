// SPDX-License-Identifier: MIT OR Apache-2.0
//! Launch descriptions for launchplane.
//!
//! A [`LaunchConfig`] is a TOML document naming a program, its arguments,
//! a working directory, environment edits and stdio redirections. This crate
//! loads it, applies `LP_*` environment overrides, validates it into hard
//! errors and advisory [`ConfigWarning`]s, merges overlays, and turns the
//! result into an [`Executor`].
#![deny(unsafe_code)]
#![warn(missing_docs)]

use lp_cmdline::CommandLine;
use lp_env::EnvironmentMap;
use lp_launch::{EnvEdit, EnvSource, Executor, Launcher, StdStream, Stdio};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while loading, validating or applying a config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file could not be read.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as a launch description.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// An `LP_*` override held a value that does not parse.
    #[error("invalid override {var}={value:?}")]
    InvalidOverride {
        /// Variable name.
        var: String,
        /// Offending value.
        value: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },

    /// A file redirection could not be opened.
    #[error("cannot open {stream} redirection {path}: {source}")]
    Redirect {
        /// Stream being redirected.
        stream: StdStream,
        /// File that was requested.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory issues that do not prevent a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// The timeout is unusually large.
    LargeTimeout {
        /// Timeout in milliseconds.
        ms: u64,
    },
    /// A variable is set in `[env.vars]` and also listed in `remove`.
    SetThenRemoved {
        /// Variable name.
        name: String,
    },
    /// A path list contains an empty entry.
    EmptyPathEntry {
        /// Variable the entry would be added to.
        name: String,
    },
    /// Variables are set on a clean environment without a `PATH`.
    CleanWithoutPath,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::LargeTimeout { ms } => write!(f, "large timeout ({ms}ms)"),
            ConfigWarning::SetThenRemoved { name } => {
                write!(f, "'{name}' is set and then removed")
            }
            ConfigWarning::EmptyPathEntry { name } => {
                write!(f, "empty path entry for '{name}'")
            }
            ConfigWarning::CleanWithoutPath => {
                write!(f, "clean environment has no PATH; children cannot search for programs")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// A launch description.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LaunchConfig {
    /// Program to run, as a path or a name searched on `PATH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    /// Arguments after the program.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Directory the child starts in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// How long a caller should wait before killing the child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Environment construction.
    #[serde(default)]
    pub env: EnvConfig,

    /// Standard stream redirections.
    #[serde(default)]
    pub stdio: StdioConfig,
}

/// Where the child environment starts from.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnvMode {
    /// Snapshot of the parent environment.
    #[default]
    Derive,
    /// Empty environment.
    Clean,
}

impl std::str::FromStr for EnvMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "derive" => Ok(EnvMode::Derive),
            "clean" => Ok(EnvMode::Clean),
            other => Err(format!("unknown env mode '{other}'")),
        }
    }
}

/// The `[env]` table. Edits apply as `vars`, `append_path`, `prepend_path`,
/// then `remove`, whatever order the keys appear in.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvConfig {
    /// Base environment; `derive` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<EnvMode>,

    /// Variables to remove.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,

    /// Variables to set.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,

    /// Path entries appended to list variables such as `PATH`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub append_path: BTreeMap<String, Vec<String>>,

    /// Path entries prepended to list variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub prepend_path: BTreeMap<String, Vec<String>>,
}

impl EnvConfig {
    /// The environment edits this table describes, in application order.
    pub fn edits(&self) -> Vec<EnvEdit> {
        let mut out = Vec::new();
        for (k, v) in &self.vars {
            out.push(EnvEdit::Set(k.clone(), v.clone()));
        }
        for (k, paths) in &self.append_path {
            for p in paths {
                out.push(EnvEdit::AppendPath(k.clone(), p.clone()));
            }
        }
        for (k, paths) in &self.prepend_path {
            for p in paths {
                out.push(EnvEdit::PrependPath(k.clone(), p.clone()));
            }
        }
        for k in &self.remove {
            out.push(EnvEdit::Remove(k.clone()));
        }
        out
    }

    /// Apply this table to a base map, as a launch would.
    pub fn apply(&self, map: &mut EnvironmentMap) {
        for edit in self.edits() {
            edit.apply(map);
        }
    }
}

/// The `[stdio]` table. Absent streams are inherited.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StdioConfig {
    /// Standard input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<StdioSpec>,
    /// Standard output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<StdioSpec>,
    /// Standard error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<StdioSpec>,
}

impl StdioConfig {
    /// Redirection for `stream`.
    pub fn get(&self, stream: StdStream) -> Option<&StdioSpec> {
        match stream {
            StdStream::Stdin => self.stdin.as_ref(),
            StdStream::Stdout => self.stdout.as_ref(),
            StdStream::Stderr => self.stderr.as_ref(),
        }
    }
}

/// One stream's redirection.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(untagged)]
pub enum StdioSpec {
    /// `"inherit"`, `"null"` or `"piped"`.
    Mode(StdioMode),
    /// `{ file = "...", append = false }`.
    File {
        /// File path.
        file: String,
        /// Append instead of truncating (output streams only).
        #[serde(default)]
        append: bool,
    },
}

/// Redirection modes that need no file.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StdioMode {
    /// Share the parent's stream.
    Inherit,
    /// The null device.
    Null,
    /// A pipe whose parent end is returned on the child handle.
    Piped,
}

impl StdioSpec {
    /// Open this redirection for `stream`.
    pub fn open(&self, stream: StdStream) -> Result<Stdio, ConfigError> {
        match self {
            StdioSpec::Mode(StdioMode::Inherit) => Ok(Stdio::Inherit),
            StdioSpec::Mode(StdioMode::Null) => Ok(Stdio::Null),
            StdioSpec::Mode(StdioMode::Piped) => Ok(Stdio::Piped),
            StdioSpec::File { file, append } => {
                let mut opts = OpenOptions::new();
                if stream.is_input() {
                    opts.read(true);
                } else if *append {
                    opts.append(true).create(true);
                } else {
                    opts.write(true).create(true).truncate(true);
                }
                opts.open(file)
                    .map(Stdio::File)
                    .map_err(|source| ConfigError::Redirect {
                        stream,
                        path: file.clone(),
                        source,
                    })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum allowed timeout (24 hours).
const MAX_TIMEOUT_MS: u64 = 86_400_000;

/// Threshold above which a timeout generates a warning (1 hour).
const LARGE_TIMEOUT_THRESHOLD_MS: u64 = 3_600_000;

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`LaunchConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, starts from [`LaunchConfig::default()`].
///
/// `LP_*` overrides from the process environment are applied in both cases.
pub fn load_config(path: Option<&Path>) -> Result<LaunchConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => LaunchConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Parse a TOML string into a [`LaunchConfig`].
pub fn parse_toml(content: &str) -> Result<LaunchConfig, ConfigError> {
    toml::from_str::<LaunchConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply overrides from the process environment.
///
/// Recognised variables:
/// - `LP_WORKING_DIR`
/// - `LP_TIMEOUT_MS`
/// - `LP_ENV_MODE` (`derive` or `clean`)
pub fn apply_env_overrides(config: &mut LaunchConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, |k| std::env::var(k).ok())
}

/// Apply overrides looked up through `lookup` instead of the process
/// environment.
pub fn apply_overrides_from(
    config: &mut LaunchConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(val) = lookup("LP_WORKING_DIR") {
        debug!(target: "lp.config", working_dir = %val, "override");
        config.working_dir = Some(val);
    }
    if let Some(val) = lookup("LP_TIMEOUT_MS") {
        let ms = val
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidOverride {
                var: "LP_TIMEOUT_MS".into(),
                value: val.clone(),
            })?;
        debug!(target: "lp.config", timeout_ms = ms, "override");
        config.timeout_ms = Some(ms);
    }
    if let Some(val) = lookup("LP_ENV_MODE") {
        let mode = val
            .parse::<EnvMode>()
            .map_err(|_| ConfigError::InvalidOverride {
                var: "LP_ENV_MODE".into(),
                value: val.clone(),
            })?;
        debug!(target: "lp.config", ?mode, "override");
        config.env.mode = Some(mode);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn check_name(name: &str, table: &str, errors: &mut Vec<String>) {
    let mut scratch = EnvironmentMap::clean();
    scratch.set(name, "");
    if scratch.validate().is_err() {
        errors.push(format!("env.{table}: invalid variable name {name:?}"));
    }
}

/// Validate a configuration, returning advisory warnings.
///
/// Hard errors (no program, NUL bytes, malformed variable names, an
/// out-of-range timeout) come back as [`ConfigError::ValidationError`].
pub fn validate_config(config: &LaunchConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    match config.program.as_deref() {
        None => errors.push("program must be set".into()),
        Some(p) if p.trim().is_empty() => errors.push("program must not be empty".into()),
        Some(p) if p.contains('\0') => errors.push("program contains a NUL byte".into()),
        Some(_) => {}
    }
    for (i, arg) in config.args.iter().enumerate() {
        if arg.contains('\0') {
            errors.push(format!("args[{i}] contains a NUL byte"));
        }
    }

    if let Some(dir) = config.working_dir.as_deref() {
        if dir.is_empty() {
            errors.push("working_dir must not be empty".into());
        }
    }

    if let Some(ms) = config.timeout_ms {
        if ms == 0 || ms > MAX_TIMEOUT_MS {
            errors.push(format!(
                "timeout {ms}ms out of range (1..{MAX_TIMEOUT_MS})"
            ));
        } else if ms > LARGE_TIMEOUT_THRESHOLD_MS {
            warnings.push(ConfigWarning::LargeTimeout { ms });
        }
    }

    let env = &config.env;
    for (name, value) in &env.vars {
        check_name(name, "vars", &mut errors);
        if value.contains('\0') {
            errors.push(format!("env.vars: value of {name:?} contains a NUL byte"));
        }
    }
    for (table, lists) in [("append_path", &env.append_path), ("prepend_path", &env.prepend_path)]
    {
        for (name, paths) in lists {
            check_name(name, table, &mut errors);
            if paths.iter().any(|p| p.contains('\0')) {
                errors.push(format!("env.{table}: entry for {name:?} contains a NUL byte"));
            }
            if paths.iter().any(|p| p.is_empty()) {
                warnings.push(ConfigWarning::EmptyPathEntry { name: name.clone() });
            }
        }
    }
    for name in &env.remove {
        check_name(name, "remove", &mut errors);
        if env.vars.contains_key(name) {
            warnings.push(ConfigWarning::SetThenRemoved { name: name.clone() });
        }
    }
    if env.mode == Some(EnvMode::Clean)
        && !env.vars.keys().any(|k| k.eq_ignore_ascii_case("PATH"))
        && !env.append_path.keys().any(|k| k.eq_ignore_ascii_case("PATH"))
        && !env.prepend_path.keys().any(|k| k.eq_ignore_ascii_case("PATH"))
    {
        warnings.push(ConfigWarning::CleanWithoutPath);
    }

    for stream in StdStream::ALL {
        if let Some(StdioSpec::File { file, .. }) = config.stdio.get(stream) {
            if file.is_empty() {
                errors.push(format!("stdio.{stream}: file path must not be empty"));
            }
        }
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations. Values in `overlay` take precedence over `base`.
///
/// An overlay that names a program replaces the base arguments too. Variable
/// and path tables are combined (path lists concatenate, base first);
/// `remove` lists concatenate.
pub fn merge_configs(base: LaunchConfig, overlay: LaunchConfig) -> LaunchConfig {
    let (program, args) = match overlay.program {
        Some(p) => (Some(p), overlay.args),
        None if !overlay.args.is_empty() => (base.program, overlay.args),
        None => (base.program, base.args),
    };

    let mut vars = base.env.vars;
    vars.extend(overlay.env.vars);
    let concat = |mut a: BTreeMap<String, Vec<String>>, b: BTreeMap<String, Vec<String>>| {
        for (k, v) in b {
            a.entry(k).or_default().extend(v);
        }
        a
    };
    let mut remove = base.env.remove;
    remove.extend(overlay.env.remove);

    LaunchConfig {
        program,
        args,
        working_dir: overlay.working_dir.or(base.working_dir),
        timeout_ms: overlay.timeout_ms.or(base.timeout_ms),
        env: EnvConfig {
            mode: overlay.env.mode.or(base.env.mode),
            vars,
            append_path: concat(base.env.append_path, overlay.env.append_path),
            prepend_path: concat(base.env.prepend_path, overlay.env.prepend_path),
            remove,
        },
        stdio: StdioConfig {
            stdin: overlay.stdio.stdin.or(base.stdio.stdin),
            stdout: overlay.stdio.stdout.or(base.stdio.stdout),
            stderr: overlay.stdio.stderr.or(base.stdio.stderr),
        },
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

impl LaunchConfig {
    /// Config that runs `command` with everything else defaulted.
    pub fn from_command(command: &CommandLine) -> Self {
        Self {
            program: Some(command.program().to_owned()),
            args: command.arguments().to_vec(),
            ..Self::default()
        }
    }

    /// The command line, if a program is set.
    pub fn command(&self) -> Option<CommandLine> {
        self.program
            .as_ref()
            .map(|p| CommandLine::new(p.clone()).args(self.args.iter().cloned()))
    }

    /// The timeout as a [`Duration`].
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Base environment source.
    pub fn env_source(&self) -> EnvSource {
        match self.env.mode.unwrap_or_default() {
            EnvMode::Derive => EnvSource::Derive,
            EnvMode::Clean => EnvSource::Clean,
        }
    }

    /// Validate and convert into an [`Executor`] using the native launcher.
    pub fn to_executor(&self) -> Result<Executor, ConfigError> {
        self.apply_to(Executor::new())
    }

    /// Validate and push this config's initializers onto `exec`.
    ///
    /// File redirections are opened here, so a missing input file is
    /// reported as [`ConfigError::Redirect`] before anything is launched.
    pub fn apply_to<L: Launcher>(&self, mut exec: Executor<L>) -> Result<Executor<L>, ConfigError> {
        validate_config(self)?;
        if let Some(cmd) = self.command() {
            exec.push(cmd);
        }
        if let Some(dir) = &self.working_dir {
            exec.push(lp_launch::Initializer::WorkingDir(PathBuf::from(dir)));
        }
        exec.push(self.env_source());
        for edit in self.env.edits() {
            exec.push(edit);
        }
        for stream in StdStream::ALL {
            if let Some(spec) = self.stdio.get(stream) {
                exec.push(lp_launch::Initializer::Redirect(stream, spec.open(stream)?));
            }
        }
        debug!(
            target: "lp.config",
            initializers = exec.initializers().len(),
            "executor built from config"
        );
        Ok(exec)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
