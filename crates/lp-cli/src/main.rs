// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

mod commands;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use commands::{EnvEncoding, SchemaKind};
use lp_config::{EnvMode, LaunchConfig, load_config, merge_configs};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lp", version, about = "launchplane process launcher")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch a program and exit with its status.
    Run {
        #[command(flatten)]
        launch: LaunchArgs,

        /// Kill the child if it runs longer than this.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print a JSON report instead of forwarding output.
        #[arg(long)]
        json: bool,

        /// Program and arguments, after `--`.
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Print the environment a launch would use.
    Env {
        #[command(flatten)]
        launch: LaunchArgs,

        /// Output encoding.
        #[arg(long, value_enum, default_value_t = EncodingArg::Lines)]
        encoding: EncodingArg,
    },

    /// Print the Windows command line for an argument vector.
    Quote {
        /// Program followed by its arguments.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },

    /// Print a JSON schema.
    Schema {
        #[arg(value_enum, default_value_t = SchemaArg::Config)]
        kind: SchemaArg,
    },
}

/// Flags shared by `run` and `env`.
#[derive(Args, Debug, Default)]
struct LaunchArgs {
    /// TOML launch description.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start from an empty environment.
    #[arg(long)]
    clean_env: bool,

    /// Set a variable, as KEY=VALUE. Can be repeated.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    vars: Vec<String>,

    /// Append a path entry, as KEY=PATH. Can be repeated.
    #[arg(long, value_name = "KEY=PATH")]
    append_path: Vec<String>,

    /// Prepend a path entry, as KEY=PATH. Can be repeated.
    #[arg(long, value_name = "KEY=PATH")]
    prepend_path: Vec<String>,

    /// Remove a variable. Can be repeated.
    #[arg(long, value_name = "KEY")]
    unset: Vec<String>,

    /// Working directory for the child.
    #[arg(long)]
    cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EncodingArg {
    Lines,
    Windows,
}

impl From<EncodingArg> for EnvEncoding {
    fn from(v: EncodingArg) -> Self {
        match v {
            EncodingArg::Lines => EnvEncoding::Lines,
            EncodingArg::Windows => EnvEncoding::Windows,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SchemaArg {
    Config,
    Error,
}

impl From<SchemaArg> for SchemaKind {
    fn from(v: SchemaArg) -> Self {
        match v {
            SchemaArg::Config => SchemaKind::Config,
            SchemaArg::Error => SchemaKind::Error,
        }
    }
}

fn split_assignment(flag: &str, raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_owned(), v.to_owned())),
        _ => anyhow::bail!("--{flag} expects KEY=VALUE, got {raw:?}"),
    }
}

impl LaunchArgs {
    /// The config these flags describe, to be laid over the file config.
    fn overlay(&self) -> Result<LaunchConfig> {
        let mut cfg = LaunchConfig::default();
        if self.clean_env {
            cfg.env.mode = Some(EnvMode::Clean);
        }
        for raw in &self.vars {
            let (k, v) = split_assignment("env", raw)?;
            cfg.env.vars.insert(k, v);
        }
        for raw in &self.append_path {
            let (k, v) = split_assignment("append-path", raw)?;
            cfg.env.append_path.entry(k).or_default().push(v);
        }
        for raw in &self.prepend_path {
            let (k, v) = split_assignment("prepend-path", raw)?;
            cfg.env.prepend_path.entry(k).or_default().push(v);
        }
        cfg.env.remove.extend(self.unset.iter().cloned());
        cfg.working_dir = self
            .cwd
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        Ok(cfg)
    }

    /// File config (with `LP_*` overrides) merged with the flags.
    fn resolve(&self) -> Result<LaunchConfig> {
        let base = load_config(self.config.as_deref()).with_context(|| match &self.config {
            Some(p) => format!("load config '{}'", p.display()),
            None => "load config".to_string(),
        })?;
        Ok(merge_configs(base, self.overlay()?))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("lp=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lp=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            launch,
            timeout_ms,
            json,
            command,
        } => {
            let mut cfg = launch.resolve()?;
            if let Some((program, args)) = command.split_first() {
                cfg.program = Some(program.clone());
                cfg.args = args.to_vec();
            }
            if timeout_ms.is_some() {
                cfg.timeout_ms = timeout_ms;
            }
            let code = commands::run(&cfg, json)?;
            std::process::exit(code);
        }
        Commands::Env { launch, encoding } => {
            let cfg = launch.resolve()?;
            print!("{}", commands::env(&cfg, encoding.into())?);
            Ok(())
        }
        Commands::Quote { argv } => {
            println!("{}", commands::quote(&argv)?);
            Ok(())
        }
        Commands::Schema { kind } => {
            println!("{}", commands::schema_json(kind.into())?);
            Ok(())
        }
    }
}
