// SPDX-License-Identifier: MIT OR Apache-2.0
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use schemars::schema_for;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Repo maintenance tasks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate JSON Schemas for the config file and error report formats.
    Schema {
        /// Output directory.
        #[arg(long, default_value = "contracts/schemas")]
        out_dir: PathBuf,

        /// Fail if the files on disk differ instead of rewriting them.
        #[arg(long)]
        check: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Schema { out_dir, check } => schema(&out_dir, check),
    }
}

fn schemas() -> Result<Vec<(&'static str, String)>> {
    let config = schema_for!(lp_config::LaunchConfig);
    let error = schema_for!(lp_error::LaunchErrorDto);
    Ok(vec![
        ("launch_config.schema.json", serde_json::to_string_pretty(&config)?),
        ("launch_error.schema.json", serde_json::to_string_pretty(&error)?),
    ])
}

fn schema(out_dir: &Path, check: bool) -> Result<()> {
    if check {
        let mut stale = Vec::new();
        for (name, text) in schemas()? {
            let path = out_dir.join(name);
            let on_disk = std::fs::read_to_string(&path).unwrap_or_default();
            if on_disk != text {
                stale.push(path.display().to_string());
            }
        }
        if !stale.is_empty() {
            anyhow::bail!("schemas out of date: {}", stale.join(", "));
        }
        eprintln!("schemas in {} are current", out_dir.display());
        return Ok(());
    }

    std::fs::create_dir_all(out_dir).context("create schema output dir")?;
    for (name, text) in schemas()? {
        let path = out_dir.join(name);
        std::fs::write(&path, text).with_context(|| format!("write {}", path.display()))?;
    }
    eprintln!("wrote schemas to {}", out_dir.display());
    Ok(())
}
