//! CLI for the plotmover daemon.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use plotmover_core::config::{self, MoverConfig};
use std::path::{Path, PathBuf};

use commands::{run_check, run_config_path, run_mover};

/// Top-level CLI for plotmover.
#[derive(Debug, Parser)]
#[command(name = "plotmover")]
#[command(about = "Move finished plot files from staging disks to destination volumes", long_about = None)]
pub struct Cli {
    /// Log to stderr instead of the state-dir log file.
    #[arg(long, global = true)]
    pub log_stderr: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Scan staging directories and move plots until stopped (SIGINT/SIGTERM).
    Run {
        /// Config file to use instead of the default location.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Run a single round, wait for its transfers, then exit.
        #[arg(long)]
        once: bool,
    },

    /// Validate the config and show free space and pending plots; moves nothing.
    Check {
        /// Config file to use instead of the default location.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Print the default config file location.
    ConfigPath,
}

fn load_config(path: Option<&Path>) -> Result<MoverConfig> {
    let cfg = match path {
        Some(p) => config::load_from_path(p)?,
        None => config::load_or_init()?,
    };
    tracing::debug!("loaded config: {:?}", cfg);
    Ok(cfg)
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            CliCommand::Run { config, once } => {
                let cfg = load_config(config.as_deref())?;
                run_mover(&cfg, once).await?;
            }
            CliCommand::Check { config } => {
                let cfg = load_config(config.as_deref())?;
                run_check(&cfg)?;
            }
            CliCommand::ConfigPath => run_config_path()?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
