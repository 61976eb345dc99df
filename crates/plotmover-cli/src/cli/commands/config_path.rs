//! `plotmover config-path`: print where the default config lives.

use anyhow::Result;
use plotmover_core::config;

pub fn run_config_path() -> Result<()> {
    println!("{}", config::config_path()?.display());
    Ok(())
}
