//! `plotmover check`: show what the mover would see, without moving anything.

use anyhow::{Context, Result};
use plotmover_core::config::MoverConfig;
use plotmover_core::scanner;
use plotmover_core::space::{FreeSpace, StatvfsProbe};

const GIB: f64 = (1u64 << 30) as f64;

fn gib(bytes: u64) -> String {
    format!("{:.1} GiB", bytes as f64 / GIB)
}

pub fn run_check(cfg: &MoverConfig) -> Result<()> {
    println!("{:<48} {:>14}", "VOLUME", "AVAILABLE");
    for volume in &cfg.destination_dirs {
        let avail = match StatvfsProbe.available_bytes(volume) {
            Ok(n) => gib(n),
            Err(e) => format!("error: {e}"),
        };
        println!("{:<48} {:>14}", volume.display(), avail);
    }

    println!();
    println!("{:<48} {:>6} {:>14}", "STAGING", "PLOTS", "SIZE");
    for staging in &cfg.staging_dirs {
        let plots = scanner::list_candidates(staging, cfg.extension(), &cfg.destination_dirs)
            .with_context(|| format!("scan {}", staging.display()))?;
        let total: u64 = plots.iter().map(|c| c.size).sum();
        println!(
            "{:<48} {:>6} {:>14}",
            staging.display(),
            plots.len(),
            gib(total)
        );
    }
    Ok(())
}
