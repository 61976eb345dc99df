//! `plotmover run`: the round loop with signal handling.

use anyhow::Result;
use plotmover_core::config::MoverConfig;
use plotmover_core::mover::Mover;

pub async fn run_mover(cfg: &MoverConfig, once: bool) -> Result<()> {
    tracing::info!(
        staging = cfg.staging_dirs.len(),
        volumes = cfg.destination_dirs.len(),
        once,
        "plotmover starting"
    );

    let mover = Mover::new(cfg);
    let signals = mover.shutdown().spawn_signal_listener();
    let result = if once {
        mover.run_once().await
    } else {
        mover.run().await
    };
    signals.abort();

    let report = result?;
    tracing::info!(
        rounds = report.rounds,
        completed = report.completed,
        failed = report.failed,
        cancelled = report.cancelled,
        bytes = report.bytes_moved,
        "plotmover exiting"
    );
    Ok(())
}
