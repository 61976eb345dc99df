//! Round loop: scan, dispatch, sleep, repeat until stopped, then drain.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::MoverConfig;
use crate::registry::Registry;
use crate::scanner::Scanner;
use crate::shutdown::ShutdownCoordinator;
use crate::space::{FreeSpace, StatvfsProbe};
use crate::transfer::{LocalTransport, Transport};
use crate::worker::TransferOutcome;

/// Totals over the life of one `Mover`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoverReport {
    pub rounds: u64,
    pub completed: u64,
    pub bytes_moved: u64,
    /// Copy failures and verification mismatches.
    pub failed: u64,
    /// Copies interrupted by shutdown; not failures.
    pub cancelled: u64,
}

impl MoverReport {
    fn record(&mut self, outcomes: Vec<TransferOutcome>) {
        for outcome in outcomes {
            match outcome {
                TransferOutcome::Completed { bytes } => {
                    self.completed += 1;
                    self.bytes_moved += bytes;
                }
                TransferOutcome::Failed(_) => self.failed += 1,
                TransferOutcome::Cancelled => self.cancelled += 1,
            }
        }
    }
}

pub struct Mover {
    scanner: Scanner,
    shutdown: ShutdownCoordinator,
    round_interval: Duration,
    report: MoverReport,
}

impl Mover {
    /// Mover over the local filesystem, as configured.
    pub fn new(cfg: &MoverConfig) -> Self {
        Self::with_parts(
            cfg,
            Arc::new(StatvfsProbe),
            Arc::new(LocalTransport::from_config(cfg)),
        )
    }

    /// Mover with an explicit free-space probe and transport.
    pub fn with_parts(
        cfg: &MoverConfig,
        space: Arc<dyn FreeSpace>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let registry = Arc::new(Registry::new(cfg.destination_dirs.iter().cloned()));
        let shutdown = ShutdownCoordinator::new(Arc::clone(&registry), cfg.drain_poll());
        let scanner = Scanner::new(cfg, registry, space, transport, shutdown.token());
        Self {
            scanner,
            shutdown,
            round_interval: cfg.round_interval(),
            report: MoverReport::default(),
        }
    }

    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.scanner.registry()
    }

    /// Runs rounds until stop is requested, then drains in-flight transfers.
    ///
    /// A walk error ends the loop; in-flight transfers are still drained
    /// before the error is returned.
    pub async fn run(mut self) -> Result<MoverReport> {
        let mut round = 0u64;
        let walk_result = loop {
            if self.shutdown.is_stopping() {
                break Ok(());
            }
            round += 1;
            let summary = match self.scanner.scan_round(round) {
                Ok(s) => s,
                Err(e) => break Err(e),
            };
            self.report.rounds += 1;
            let finished = self.scanner.reap();
            self.report.record(finished);
            if summary.aborted {
                break Ok(());
            }
            tracing::info!(
                round,
                dispatched = summary.dispatched,
                busy = self.registry().busy_count(),
                "round done, next round in {}s",
                self.round_interval.as_secs()
            );
            wait_for_next_round(self.shutdown.token(), self.round_interval).await;
        };

        if let Err(ref e) = walk_result {
            tracing::error!("{}; draining in-flight transfers before exit", e);
        }
        self.finish().await;
        walk_result?;
        Ok(self.report)
    }

    /// One round, then wait for the transfers it started (or drain, if a
    /// stop arrives meanwhile).
    pub async fn run_once(mut self) -> Result<MoverReport> {
        let walk_result = self.scanner.scan_round(1);
        if walk_result.is_ok() {
            self.report.rounds = 1;
        }
        let outcomes = self.scanner.join_all().await;
        self.report.record(outcomes);
        if let Err(ref e) = walk_result {
            tracing::error!("{}", e);
        }
        self.finish().await;
        walk_result?;
        Ok(self.report)
    }

    async fn finish(&mut self) {
        self.shutdown.drain().await;
        let outcomes = self.scanner.join_all().await;
        self.report.record(outcomes);
        tracing::info!(
            rounds = self.report.rounds,
            completed = self.report.completed,
            failed = self.report.failed,
            cancelled = self.report.cancelled,
            bytes = self.report.bytes_moved,
            "mover stopped"
        );
    }
}

/// Sleeps for `interval`, returning early once stop is requested.
async fn wait_for_next_round(token: CancellationToken, interval: Duration) {
    tokio::select! {
        _ = tokio::time::sleep(interval) => {}
        _ = token.cancelled() => {}
    }
}
