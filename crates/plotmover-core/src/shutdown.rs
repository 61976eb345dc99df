//! Shutdown coordination: Running → Draining → Terminated.
//!
//! A SIGINT/SIGTERM (or `request_stop`) cancels the shared token. The round
//! loop and every worker watch that token; `drain` then waits until the
//! registry reports no busy volume.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining,
    Terminated,
}

pub struct ShutdownCoordinator {
    cancel: CancellationToken,
    registry: Arc<Registry>,
    poll: Duration,
    phase: watch::Sender<Phase>,
}

impl ShutdownCoordinator {
    /// `poll` is how often `drain` re-checks the registry.
    pub fn new(registry: Arc<Registry>, poll: Duration) -> Self {
        let (phase, _) = watch::channel(Phase::Running);
        Self {
            cancel: CancellationToken::new(),
            registry,
            poll,
            phase,
        }
    }

    /// Token shared with the scanner and workers.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn phase(&self) -> Phase {
        match *self.phase.borrow() {
            Phase::Running if self.cancel.is_cancelled() => Phase::Draining,
            p => p,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn request_stop(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!("stop requested, no new transfers will start");
        }
        self.cancel.cancel();
        self.phase.send_if_modified(|p| {
            if *p == Phase::Running {
                *p = Phase::Draining;
                true
            } else {
                false
            }
        });
    }

    /// Installs SIGINT/SIGTERM handlers; the first signal cancels the token.
    /// The listener exits quietly if the token is cancelled some other way.
    pub fn spawn_signal_listener(&self) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                res = wait_for_signal() => match res {
                    Ok(name) => {
                        tracing::warn!("stopped by {}, will exit once transfers drain", name);
                        cancel.cancel();
                    }
                    Err(e) => tracing::error!("could not install signal handler: {}", e),
                },
                _ = cancel.cancelled() => {}
            }
        })
    }

    /// Stops new work and waits until every volume is free again, logging the
    /// volumes still busy at each poll.
    pub async fn drain(&self) {
        self.request_stop();
        loop {
            let busy = self.registry.busy_volumes();
            if busy.is_empty() {
                break;
            }
            for volume in &busy {
                tracing::info!(volume = %volume.display(), "still working");
            }
            tokio::time::sleep(self.poll).await;
        }
        self.phase.send_replace(Phase::Terminated);
        tracing::warn!("all transfers stopped");
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "Ctrl-C")
}
