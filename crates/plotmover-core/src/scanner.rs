//! Dispatcher: one scan round over all staging locations.
//!
//! Each eligible file is offered a destination; on success a worker is
//! spawned on the scanner's `JoinSet`. Files that cannot be placed this round
//! are left untouched and reconsidered next round.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use walkdir::{DirEntry, WalkDir};

use crate::config::{MoverConfig, VolumeOrder};
use crate::error::{TransferError, WalkError};
use crate::registry::{Candidate, Declined, Registry};
use crate::space::FreeSpace;
use crate::transfer::Transport;
use crate::worker::{self, TransferJob, TransferOutcome};

/// Counts for one round, mostly for the round log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundSummary {
    /// Eligible files seen.
    pub candidates: usize,
    pub dispatched: usize,
    /// Skipped because a worker already owns a file with that name.
    pub in_flight: usize,
    /// Skipped because no free volume had room.
    pub no_volume: usize,
    /// Skipped because every concurrency slot was taken.
    pub no_slot: usize,
    /// The walk was abandoned because stop was requested.
    pub aborted: bool,
}

pub struct Scanner {
    staging_dirs: Vec<PathBuf>,
    /// Destination volumes, never entered by the walk.
    destinations: Vec<PathBuf>,
    extension: String,
    order: VolumeOrder,
    registry: Arc<Registry>,
    space: Arc<dyn FreeSpace>,
    transport: Arc<dyn Transport>,
    slots: Arc<Semaphore>,
    cancel: CancellationToken,
    workers: JoinSet<TransferOutcome>,
    /// Source path of each running worker, for reporting a task that panicked.
    sources_by_task: HashMap<Id, PathBuf>,
}

impl Scanner {
    /// Builds a scanner with one concurrency slot per registered volume.
    pub fn new(
        cfg: &MoverConfig,
        registry: Arc<Registry>,
        space: Arc<dyn FreeSpace>,
        transport: Arc<dyn Transport>,
        cancel: CancellationToken,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(registry.volume_count()));
        Self {
            staging_dirs: cfg.staging_dirs.clone(),
            destinations: destination_set(&cfg.destination_dirs),
            extension: cfg.extension().to_string(),
            order: cfg.volume_order,
            registry,
            space,
            transport,
            slots,
            cancel,
            workers: JoinSet::new(),
            sources_by_task: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Slots not held by a running worker.
    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Worker tasks spawned and not yet collected.
    pub fn pending_workers(&self) -> usize {
        self.workers.len()
    }

    /// Walks every staging location once and dispatches what it can.
    ///
    /// The stop token is checked before each staging location and before each
    /// directory entry, so a stop request abandons the walk promptly. A
    /// traversal error is returned immediately; workers already spawned keep
    /// running.
    pub fn scan_round(&mut self, round: u64) -> Result<RoundSummary, WalkError> {
        let mut summary = RoundSummary::default();
        tracing::debug!(round, "scan round started");

        let staging_dirs = self.staging_dirs.clone();
        let destinations = self.destinations.clone();
        for staging in &staging_dirs {
            for entry in walk(staging, &destinations) {
                if self.cancel.is_cancelled() {
                    summary.aborted = true;
                    tracing::debug!(round, "stop requested, abandoning walk");
                    return Ok(summary);
                }
                let entry = entry.map_err(|source| WalkError {
                    staging: staging.clone(),
                    source,
                })?;
                if !is_eligible(&entry, &self.extension) {
                    continue;
                }
                let size = match entry.metadata() {
                    Ok(meta) => meta.len(),
                    Err(e) => {
                        // Typically the file vanished between listing and stat.
                        tracing::warn!(path = %entry.path().display(), "skipping file: {}", e);
                        continue;
                    }
                };
                summary.candidates += 1;
                self.offer(
                    Candidate {
                        path: entry.path().to_path_buf(),
                        name: entry.file_name().to_os_string(),
                        size,
                    },
                    &mut summary,
                );
            }
        }

        tracing::debug!(
            round,
            candidates = summary.candidates,
            dispatched = summary.dispatched,
            in_flight = summary.in_flight,
            no_volume = summary.no_volume,
            no_slot = summary.no_slot,
            "scan round finished"
        );
        Ok(summary)
    }

    /// Tries to reserve a slot and a destination for `candidate` and spawn its worker.
    fn offer(&mut self, candidate: Candidate, summary: &mut RoundSummary) {
        let path = candidate.path.display();
        if self.registry.is_in_flight(&candidate.name) {
            summary.in_flight += 1;
            tracing::debug!(src = %path, "already in flight, skipping");
            return;
        }
        let Ok(slot) = Arc::clone(&self.slots).try_acquire_owned() else {
            summary.no_slot += 1;
            tracing::debug!(src = %path, "no free transfer slot, retry next round");
            return;
        };
        let reservation =
            match self
                .registry
                .try_reserve(&candidate, self.space.as_ref(), self.order, slot)
            {
                Ok(r) => r,
                Err(Declined::InFlight) => {
                    summary.in_flight += 1;
                    tracing::debug!(src = %path, "already in flight, skipping");
                    return;
                }
                Err(Declined::NoVolume) => {
                    summary.no_volume += 1;
                    tracing::debug!(
                        src = %path,
                        bytes = candidate.size,
                        "no free volume with enough space, retry next round"
                    );
                    return;
                }
            };

        let volume = reservation.volume().to_path_buf();
        let job = TransferJob {
            destination: volume.join(&candidate.name),
            volume,
            source: candidate.path.clone(),
            source_name: candidate.name,
            size: candidate.size,
        };
        summary.dispatched += 1;
        let handle = self.workers.spawn(worker::run_transfer(
            job,
            reservation,
            Arc::clone(&self.transport),
            self.cancel.clone(),
        ));
        self.sources_by_task.insert(handle.id(), candidate.path);
    }

    /// Collects outcomes of workers that have already finished, without waiting.
    pub fn reap(&mut self) -> Vec<TransferOutcome> {
        let mut done = Vec::new();
        while let Some(res) = self.workers.try_join_next_with_id() {
            let outcome = self.settle(res);
            done.push(outcome);
        }
        done
    }

    /// Waits for every spawned worker and returns their outcomes.
    pub async fn join_all(&mut self) -> Vec<TransferOutcome> {
        let mut done = Vec::new();
        while let Some(res) = self.workers.join_next_with_id().await {
            let outcome = self.settle(res);
            done.push(outcome);
        }
        done
    }

    /// Maps a joined worker to its outcome. A worker that panicked or was
    /// aborted becomes a `Task` failure naming its source file.
    fn settle(&mut self, res: Result<(Id, TransferOutcome), JoinError>) -> TransferOutcome {
        match res {
            Ok((id, outcome)) => {
                self.sources_by_task.remove(&id);
                outcome
            }
            Err(e) => {
                let err = TransferError::Task {
                    src: self.sources_by_task.remove(&e.id()).unwrap_or_default(),
                    reason: e.to_string(),
                };
                tracing::error!("{}", err);
                TransferOutcome::Failed(err)
            }
        }
    }
}

/// Regular file (symlinks are not followed) whose extension is `extension`.
fn is_eligible(entry: &DirEntry, extension: &str) -> bool {
    entry.file_type().is_file()
        && Path::new(entry.file_name()).extension() == Some(OsStr::new(extension))
}

/// Each destination as configured plus its resolved form, so the walk
/// recognises a volume under either spelling.
fn destination_set(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut set = dirs.to_vec();
    set.extend(dirs.iter().filter_map(|d| fs::canonicalize(d).ok()));
    set.sort();
    set.dedup();
    set
}

fn is_destination(entry: &DirEntry, destinations: &[PathBuf]) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let path = entry.path();
    let hit = destinations.iter().any(|d| d == path)
        || fs::canonicalize(path).is_ok_and(|c| destinations.contains(&c));
    if hit {
        tracing::debug!(dir = %path.display(), "destination volume inside staging dir, not descending");
    }
    hit
}

/// Name-sorted walk of `staging` that prunes any destination volume.
fn walk<'a>(
    staging: &Path,
    destinations: &'a [PathBuf],
) -> impl Iterator<Item = walkdir::Result<DirEntry>> + 'a {
    WalkDir::new(staging)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| !is_destination(e, destinations))
}

/// Eligible files under `staging`, in walk order, without dispatching anything.
/// Directories listed in `destinations` are skipped.
pub fn list_candidates(
    staging: &Path,
    extension: &str,
    destinations: &[PathBuf],
) -> Result<Vec<Candidate>, WalkError> {
    let destinations = destination_set(destinations);
    let mut found = Vec::new();
    for entry in walk(staging, &destinations) {
        let entry = entry.map_err(|source| WalkError {
            staging: staging.to_path_buf(),
            source,
        })?;
        if !is_eligible(&entry, extension) {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            found.push(Candidate {
                path: entry.path().to_path_buf(),
                name: entry.file_name().to_os_string(),
                size: meta.len(),
            });
        }
    }
    Ok(found)
}
