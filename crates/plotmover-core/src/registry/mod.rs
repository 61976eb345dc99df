//! Shared bookkeeping for in-flight transfers.
//!
//! One `Registry` owns both the destination volume table and the source
//! tracker behind a single mutex. Selection (busy flags, in-flight names and
//! the live free-space probe) and the reservation it leads to happen in one
//! critical section, so two dispatches can never claim the same volume or the
//! same source file. The lock is never held across a transfer.

mod guard;
mod sources;
mod volumes;

pub use guard::Reservation;
pub use sources::SourceTracker;
pub use volumes::{VolumeStatus, VolumeTable};

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedSemaphorePermit;

use crate::config::VolumeOrder;
use crate::space::FreeSpace;

/// An eligible file found in a staging location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub name: OsString,
    pub size: u64,
}

/// Why `try_reserve` did not hand out a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declined {
    /// Another worker already owns a file with this name.
    InFlight,
    /// Every volume is busy or too small for the file.
    NoVolume,
}

#[derive(Debug)]
struct RegistryState {
    volumes: VolumeTable,
    sources: SourceTracker,
}

#[derive(Debug)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new<I>(volumes: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        Self {
            state: Mutex::new(RegistryState {
                volumes: VolumeTable::new(volumes),
                sources: SourceTracker::new(),
            }),
        }
    }

    // The state is plain bookkeeping; a panic elsewhere cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn volume_count(&self) -> usize {
        self.lock().volumes.len()
    }

    pub fn snapshot(&self) -> Vec<VolumeStatus> {
        self.lock().volumes.snapshot()
    }

    pub fn busy_volumes(&self) -> Vec<PathBuf> {
        self.lock().volumes.busy_volumes()
    }

    pub fn busy_count(&self) -> usize {
        self.busy_volumes().len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock().sources.len()
    }

    pub fn is_in_flight(&self, name: &OsStr) -> bool {
        self.lock().sources.contains(name)
    }

    /// Picks a destination for `candidate` and reserves it together with the
    /// source name, all under the registry lock. The volume chosen is the
    /// first free one in `order` whose live free space is at least the file size.
    ///
    /// `slot` is consumed either way; on decline it is dropped and returned to
    /// its semaphore.
    pub fn try_reserve(
        self: &Arc<Self>,
        candidate: &Candidate,
        space: &dyn FreeSpace,
        order: VolumeOrder,
        slot: OwnedSemaphorePermit,
    ) -> Result<Reservation, Declined> {
        let mut state = self.lock();
        if state.sources.contains(&candidate.name) {
            return Err(Declined::InFlight);
        }
        let volume = select_volume(&state.volumes, candidate.size, space, order)
            .ok_or(Declined::NoVolume)?;

        let marked = state.volumes.mark_busy(&volume);
        let reserved = state.sources.reserve(&candidate.name);
        debug_assert!(marked && reserved);
        drop(state);

        Ok(Reservation::new(
            Arc::clone(self),
            volume,
            candidate.name.clone(),
            slot,
        ))
    }

    pub(crate) fn release(&self, volume: &Path, source_name: &OsStr) {
        let mut state = self.lock();
        state.volumes.mark_free(volume);
        state.sources.release(source_name);
    }
}

fn probe(space: &dyn FreeSpace, volume: &Path) -> Option<u64> {
    match space.available_bytes(volume) {
        Ok(avail) => Some(avail),
        Err(e) => {
            tracing::warn!(volume = %volume.display(), "free-space query failed: {}", e);
            None
        }
    }
}

fn select_volume(
    volumes: &VolumeTable,
    size: u64,
    space: &dyn FreeSpace,
    order: VolumeOrder,
) -> Option<PathBuf> {
    match order {
        VolumeOrder::Path => volumes
            .free_volumes()
            .find(|v| probe(space, v).is_some_and(|avail| avail >= size))
            .map(Path::to_path_buf),
        VolumeOrder::MostFree => volumes
            .free_volumes()
            .filter_map(|v| probe(space, v).map(|avail| (avail, v)))
            .filter(|(avail, _)| *avail >= size)
            // Largest space wins; among equals the smallest path does.
            .max_by(|(a1, p1), (a2, p2)| a1.cmp(a2).then_with(|| p2.cmp(p1)))
            .map(|(_, v)| v.to_path_buf()),
    }
}
