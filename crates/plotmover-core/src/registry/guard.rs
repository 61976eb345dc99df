//! RAII guard that releases a reservation when dropped.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

use super::Registry;

/// One dispatched transfer's claim on a destination volume, a source name and
/// a concurrency slot. Dropping it frees all three, whatever path the worker
/// exits by (including panic or task abort).
#[derive(Debug)]
pub struct Reservation {
    registry: Arc<Registry>,
    volume: PathBuf,
    source_name: OsString,
    _slot: OwnedSemaphorePermit,
}

impl Reservation {
    pub(super) fn new(
        registry: Arc<Registry>,
        volume: PathBuf,
        source_name: OsString,
        slot: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            registry,
            volume,
            source_name,
            _slot: slot,
        }
    }

    pub fn volume(&self) -> &Path {
        &self.volume
    }

    pub fn source_name(&self) -> &OsStr {
        &self.source_name
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.registry.release(&self.volume, &self.source_name);
        tracing::debug!(volume = %self.volume.display(), "reservation released");
    }
}
