//! Destination volume table: path -> busy flag.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Read-only view of one volume, as returned by `snapshot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeStatus {
    pub path: PathBuf,
    pub busy: bool,
}

/// Busy flags for the configured destination volumes, ordered by path.
/// Entries are created once and never removed.
#[derive(Debug, Default)]
pub struct VolumeTable {
    busy: BTreeMap<PathBuf, bool>,
}

impl VolumeTable {
    pub fn new<I>(volumes: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        Self {
            busy: volumes.into_iter().map(|v| (v, false)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.busy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.busy.is_empty()
    }

    /// Marks `volume` busy. Returns false if it is unknown or already busy.
    pub fn mark_busy(&mut self, volume: &Path) -> bool {
        match self.busy.get_mut(volume) {
            Some(flag) if !*flag => {
                *flag = true;
                true
            }
            _ => false,
        }
    }

    /// Marks `volume` free. Idempotent; unknown volumes are ignored.
    pub fn mark_free(&mut self, volume: &Path) {
        if let Some(flag) = self.busy.get_mut(volume) {
            *flag = false;
        }
    }

    pub fn is_busy(&self, volume: &Path) -> bool {
        self.busy.get(volume).copied().unwrap_or(false)
    }

    pub fn snapshot(&self) -> Vec<VolumeStatus> {
        self.busy
            .iter()
            .map(|(path, busy)| VolumeStatus {
                path: path.clone(),
                busy: *busy,
            })
            .collect()
    }

    /// Free volumes in path order.
    pub fn free_volumes(&self) -> impl Iterator<Item = &Path> {
        self.busy
            .iter()
            .filter(|(_, busy)| !**busy)
            .map(|(path, _)| path.as_path())
    }

    pub fn busy_volumes(&self) -> Vec<PathBuf> {
        self.busy
            .iter()
            .filter(|(_, busy)| **busy)
            .map(|(path, _)| path.clone())
            .collect()
    }
}
