//! Set of source file names currently owned by a worker.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};

/// Source files in flight, keyed by file name so the same plot found in two
/// staging locations is only dispatched once.
#[derive(Debug, Default)]
pub struct SourceTracker {
    in_flight: HashSet<OsString>,
}

impl SourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `name` was not already reserved.
    pub fn reserve(&mut self, name: &OsStr) -> bool {
        if self.in_flight.contains(name) {
            return false;
        }
        self.in_flight.insert(name.to_os_string())
    }

    pub fn release(&mut self, name: &OsStr) {
        self.in_flight.remove(name);
    }

    pub fn contains(&self, name: &OsStr) -> bool {
        self.in_flight.contains(name)
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}
