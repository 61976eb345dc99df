#![allow(dead_code)]

pub mod transports;

use plotmover_core::config::MoverConfig;
use plotmover_core::space::FreeSpace;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Free-space probe with values set by the test.
#[derive(Default)]
pub struct FixedSpace(Mutex<HashMap<PathBuf, u64>>);

impl FixedSpace {
    pub fn with<P: AsRef<Path>>(entries: &[(P, u64)]) -> Self {
        let s = Self::default();
        for (p, n) in entries {
            s.set(p.as_ref(), *n);
        }
        s
    }

    pub fn set(&self, path: &Path, bytes: u64) {
        self.0.lock().unwrap().insert(path.to_path_buf(), bytes);
    }
}

impl FreeSpace for FixedSpace {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        self.0
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown volume"))
    }
}

/// Temp tree with `staging` dirs and `volumes`, plus a matching config.
pub struct Farm {
    pub root: tempfile::TempDir,
    pub staging: Vec<PathBuf>,
    pub volumes: Vec<PathBuf>,
}

impl Farm {
    pub fn new(staging: usize, volumes: usize) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mk = |name: String| {
            let p = root.path().join(name);
            std::fs::create_dir(&p).unwrap();
            p
        };
        let staging = (0..staging).map(|i| mk(format!("tmp{i}"))).collect();
        let volumes = (0..volumes).map(|i| mk(format!("hdd{i}"))).collect();
        Self {
            root,
            staging,
            volumes,
        }
    }

    pub fn config(&self) -> MoverConfig {
        MoverConfig {
            staging_dirs: self.staging.clone(),
            destination_dirs: self.volumes.clone(),
            round_interval_secs: 0,
            drain_poll_secs: 1,
            copy_chunk_bytes: 4096,
            ..MoverConfig::default()
        }
    }

    /// Writes a plot of `len` patterned bytes and returns its path and content.
    pub fn plot(&self, staging: usize, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
        let body: Vec<u8> = (0u8..=250).cycle().skip(name.len()).take(len).collect();
        let path = self.staging[staging].join(name);
        std::fs::write(&path, &body).unwrap();
        (path, body)
    }
}

/// Polls `cond` every 5ms, panicking after 10s.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
