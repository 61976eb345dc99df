//! Fault-injecting and instrumented transports.

use plotmover_core::transfer::{CopyError, LocalTransport, Transport};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Writes part of the file, then fails as if the destination disk errored.
pub struct FailingTransport;

impl Transport for FailingTransport {
    fn copy(&self, src: &Path, dst: &Path, _cancel: &CancellationToken) -> Result<u64, CopyError> {
        let data = std::fs::read(src)?;
        std::fs::write(dst, &data[..data.len() / 2])?;
        Err(CopyError::Io(io::Error::new(
            io::ErrorKind::Other,
            "simulated write error",
        )))
    }

    fn verify(&self, src: &Path, dst: &Path) -> io::Result<bool> {
        LocalTransport::default().verify(src, dst)
    }
}

/// Copies chunk by chunk with a delay after each chunk, and records how many
/// copies target each volume and each source name at once.
pub struct SlowTransport {
    chunk: usize,
    delay: Duration,
    active_volumes: Mutex<HashSet<PathBuf>>,
    active_sources: Mutex<HashSet<PathBuf>>,
    pub started: AtomicUsize,
    pub peak: AtomicUsize,
    pub violations: AtomicUsize,
}

impl SlowTransport {
    pub fn new(chunk: usize, delay: Duration) -> Self {
        Self {
            chunk,
            delay,
            active_volumes: Mutex::new(HashSet::new()),
            active_sources: Mutex::new(HashSet::new()),
            started: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            violations: AtomicUsize::new(0),
        }
    }

    fn enter(&self, volume: &Path, name: &Path) {
        self.started.fetch_add(1, Ordering::SeqCst);
        let mut vols = self.active_volumes.lock().unwrap();
        let mut srcs = self.active_sources.lock().unwrap();
        if !vols.insert(volume.to_path_buf()) || !srcs.insert(name.to_path_buf()) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        self.peak.fetch_max(vols.len(), Ordering::SeqCst);
    }

    fn leave(&self, volume: &Path, name: &Path) {
        self.active_volumes.lock().unwrap().remove(volume);
        self.active_sources.lock().unwrap().remove(name);
    }

    fn copy_chunks(
        &self,
        src: &Path,
        dst: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, CopyError> {
        let mut source = File::open(src)?;
        let mut destination = File::create(dst)?;
        let mut buf = vec![0u8; self.chunk];
        let mut copied = 0u64;
        loop {
            if cancel.is_cancelled() {
                return Err(CopyError::Cancelled);
            }
            let n = source.read(&mut buf)?;
            if n == 0 {
                return Ok(copied);
            }
            destination.write_all(&buf[..n])?;
            copied += n as u64;
            std::thread::sleep(self.delay);
        }
    }
}

impl Transport for SlowTransport {
    fn copy(&self, src: &Path, dst: &Path, cancel: &CancellationToken) -> Result<u64, CopyError> {
        let volume = dst.parent().unwrap_or(dst);
        let name = Path::new(src.file_name().unwrap_or_default());
        self.enter(volume, name);
        let res = self.copy_chunks(src, dst, cancel);
        self.leave(volume, name);
        res
    }

    fn verify(&self, src: &Path, dst: &Path) -> io::Result<bool> {
        LocalTransport::default().verify(src, dst)
    }
}
