//! Byte-level transfer primitives behind the `Transport` seam.
//!
//! Workers only ever call `copy` and `verify`; everything about how bytes
//! move and how equality is judged lives here.

mod copy;
mod verify;

pub use copy::{copy_file, CopyError};
pub use verify::{digests_equal, files_equal, sha256_path};

use std::io;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::config::{MoverConfig, VerifyMode};

/// Copy and compare operations used by transfer workers. Both are blocking
/// and are run on the blocking thread pool.
pub trait Transport: Send + Sync + 'static {
    /// Copy `src` to `dst`, returning the bytes written. Must check `cancel`
    /// between chunks and return `CopyError::Cancelled` once it fires.
    fn copy(&self, src: &Path, dst: &Path, cancel: &CancellationToken) -> Result<u64, CopyError>;

    /// Full-content equality of `src` and `dst`.
    fn verify(&self, src: &Path, dst: &Path) -> io::Result<bool>;
}

/// Local filesystem transport.
#[derive(Debug, Clone, Copy)]
pub struct LocalTransport {
    pub chunk_bytes: usize,
    pub verify: VerifyMode,
}

impl LocalTransport {
    pub fn from_config(cfg: &MoverConfig) -> Self {
        Self {
            chunk_bytes: cfg.copy_chunk_bytes,
            verify: cfg.verify,
        }
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::from_config(&MoverConfig::default())
    }
}

impl Transport for LocalTransport {
    fn copy(&self, src: &Path, dst: &Path, cancel: &CancellationToken) -> Result<u64, CopyError> {
        copy_file(src, dst, self.chunk_bytes, cancel)
    }

    fn verify(&self, src: &Path, dst: &Path) -> io::Result<bool> {
        match self.verify {
            VerifyMode::Bytes => files_equal(src, dst, self.chunk_bytes),
            VerifyMode::Sha256 => digests_equal(src, dst, self.chunk_bytes),
        }
    }
}
