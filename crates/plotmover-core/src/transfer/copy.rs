//! Chunked file copy that honours a cancellation token between chunks.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

/// Why a copy did not complete.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error("{} is not a regular file", .0.display())]
    NotRegular(PathBuf),
    /// Source and destination resolve to the same file; nothing was written.
    #[error("{} and {} are the same file", .src.display(), .dst.display())]
    SameFile { src: PathBuf, dst: PathBuf },
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Stop was requested; the copy gave up between two chunks.
    #[error("copy cancelled by shutdown")]
    Cancelled,
}

impl CopyError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CopyError::Cancelled)
    }

    /// Converts to an `io::Error` for reporting. Not meaningful for `Cancelled`.
    pub fn into_io(self) -> io::Error {
        match self {
            CopyError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}

/// Copies `src` to `dst` in `chunk_bytes` pieces, creating or truncating `dst`.
/// `cancel` is checked before every chunk, so a stop request takes effect
/// within one chunk's worth of I/O. The destination is synced before returning.
///
/// The caller owns cleanup: on any error other than `SameFile` a partial
/// `dst` may be left behind. On `SameFile`, `dst` is the source and must be kept.
pub fn copy_file(
    src: &Path,
    dst: &Path,
    chunk_bytes: usize,
    cancel: &CancellationToken,
) -> Result<u64, CopyError> {
    let meta = std::fs::metadata(src)?;
    if !meta.is_file() {
        return Err(CopyError::NotRegular(src.to_path_buf()));
    }

    if let (Ok(a), Ok(b)) = (std::fs::canonicalize(src), std::fs::canonicalize(dst)) {
        if a == b {
            return Err(CopyError::SameFile {
                src: src.to_path_buf(),
                dst: dst.to_path_buf(),
            });
        }
    }

    let mut source = File::open(src)?;
    let mut destination = File::create(dst)?;
    let mut buf = vec![0u8; chunk_bytes.max(1)];
    let mut copied = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(CopyError::Cancelled);
        }
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        destination.write_all(&buf[..n])?;
        copied += n as u64;
    }

    destination.sync_all()?;
    Ok(copied)
}
