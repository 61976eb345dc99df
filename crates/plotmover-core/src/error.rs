//! Error taxonomy.
//!
//! `ConfigError` and `WalkError` are fatal. `TransferError` never leaves the
//! worker that produced it; it is logged and folded into a `TransferOutcome`.

use std::io;
use std::path::PathBuf;

/// Invalid or missing configuration. The daemon does not start.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no staging_dirs configured")]
    NoStagingDirs,
    #[error("no destination_dirs configured")]
    NoDestinationDirs,
    #[error("path listed more than once: {}", .0.display())]
    DuplicatePath(PathBuf),
    #[error("path does not exist: {}", .0.display())]
    MissingPath(PathBuf),
    #[error("path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error(
        "staging dir {} and destination {} overlap (one is inside the other)",
        .staging.display(),
        .destination.display()
    )]
    NestedPath {
        staging: PathBuf,
        destination: PathBuf,
    },
    #[error("copy_chunk_bytes must be greater than zero")]
    ZeroChunkSize,
    #[error("plot_extension must not be empty")]
    EmptyExtension,
}

/// Directory traversal failure while scanning a staging location.
#[derive(Debug, thiserror::Error)]
#[error("walking staging dir {}: {source}", .staging.display())]
pub struct WalkError {
    pub staging: PathBuf,
    #[source]
    pub source: walkdir::Error,
}

/// Recoverable failure of a single transfer. The source file is left in place
/// and becomes eligible again on the next round.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("copy {} -> {}: {source}", .src.display(), .dst.display())]
    Copy {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("content mismatch between {} and {}", .src.display(), .dst.display())]
    Mismatch { src: PathBuf, dst: PathBuf },
    #[error("verify {} against {}: {source}", .dst.display(), .src.display())]
    Verify {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("transfer task for {} failed: {reason}", .src.display())]
    Task { src: PathBuf, reason: String },
}
