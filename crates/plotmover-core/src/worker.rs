//! Transfer worker: one copy → verify → cleanup cycle for one file.
//!
//! Outcomes never propagate: every failure is logged and returned as a
//! `TransferOutcome`. The reservation is held until cleanup is done and is
//! released by drop on every exit path.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::TransferError;
use crate::registry::Reservation;
use crate::transfer::{CopyError, Transport};

/// Everything a worker needs to move one file.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub volume: PathBuf,
    pub source_name: OsString,
    pub size: u64,
}

#[derive(Debug)]
pub enum TransferOutcome {
    /// Copied, verified, source removed.
    Completed { bytes: u64 },
    /// Copy or verification failed; destination removed, source kept for a later round.
    Failed(TransferError),
    /// Shutdown interrupted the copy; destination removed, source kept.
    Cancelled,
}

impl TransferOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TransferOutcome::Failed(_))
    }
}

/// Removes a (possibly partial) file, treating "already gone" as success.
async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "could not remove file: {}", e),
    }
}

pub async fn run_transfer(
    job: TransferJob,
    reservation: Reservation,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
) -> TransferOutcome {
    let _reservation = reservation;
    let src = job.source.as_path();
    let dst = job.destination.as_path();
    tracing::info!(src = %src.display(), dst = %dst.display(), bytes = job.size, "start copying");

    let copied = tokio::task::spawn_blocking({
        let transport = Arc::clone(&transport);
        let (src, dst) = (job.source.clone(), job.destination.clone());
        let cancel = cancel.clone();
        move || transport.copy(&src, &dst, &cancel)
    })
    .await;

    let bytes = match copied {
        Ok(Ok(n)) => n,
        Ok(Err(CopyError::Cancelled)) => {
            remove_if_exists(dst).await;
            tracing::info!(src = %src.display(), dst = %dst.display(), "copy cancelled by shutdown");
            return TransferOutcome::Cancelled;
        }
        Ok(Err(e @ CopyError::SameFile { .. })) => {
            // `dst` is the source itself, so it is left alone.
            let err = TransferError::Copy {
                src: job.source.clone(),
                dst: job.destination.clone(),
                source: e.into_io(),
            };
            tracing::error!("{}", err);
            return TransferOutcome::Failed(err);
        }
        Ok(Err(e)) => {
            remove_if_exists(dst).await;
            let err = TransferError::Copy {
                src: job.source.clone(),
                dst: job.destination.clone(),
                source: e.into_io(),
            };
            tracing::error!("{}", err);
            return TransferOutcome::Failed(err);
        }
        Err(join) => {
            remove_if_exists(dst).await;
            let err = TransferError::Task {
                src: job.source.clone(),
                reason: join.to_string(),
            };
            tracing::error!("{}", err);
            return TransferOutcome::Failed(err);
        }
    };

    let verified = tokio::task::spawn_blocking({
        let transport = Arc::clone(&transport);
        let (src, dst) = (job.source.clone(), job.destination.clone());
        move || transport.verify(&src, &dst)
    })
    .await;

    let failure = match verified {
        Ok(Ok(true)) => None,
        Ok(Ok(false)) => Some(TransferError::Mismatch {
            src: job.source.clone(),
            dst: job.destination.clone(),
        }),
        Ok(Err(e)) => Some(TransferError::Verify {
            src: job.source.clone(),
            dst: job.destination.clone(),
            source: e,
        }),
        Err(join) => Some(TransferError::Task {
            src: job.source.clone(),
            reason: join.to_string(),
        }),
    };
    if let Some(err) = failure {
        remove_if_exists(dst).await;
        tracing::error!("{}; will copy again later", err);
        return TransferOutcome::Failed(err);
    }

    if let Err(e) = tokio::fs::remove_file(src).await {
        // The verified copy stands; the next round will copy over it again.
        tracing::error!(src = %src.display(), "copy verified but source not removed: {}", e);
    }
    tracing::info!(src = %src.display(), dst = %dst.display(), bytes, "copy done");
    TransferOutcome::Completed { bytes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VolumeOrder;
    use crate::registry::{Candidate, Registry};
    use crate::space::FreeSpace;
    use crate::transfer::LocalTransport;
    use std::fs;
    use tokio::sync::Semaphore;

    struct Unlimited;

    impl FreeSpace for Unlimited {
        fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
            Ok(u64::MAX)
        }
    }

    /// Copies for real, then flips the last byte of the destination.
    struct Corrupting;

    impl Transport for Corrupting {
        fn copy(
            &self,
            src: &Path,
            dst: &Path,
            cancel: &CancellationToken,
        ) -> Result<u64, CopyError> {
            let n = LocalTransport::default().copy(src, dst, cancel)?;
            let mut data = fs::read(dst)?;
            if let Some(last) = data.last_mut() {
                *last ^= 0xff;
            }
            fs::write(dst, data)?;
            Ok(n)
        }

        fn verify(&self, src: &Path, dst: &Path) -> io::Result<bool> {
            LocalTransport::default().verify(src, dst)
        }
    }

    struct Fixture {
        _root: tempfile::TempDir,
        registry: Arc<Registry>,
        slots: Arc<Semaphore>,
        job: TransferJob,
        body: Vec<u8>,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join("staging");
        let volume = root.path().join("hdd1");
        fs::create_dir(&staging).unwrap();
        fs::create_dir(&volume).unwrap();
        let body: Vec<u8> = (0u8..97).cycle().take(20_000).collect();
        let source = staging.join("k32-1.plot");
        fs::write(&source, &body).unwrap();
        let job = TransferJob {
            destination: volume.join("k32-1.plot"),
            source,
            volume: volume.clone(),
            source_name: OsString::from("k32-1.plot"),
            size: body.len() as u64,
        };
        Fixture {
            _root: root,
            registry: Arc::new(Registry::new([volume])),
            slots: Arc::new(Semaphore::new(1)),
            job,
            body,
        }
    }

    fn reserve(f: &Fixture) -> Reservation {
        let candidate = Candidate {
            path: f.job.source.clone(),
            name: f.job.source_name.clone(),
            size: f.job.size,
        };
        let permit = Arc::clone(&f.slots).try_acquire_owned().unwrap();
        f.registry
            .try_reserve(&candidate, &Unlimited, VolumeOrder::Path, permit)
            .unwrap()
    }

    fn assert_released(f: &Fixture) {
        assert_eq!(f.registry.busy_count(), 0);
        assert_eq!(f.registry.in_flight_count(), 0);
        assert_eq!(f.slots.available_permits(), 1);
    }

    #[tokio::test]
    async fn successful_transfer_moves_file_and_releases() {
        let f = fixture();
        let r = reserve(&f);
        let out = run_transfer(
            f.job.clone(),
            r,
            Arc::new(LocalTransport::default()),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(out, TransferOutcome::Completed { bytes } if bytes == 20_000));
        assert!(!f.job.source.exists());
        assert_eq!(fs::read(&f.job.destination).unwrap(), f.body);
        assert_released(&f);
    }

    #[tokio::test]
    async fn mismatch_removes_destination_and_keeps_source() {
        let f = fixture();
        let r = reserve(&f);
        let out = run_transfer(
            f.job.clone(),
            r,
            Arc::new(Corrupting),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(
            out,
            TransferOutcome::Failed(TransferError::Mismatch { .. })
        ));
        assert!(!f.job.destination.exists());
        assert_eq!(fs::read(&f.job.source).unwrap(), f.body);
        assert_released(&f);
    }

    #[tokio::test]
    async fn cancelled_copy_cleans_up_and_is_not_a_failure() {
        let f = fixture();
        let r = reserve(&f);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = run_transfer(f.job.clone(), r, Arc::new(LocalTransport::default()), cancel).await;
        assert!(matches!(out, TransferOutcome::Cancelled));
        assert!(!out.is_failure());
        assert!(!f.job.destination.exists());
        assert!(f.job.source.exists());
        assert_released(&f);
    }

    #[tokio::test]
    async fn destination_resolving_to_source_keeps_the_plot() {
        let f = fixture();
        let mut job = f.job.clone();
        let staging = job.source.parent().unwrap().to_path_buf();
        job.destination = staging.join(".").join(&job.source_name);
        let r = reserve(&f);
        let out = run_transfer(
            job,
            r,
            Arc::new(LocalTransport::default()),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(
            out,
            TransferOutcome::Failed(TransferError::Copy { .. })
        ));
        assert_eq!(fs::read(&f.job.source).unwrap(), f.body);
        assert_released(&f);
    }

    #[tokio::test]
    async fn missing_source_is_copy_failure() {
        let f = fixture();
        fs::remove_file(&f.job.source).unwrap();
        let r = reserve(&f);
        let out = run_transfer(
            f.job.clone(),
            r,
            Arc::new(LocalTransport::default()),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(
            out,
            TransferOutcome::Failed(TransferError::Copy { .. })
        ));
        assert!(!f.job.destination.exists());
        assert_released(&f);
    }
}
