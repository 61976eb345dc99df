//! Post-copy verification: full-content equality of source and destination.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Compute SHA-256 of a file and return the digest as lowercase hex.
/// Reads in chunks to keep memory use bounded; suitable for large files.
pub fn sha256_path(path: &Path, chunk_bytes: usize) -> io::Result<String> {
    let mut f = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; chunk_bytes.max(1)];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Reads until `buf` is full or EOF; returns the number of bytes read.
fn read_full(f: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match f.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Byte-for-byte comparison, chunk by chunk. Files of different length are
/// unequal without reading either.
pub fn files_equal(a: &Path, b: &Path, chunk_bytes: usize) -> io::Result<bool> {
    if std::fs::metadata(a)?.len() != std::fs::metadata(b)?.len() {
        return Ok(false);
    }
    let mut fa = File::open(a)?;
    let mut fb = File::open(b)?;
    let chunk = chunk_bytes.max(1);
    let mut buf_a = vec![0u8; chunk];
    let mut buf_b = vec![0u8; chunk];
    loop {
        let na = read_full(&mut fa, &mut buf_a)?;
        let nb = read_full(&mut fb, &mut buf_b)?;
        if na != nb || buf_a[..na] != buf_b[..nb] {
            return Ok(false);
        }
        if na == 0 {
            return Ok(true);
        }
    }
}

/// Digest comparison; slower than `files_equal` but leaves a hash in the log.
pub fn digests_equal(a: &Path, b: &Path, chunk_bytes: usize) -> io::Result<bool> {
    let da = sha256_path(a, chunk_bytes)?;
    let db = sha256_path(b, chunk_bytes)?;
    tracing::debug!(src = %a.display(), sha256 = %da, "source digest");
    Ok(da == db)
}
