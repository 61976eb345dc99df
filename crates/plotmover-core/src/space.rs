//! Live free-space queries for destination volumes.
//!
//! Capacity is never cached: the scanner asks the probe at selection time,
//! inside the registry's critical section.

use std::io;
use std::path::Path;

/// Reports bytes available to an unprivileged writer at `path`.
pub trait FreeSpace: Send + Sync {
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// Probe backed by `statvfs(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatvfsProbe;

#[cfg(unix)]
impl FreeSpace for StatvfsProbe {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let r = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if r != 0 {
            return Err(io::Error::last_os_error());
        }
        // f_bavail excludes blocks reserved for root.
        Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
    }
}

#[cfg(not(unix))]
impl FreeSpace for StatvfsProbe {
    fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "free-space query is only implemented on unix",
        ))
    }
}
