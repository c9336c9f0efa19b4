//! File-system seam for the finalization phase.
//!
//! Every mutation the finalizer performs goes through [`Filesystem`], so
//! locked files and full disks can be simulated without touching real
//! permissions.
//!
//! Nothing is ever written straight onto a destination: bytes land in a
//! staging file next to it and are renamed over it only once complete, so a
//! failed copy leaves whatever was there before untouched.

use std::ffi::OsString;
use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::Path;
use tempfile::TempPath;
use tracing::{debug, warn};

#[cfg(unix)]
pub(crate) const CROSS_DEVICE_CODE: i32 = 18; // EXDEV

#[cfg(windows)]
pub(crate) const CROSS_DEVICE_CODE: i32 = 17; // ERROR_NOT_SAME_DEVICE

#[cfg(not(any(unix, windows)))]
pub(crate) const CROSS_DEVICE_CODE: i32 = -1;

pub trait Filesystem: Send + Sync + Debug {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    /// Copy `from` to a staging file beside `to`, then rename it over `to`.
    fn copy_into_place(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let staging = staging_file(to)?;
        let written = self.copy(from, &staging)?;
        self.rename(&staging, to)?;
        // renamed away; dropping would only fail to delete it
        let _ = staging.keep();
        Ok(written)
    }

    /// Rename, falling back to a staged copy across file systems.
    ///
    /// After the fallback `from` is removed on a best-effort basis.
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        match self.rename(from, to) {
            Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_CODE) => {
                debug!(from = %from.display(), to = %to.display(), "Cross-device move, copying instead");
                self.copy_into_place(from, to)?;
                if let Err(e) = self.remove_file(from) {
                    warn!(path = %from.display(), error = %e, "Cannot remove source after copy");
                }
                Ok(())
            }
            other => other,
        }
    }
}

/// Empty `.<name>.XXXXXX.tmp` in the destination's folder, deleted on drop.
fn staging_file(to: &Path) -> io::Result<TempPath> {
    let name = to.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("destination has no file name: {}", to.display()),
        )
    })?;
    let dir = match to.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut prefix = OsString::from(".");
    prefix.push(name);
    prefix.push(".");
    tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map(|file| file.into_temp_path())
}

/// `std::fs` implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl Filesystem for LocalFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{names_in, CrossDeviceFs};
    use tempfile::TempDir;

    #[test]
    fn test_local_move_file() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a.pdf");
        let to = dir.path().join("b.pdf");
        std::fs::write(&from, b"data").unwrap();

        LocalFs.move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"data");
    }

    #[cfg(any(unix, windows))]
    #[test]
    fn test_cross_device_falls_back_to_copy() {
        let scratch = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let from = scratch.path().join("a.pdf");
        let to = docs.path().join("b.pdf");
        std::fs::write(&from, b"data").unwrap();
        std::fs::write(&to, b"old").unwrap();

        CrossDeviceFs::default().move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"data");
        assert_eq!(names_in(docs.path()), vec!["b.pdf"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_full_disk_during_cross_device_move_keeps_destination() {
        let scratch = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let from = scratch.path().join("new.pdf");
        let to = docs.path().join("a.pdf");
        std::fs::write(&from, vec![b'N'; 800]).unwrap();
        std::fs::write(&to, vec![b'O'; 1000]).unwrap();

        let fs = CrossDeviceFs { disk_full: true };
        let err = fs.move_file(&from, &to).unwrap_err();

        assert_eq!(err.raw_os_error(), Some(libc::ENOSPC));
        assert_eq!(std::fs::read(&to).unwrap(), vec![b'O'; 1000]);
        assert!(from.exists());
        assert_eq!(names_in(docs.path()), vec!["a.pdf"]);
    }

    #[test]
    fn test_copy_into_place_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a.pdf");
        let to = dir.path().join("a_out.pdf");
        std::fs::write(&from, b"fresh").unwrap();
        std::fs::write(&to, b"stale content").unwrap();

        assert_eq!(LocalFs.copy_into_place(&from, &to).unwrap(), 5);
        assert_eq!(std::fs::read(&to).unwrap(), b"fresh");
        assert_eq!(names_in(dir.path()), vec!["a.pdf", "a_out.pdf"]);
    }

    #[test]
    fn test_move_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let err = LocalFs
            .move_file(&dir.path().join("nope"), &dir.path().join("b.pdf"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
