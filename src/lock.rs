//! File-based locking so two runs never apply the same set concurrently.
//!
//! Uses flock-style advisory locking, one lock file per set name, so runs
//! for different sets do not block each other.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const LOCK_DIR: &str = "/run/lock";

/// A guard that holds an exclusive lock for one set name.
/// The lock is released when the guard is dropped.
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Acquire the lock for `set_name` in the system lock directory.
    pub fn acquire(set_name: &str) -> Result<Self> {
        Self::acquire_in(Path::new(LOCK_DIR), set_name)
    }

    /// Acquire the lock for `set_name` in `dir`.
    /// Returns an error if another run holds it.
    ///
    /// Opens with create+read+write (no truncate) to avoid a race between
    /// creating the file and locking it.
    pub fn acquire_in(dir: &Path, set_name: &str) -> Result<Self> {
        fs::create_dir_all(dir).ok();
        let path = dir.join(format!("geonft-{}.lock", set_name));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .context("Failed to set lock file permissions")?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another geonft run is already applying set '{}'.\n\
                 If you believe this is an error, remove the lock file: {}\n\
                 Or wait for the other run to complete.",
                set_name,
                path.display()
            )
        })?;

        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
