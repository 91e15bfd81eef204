//! File-based locking to prevent concurrent execution.
//!
//! Two bouncers patching the same address group would undo each other's
//! work, so `run` and `sync` hold an exclusive flock for their lifetime.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// A guard that holds an exclusive lock on the lock file.
/// The lock is automatically released when the guard is dropped.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
}

impl LockGuard {
    /// Attempt to acquire an exclusive lock on `path`.
    /// Returns an error if another instance is already running.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }

        // create+read+write without truncate avoids a race between create and lock
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .context("Failed to set lock file permissions")?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another edgeos-bouncer instance is already running.\n\
                 If you believe this is an error, remove the lock file: {}",
                path.display()
            )
        })?;

        Ok(Self { _file: file })
    }
}
