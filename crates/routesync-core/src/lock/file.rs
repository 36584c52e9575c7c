// # File Run Lock
//
// File-marker implementation of RunLock.
//
// ## Protocol
//
// The existence of the marker file means "a run is in progress". Nothing
// else is part of the protocol: any process that sees the marker backs off.
//
// - Acquire: create the marker with create-new semantics (fails if it exists)
// - Release: remove the marker (guard drop or explicit release)
// - Stale marker after a crash: cleared manually (`FileRunLock::clear`)
//
// ## File Format
//
// The marker body is informational only:
//
// ```json
// { "pid": 4242, "acquired_at": "2025-01-09T12:00:00Z" }
// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::Error;
use crate::traits::lock::{RunGuard, RunLock};

/// Who holds a file lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    /// Process id of the holder
    pub pid: u32,
    /// When the lock was taken
    pub acquired_at: DateTime<Utc>,
}

/// File-marker run lock
///
/// # Example
///
/// ```rust,no_run
/// use routesync_core::lock::FileRunLock;
/// use routesync_core::traits::RunLock;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let lock = FileRunLock::new("/var/run/routesync/.sync-lock");
///
///     let guard = lock.try_acquire()?;
///     // ... reconcile ...
///     guard.release()?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileRunLock {
    path: PathBuf,
}

impl FileRunLock {
    /// Create a lock backed by the marker at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the marker file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the marker currently exists
    pub fn is_held(&self) -> bool {
        self.path.exists()
    }

    /// Read the marker body
    ///
    /// # Returns
    ///
    /// - `Ok(None)`: No marker
    /// - `Ok(Some(LockHolder))`: The marker and who wrote it
    /// - `Err(Error)`: The marker exists but cannot be read or parsed
    pub fn holder(&self) -> Result<Option<LockHolder>, Error> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a stale marker left behind by a crashed run
    ///
    /// Returns whether a marker was removed.
    pub fn clear(&self) -> Result<bool, Error> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::warn!("Removed lock marker {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn create_marker(&self) -> Result<(), Error> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::config(format!(
                    "Failed to create lock directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::already_running(&self.path));
            }
            Err(e) => return Err(e.into()),
        };

        let holder = LockHolder {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };

        let written = serde_json::to_vec(&holder)
            .map_err(Error::from)
            .and_then(|body| file.write_all(&body).map_err(Error::from));

        if let Err(e) = written {
            // The marker exists but is unusable; do not leave it behind
            drop(file);
            let _ = fs::remove_file(&self.path);
            return Err(e);
        }

        Ok(())
    }
}

impl RunLock for FileRunLock {
    fn try_acquire(&self) -> Result<RunGuard, Error> {
        self.create_marker()?;
        tracing::debug!("Acquired lock marker {}", self.path.display());

        let path = self.path.clone();
        Ok(RunGuard::new(
            format!("lock marker {}", self.path.display()),
            move || match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!("Released lock marker {}", path.display());
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            },
        ))
    }
}
