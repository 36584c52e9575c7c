// # Run Lock Trait
//
// Cross-run mutual exclusion: at most one reconciliation run at a time.
//
// ## Implementations
//
// - File marker: `crate::lock::FileRunLock`
//
// ## Release Semantics
//
// Acquiring returns a `RunGuard`. The guard releases the lock when dropped,
// so every exit path of a run (early return, `?`, panic unwinding) releases
// it. `RunGuard::release()` releases explicitly and reports failures.

use std::fmt;

type ReleaseFn = Box<dyn FnOnce() -> std::io::Result<()> + Send>;

/// Trait for run lock implementations
pub trait RunLock: Send + Sync {
    /// Try to take the lock without waiting
    ///
    /// # Returns
    ///
    /// - `Ok(RunGuard)`: The lock is held until the guard is released or dropped
    /// - `Err(Error::AlreadyRunning)`: Another run holds the lock
    /// - `Err(Error)`: The lock could not be inspected or created
    fn try_acquire(&self) -> Result<RunGuard, crate::Error>;
}

/// Scoped ownership of a [`RunLock`]
pub struct RunGuard {
    description: String,
    release: Option<ReleaseFn>,
}

impl RunGuard {
    /// Create a guard that runs `release` exactly once
    pub fn new<F>(description: impl Into<String>, release: F) -> Self
    where
        F: FnOnce() -> std::io::Result<()> + Send + 'static,
    {
        Self {
            description: description.into(),
            release: Some(Box::new(release)),
        }
    }

    /// What this guard holds (for logging)
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Release the lock now, reporting any failure
    pub fn release(mut self) -> Result<(), crate::Error> {
        match self.release.take() {
            Some(release) => release().map_err(crate::Error::from),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for RunGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunGuard")
            .field("description", &self.description)
            .field("held", &self.release.is_some())
            .finish()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            if let Err(e) = release() {
                tracing::error!(
                    "Failed to release {}: {}. Remove it manually before the next run.",
                    self.description,
                    e
                );
            }
        }
    }
}
