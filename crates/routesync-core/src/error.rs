//! Error types for routesync
//!
//! This module defines all error types used throughout the workspace.
//! Only [`Error::AlreadyRunning`], [`Error::DirectoryUnavailable`] and
//! [`Error::ResetFailed`] end a reconciliation run; every other variant is
//! captured by the engine and turned into a status row or a log line.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for routesync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for routesync
#[derive(Error, Debug)]
pub enum Error {
    /// Another reconciliation run holds the lock
    #[error("Reconciliation already running (lock marker {})", marker.display())]
    AlreadyRunning {
        /// Path of the marker that is held
        marker: PathBuf,
    },

    /// The list of enabled sources could not be read
    #[error("Source directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// The routing tables could not be truncated
    #[error("Routing table reset failed: {0}")]
    ResetFailed(String),

    /// Replicating one source failed
    #[error("Sync failed for source {source_id} ({address}): {message}")]
    SourceSyncFailed {
        /// Source identifier
        source_id: i64,
        /// Source address
        address: String,
        /// What went wrong
        message: String,
    },

    /// Writing a per-source status row failed
    #[error("Status recording failed: {0}")]
    StatusFailed(String),

    /// The consuming service could not be told to reload
    #[error("Reload failed: {0}")]
    ReloadFailed(String),

    /// Rendering, starting, reloading or stopping the proxy failed
    #[error("Proxy reconciliation failed: {0}")]
    ProxyReconcileFailed(String),

    /// A bounded operation did not finish in time
    #[error("{operation} timed out after {secs}s")]
    Timeout {
        /// Operation name
        operation: String,
        /// Timeout that elapsed
        secs: u64,
    },

    /// Database errors (connection, query, transaction)
    #[error("Database error: {0}")]
    Database(String),

    /// Container runtime errors
    #[error("Container runtime error: {0}")]
    Container(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem and process I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an "already running" error for a marker path
    pub fn already_running(marker: impl Into<PathBuf>) -> Self {
        Self::AlreadyRunning {
            marker: marker.into(),
        }
    }

    /// Create a directory-unavailable error
    pub fn directory(msg: impl Into<String>) -> Self {
        Self::DirectoryUnavailable(msg.into())
    }

    /// Create a reset-failed error
    pub fn reset(msg: impl Into<String>) -> Self {
        Self::ResetFailed(msg.into())
    }

    /// Create a per-source sync error
    pub fn source_sync(source_id: i64, address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceSyncFailed {
            source_id,
            address: address.into(),
            message: message.into(),
        }
    }

    /// Create a status-recording error
    pub fn status(msg: impl Into<String>) -> Self {
        Self::StatusFailed(msg.into())
    }

    /// Create a reload error
    pub fn reload(msg: impl Into<String>) -> Self {
        Self::ReloadFailed(msg.into())
    }

    /// Create a proxy reconciliation error
    pub fn proxy(msg: impl Into<String>) -> Self {
        Self::ProxyReconcileFailed(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a container runtime error
    pub fn container(msg: impl Into<String>) -> Self {
        Self::Container(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error aborts a reconciliation run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning { .. } | Self::DirectoryUnavailable(_) | Self::ResetFailed(_)
        )
    }
}
