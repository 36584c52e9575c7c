// # Destination Store Traits
//
// The destination is the central store consumed by the routing service.
// It plays three roles during a run, each with its own trait so that
// embedders and tests can swap them independently:
//
// - `SourceDirectory`: which upstream sources are enabled
// - `RoutingStore`: the routing table and its attribute table
// - `StatusRecorder`: per-source sync bookkeeping
//
// A single backend usually implements all three (see `routesync-kamailio`).

use async_trait::async_trait;

use crate::model::{SourceRecord, SyncOutcome};

/// Reads the set of enabled upstream sources
///
/// # Contract
///
/// - Returns only sources that are currently enabled
/// - `Ok(vec![])` means "no enabled sources" and is a legitimate result
/// - Any connection or query problem must be an `Err`, never an empty list
#[async_trait]
pub trait SourceDirectory: Send + Sync {
    /// List enabled sources with their connection parameters
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<SourceRecord>)`: Enabled sources, in a stable order
    /// - `Err(Error)`: The directory could not be read
    async fn list_sources(&self) -> Result<Vec<SourceRecord>, crate::Error>;
}

/// Owns the routing table and its attribute table
///
/// # Ownership of deletes
///
/// [`RoutingStore::reset_routing_tables`] is the only operation in the whole
/// system that removes domain rows. [`RoutingStore::write_domains`] is
/// append-only.
#[async_trait]
pub trait RoutingStore: Send + Sync {
    /// Truncate the routing table and the attribute table
    async fn reset_routing_tables(&self) -> Result<(), crate::Error>;

    /// Write one source's domains, tagged with the source address
    ///
    /// A domain that already exists (reported by an earlier source) is kept
    /// as is; the attribute row for this source is still added. All rows for
    /// the call are written atomically: either every row is committed or none.
    ///
    /// # Parameters
    ///
    /// - `source`: The source the domains belong to
    /// - `domains`: Normalized domain names
    ///
    /// # Returns
    ///
    /// - `Ok(usize)`: Number of domains processed
    /// - `Err(Error)`: Nothing was committed
    async fn write_domains(
        &self,
        source: &SourceRecord,
        domains: &[String],
    ) -> Result<usize, crate::Error>;
}

/// Persists the per-source outcome of a run
#[async_trait]
pub trait StatusRecorder: Send + Sync {
    /// Overwrite the status row of `outcome.source_id`
    ///
    /// Must be idempotent: recording the same outcome twice leaves the same row.
    async fn record_status(&self, outcome: &SyncOutcome) -> Result<(), crate::Error>;
}
