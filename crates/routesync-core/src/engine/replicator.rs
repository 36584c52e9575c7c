//! Per-source domain replication
//!
//! [`Replicator::replicate`] never returns an error. Every failure of one
//! source (connection refused, authentication, query error, timeout, write
//! failure) becomes a [`SyncOutcome`] with status `Failure`, so one source can
//! never abort the processing of the others.

use std::time::Duration;

use crate::engine::bounded;
use crate::model::{SourceRecord, SyncOutcome, normalize_domains};
use crate::traits::{DomainFetcher, RoutingStore};
use tracing::debug;

/// Copies one source's enabled domains into the routing store
pub struct Replicator<'a> {
    fetcher: &'a dyn DomainFetcher,
    store: &'a dyn RoutingStore,
    timeout: Duration,
}

impl<'a> Replicator<'a> {
    /// Create a replicator
    ///
    /// `timeout` bounds the fetch only. The write runs to completion so a
    /// committed transaction is never reported as a failure; the store's own
    /// connection acquire timeout bounds how long it can wait for the database.
    pub fn new(fetcher: &'a dyn DomainFetcher, store: &'a dyn RoutingStore, timeout: Duration) -> Self {
        Self {
            fetcher,
            store,
            timeout,
        }
    }

    /// Replicate `source`
    ///
    /// All domains are fetched before anything is written, and the write is a
    /// single atomic store call, so the source contributes all of its rows or
    /// none of them.
    pub async fn replicate(&self, source: &SourceRecord) -> SyncOutcome {
        let fetched = bounded(
            &format!("fetching domains from {}", source.address),
            self.timeout,
            self.fetcher.enabled_domains(source),
        )
        .await;

        let domains = match fetched {
            Ok(names) => normalize_domains(names),
            Err(e) => {
                return SyncOutcome::failure(source, format!("{} fetch failed: {}", self.fetcher.fetcher_name(), e));
            }
        };

        debug!(
            "Source {} ({}) reported {} enabled domain(s)",
            source.id,
            source.address,
            domains.len()
        );

        match self.store.write_domains(source, &domains).await {
            Ok(count) => SyncOutcome::success(source, count),
            Err(e) => SyncOutcome::failure(source, format!("write failed: {}", e)),
        }
    }
}
