//! Core reconciliation engine
//!
//! The SyncEngine is responsible for:
//! - Holding the run lock for the whole run
//! - Discovering enabled sources
//! - Rebuilding the routing tables from scratch
//! - Replicating every source in isolation and recording its status
//! - Reloading the consuming service
//! - Reconciling the reverse proxy with the discovered addresses
//!
//! ## Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │  SyncEngine  │
//!                      └──────────────┘
//!                             │
//!   ┌──────────┬──────────────┼──────────────┬─────────────┬─────────────┐
//!   ▼          ▼              ▼              ▼             ▼             ▼
//! ┌───────┐ ┌──────────┐ ┌──────────┐ ┌────────────┐ ┌──────────┐ ┌────────────┐
//! │RunLock│ │ Source   │ │ Routing  │ │ Replicator │ │ Service  │ │   Proxy    │
//! │       │ │Directory │ │ Store    │ │ + Status   │ │ Reloader │ │ Reconciler │
//! └───────┘ └──────────┘ └──────────┘ └────────────┘ └──────────┘ └────────────┘
//! ```
//!
//! ## Run Flow
//!
//! 1. Acquire the lock (`AlreadyRunning` → return, nothing touched)
//! 2. List sources (`DirectoryUnavailable` → return before any delete)
//! 3. Truncate routing tables (`ResetFailed` → return before any source)
//! 4. For each source: replicate, then record its status immediately
//! 5. Reload the consuming service once (failure logged)
//! 6. Reconcile the proxy with the addresses from step 2 (failure logged)
//! 7. Release the lock (also on every early return, via the guard)

mod replicator;

pub use replicator::Replicator;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::{
    ProxyOutcome, RunReport, SourceRecord, SyncOutcome, distinct_addresses, duplicate_addresses,
};
use crate::proxy::ProxyReconciler;
use crate::traits::{
    DomainFetcher, RoutingStore, RunLock, ServiceReloader, SourceDirectory, StatusRecorder,
};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Lock acquired, run started
    RunStarted,

    /// Discovery finished
    SourcesDiscovered { count: usize },

    /// More than one source reported this address
    DuplicateAddress { address: String },

    /// Routing tables truncated
    TablesReset,

    /// A source was replicated
    SourceSynced {
        source_id: i64,
        address: String,
        domains: usize,
    },

    /// A source failed (isolated, run continues)
    SourceFailed {
        source_id: i64,
        address: String,
        error: String,
    },

    /// A status row could not be written
    StatusRecordFailed { source_id: i64, error: String },

    /// Reload attempted
    ReloadFinished { success: bool },

    /// Proxy reconciliation attempted
    ProxyReconciled { outcome: ProxyOutcome },

    /// Run completed
    RunFinished { succeeded: usize, failed: usize },

    /// Run ended early with a fatal error
    RunAborted { reason: String },
}

/// Run `fut`, failing with [`Error::Timeout`] after `limit`
pub(crate) async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(operation, limit.as_secs())),
    }
}

/// Core reconciliation engine
///
/// One call to [`SyncEngine::run_once`] is one reconciliation run. Runs are
/// sequential: sources are processed one after another, and concurrent runs
/// (from this or another process) are excluded by the [`RunLock`].
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::builder()`]
/// 2. Call [`SyncEngine::run_once()`] whenever a reconciliation is due
/// 3. Consume [`EngineEvent`]s from the receiver if interested
pub struct SyncEngine {
    /// Cross-run mutual exclusion
    lock: Arc<dyn RunLock>,

    /// Enabled source discovery
    directory: Arc<dyn SourceDirectory>,

    /// Routing and attribute tables
    routing: Arc<dyn RoutingStore>,

    /// Per-source status rows
    status: Arc<dyn StatusRecorder>,

    /// Reads domains from a source
    fetcher: Arc<dyn DomainFetcher>,

    /// Reloads the consuming service
    reloader: Arc<dyn ServiceReloader>,

    /// Reverse-proxy reconciliation (None = disabled)
    proxy: Option<ProxyReconciler>,

    /// Bound for every single external call
    operation_timeout: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Start building an engine
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::default()
    }

    /// Run one reconciliation cycle
    ///
    /// # Returns
    ///
    /// - `Ok(RunReport)`: The run completed (some sources, the reload or the
    ///   proxy may still have failed; see the report)
    /// - `Err(Error::AlreadyRunning)`: Another run holds the lock; nothing was touched
    /// - `Err(Error::DirectoryUnavailable)`: Discovery failed; nothing was touched
    /// - `Err(Error::ResetFailed)`: Truncation failed; no source was processed
    pub async fn run_once(&self) -> Result<RunReport> {
        let guard = match self.lock.try_acquire() {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Skipping run: {}", e);
                self.emit_event(EngineEvent::RunAborted {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };
        debug!("Holding {}", guard.description());
        self.emit_event(EngineEvent::RunStarted);

        let result = self.reconcile().await;

        if let Err(e) = &result {
            error!("Reconciliation aborted: {}", e);
            self.emit_event(EngineEvent::RunAborted {
                reason: e.to_string(),
            });
        }

        if let Err(e) = guard.release() {
            error!("Failed to release run lock: {}", e);
        }

        result
    }

    async fn reconcile(&self) -> Result<RunReport> {
        let started_at = Utc::now();

        let sources = self.discover().await?;

        bounded(
            "resetting routing tables",
            self.operation_timeout,
            self.routing.reset_routing_tables(),
        )
        .await
        .map_err(|e| match e {
            Error::ResetFailed(_) => e,
            other => Error::reset(other.to_string()),
        })?;
        info!("Routing tables reset");
        self.emit_event(EngineEvent::TablesReset);

        let mut outcomes = Vec::with_capacity(sources.len());
        for source in &sources {
            let outcome = self.sync_source(source).await;
            self.record_status(&outcome).await;
            outcomes.push(outcome);
        }

        let reloaded = self.reload().await;
        let proxy = self.reconcile_proxy(&sources).await;

        let report = RunReport {
            sources_discovered: sources.len(),
            outcomes,
            reloaded,
            proxy,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            "Reconciliation finished: {} source(s), {} succeeded, {} failed",
            report.sources_discovered,
            report.succeeded(),
            report.failed()
        );
        self.emit_event(EngineEvent::RunFinished {
            succeeded: report.succeeded(),
            failed: report.failed(),
        });

        Ok(report)
    }

    /// List sources; any failure becomes `DirectoryUnavailable`
    async fn discover(&self) -> Result<Vec<SourceRecord>> {
        let sources = bounded(
            "listing sources",
            self.operation_timeout,
            self.directory.list_sources(),
        )
        .await
        .map_err(|e| match e {
            Error::DirectoryUnavailable(_) => e,
            other => Error::directory(other.to_string()),
        })?;

        info!("Discovered {} enabled source(s)", sources.len());
        self.emit_event(EngineEvent::SourcesDiscovered {
            count: sources.len(),
        });

        for address in duplicate_addresses(&sources) {
            warn!(
                "Address {} is reported by more than one source; each source is synced, the proxy lists it once",
                address
            );
            self.emit_event(EngineEvent::DuplicateAddress { address });
        }

        Ok(sources)
    }

    async fn sync_source(&self, source: &SourceRecord) -> SyncOutcome {
        let outcome = Replicator::new(
            self.fetcher.as_ref(),
            self.routing.as_ref(),
            self.operation_timeout,
        )
        .replicate(source)
        .await;

        match &outcome.error {
            None => {
                info!(
                    "Synced {} domain(s) from source {} ({})",
                    outcome.domains_written, source.id, source.address
                );
                self.emit_event(EngineEvent::SourceSynced {
                    source_id: source.id,
                    address: source.address.clone(),
                    domains: outcome.domains_written,
                });
            }
            Some(error) => {
                let err = Error::source_sync(source.id, source.address.as_str(), error.as_str());
                warn!("{}", err);
                self.emit_event(EngineEvent::SourceFailed {
                    source_id: source.id,
                    address: source.address.clone(),
                    error: error.clone(),
                });
            }
        }

        outcome
    }

    async fn record_status(&self, outcome: &SyncOutcome) {
        let recorded = bounded(
            "recording sync status",
            self.operation_timeout,
            self.status.record_status(outcome),
        )
        .await;

        if let Err(e) = recorded {
            error!(
                "Failed to record status for source {}: {}",
                outcome.source_id, e
            );
            self.emit_event(EngineEvent::StatusRecordFailed {
                source_id: outcome.source_id,
                error: e.to_string(),
            });
        }
    }

    async fn reload(&self) -> bool {
        let result = bounded(
            "reloading routing service",
            self.operation_timeout,
            self.reloader.reload(),
        )
        .await;

        let success = match result {
            Ok(()) => {
                info!("Routing service reloaded");
                true
            }
            Err(e) => {
                let err = match e {
                    Error::ReloadFailed(_) => e,
                    other => Error::reload(other.to_string()),
                };
                error!("{}", err);
                false
            }
        };

        self.emit_event(EngineEvent::ReloadFinished { success });
        success
    }

    async fn reconcile_proxy(&self, sources: &[SourceRecord]) -> ProxyOutcome {
        let Some(proxy) = &self.proxy else {
            debug!("Proxy reconciliation disabled");
            return ProxyOutcome::Skipped;
        };

        let addresses = distinct_addresses(sources);
        let outcome = match proxy.reconcile(&addresses).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{}", e);
                ProxyOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        self.emit_event(EngineEvent::ProxyReconciled {
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        // Never block a run on a slow consumer
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

/// Builder for [`SyncEngine`]
///
/// Every component except the proxy reconciler is required.
#[derive(Default)]
pub struct SyncEngineBuilder {
    lock: Option<Arc<dyn RunLock>>,
    directory: Option<Arc<dyn SourceDirectory>>,
    routing: Option<Arc<dyn RoutingStore>>,
    status: Option<Arc<dyn StatusRecorder>>,
    fetcher: Option<Arc<dyn DomainFetcher>>,
    reloader: Option<Arc<dyn ServiceReloader>>,
    proxy: Option<ProxyReconciler>,
}

impl SyncEngineBuilder {
    /// Run lock
    pub fn lock(mut self, lock: Arc<dyn RunLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Use one backend as directory, routing store and status recorder
    pub fn destination<D>(mut self, destination: Arc<D>) -> Self
    where
        D: SourceDirectory + RoutingStore + StatusRecorder + 'static,
    {
        self.directory = Some(destination.clone());
        self.routing = Some(destination.clone());
        self.status = Some(destination);
        self
    }

    /// Source directory
    pub fn directory(mut self, directory: Arc<dyn SourceDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Routing store
    pub fn routing_store(mut self, routing: Arc<dyn RoutingStore>) -> Self {
        self.routing = Some(routing);
        self
    }

    /// Status recorder
    pub fn status_recorder(mut self, status: Arc<dyn StatusRecorder>) -> Self {
        self.status = Some(status);
        self
    }

    /// Domain fetcher for sources
    pub fn fetcher(mut self, fetcher: Arc<dyn DomainFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Reload trigger
    pub fn reloader(mut self, reloader: Arc<dyn ServiceReloader>) -> Self {
        self.reloader = Some(reloader);
        self
    }

    /// Proxy reconciler (omit to disable proxy reconciliation)
    pub fn proxy(mut self, proxy: ProxyReconciler) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Build the engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn build(self, config: &EngineConfig) -> Result<(SyncEngine, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = SyncEngine {
            lock: self.lock.ok_or_else(|| Error::config("Run lock is required"))?,
            directory: self
                .directory
                .ok_or_else(|| Error::config("Source directory is required"))?,
            routing: self
                .routing
                .ok_or_else(|| Error::config("Routing store is required"))?,
            status: self
                .status
                .ok_or_else(|| Error::config("Status recorder is required"))?,
            fetcher: self
                .fetcher
                .ok_or_else(|| Error::config("Domain fetcher is required"))?,
            reloader: self
                .reloader
                .ok_or_else(|| Error::config("Service reloader is required"))?,
            proxy: self.proxy,
            operation_timeout: config.operation_timeout(),
            event_tx: tx,
        };

        Ok((engine, rx))
    }
}
