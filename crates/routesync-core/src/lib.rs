// # routesync-core
//
// Core library for reconciling a call-routing directory with a dynamic set of
// upstream tenant systems.
//
// ## Architecture Overview
//
// - **SourceDirectory / RoutingStore / StatusRecorder**: the destination store
// - **DomainFetcher**: reads enabled domains from one upstream source
// - **ServiceReloader**: tells the consuming routing service to reload
// - **ContainerRuntime**: controls the reverse-proxy process
// - **RunLock**: at most one reconciliation run at a time
// - **SyncEngine**: orchestrates one full rebuild per run
//
// ## Design Principles
//
// 1. **Full Rebuild**: every run truncates and repopulates the routing tables
// 2. **Failure Isolation**: one unreachable source never blocks the others
// 3. **Library-First**: backends are plugged in through traits

pub mod config;
pub mod engine;
pub mod error;
pub mod lock;
pub mod model;
pub mod proxy;
pub mod traits;

// Re-export core types for convenience
pub use config::{
    DestinationConfig, EngineConfig, LockConfig, ProxyConfig, ReloadConfig, SourceDbConfig,
    SyncConfig,
};
pub use engine::{EngineEvent, Replicator, SyncEngine, SyncEngineBuilder};
pub use error::{Error, Result};
pub use lock::{FileRunLock, LockHolder};
pub use model::{DomainEntry, ProxyOutcome, RunReport, SourceRecord, SyncOutcome, SyncStatus};
pub use proxy::ProxyReconciler;
pub use traits::{
    ContainerRuntime, ContainerSpec, DomainFetcher, RoutingStore, RunGuard, RunLock,
    ServiceReloader, SourceDirectory, StatusRecorder,
};
