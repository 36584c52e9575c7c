//! Core traits for routesync
//!
//! This module defines the abstract interfaces the engine is built on.
//!
//! - [`SourceDirectory`], [`RoutingStore`], [`StatusRecorder`]: the destination store
//! - [`DomainFetcher`]: reads enabled domains from one upstream source
//! - [`ServiceReloader`]: tells the consuming service to reload
//! - [`ContainerRuntime`]: controls the reverse-proxy process
//! - [`RunLock`]: cross-run mutual exclusion

pub mod container;
pub mod destination;
pub mod lock;
pub mod reloader;
pub mod source;

pub use container::{ContainerRuntime, ContainerSpec, PortMapping, VolumeMount};
pub use destination::{RoutingStore, SourceDirectory, StatusRecorder};
pub use lock::{RunGuard, RunLock};
pub use reloader::ServiceReloader;
pub use source::DomainFetcher;
