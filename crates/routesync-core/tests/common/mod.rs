//! Test doubles and common utilities for contract tests
//!
//! Every double counts its calls so tests can assert which side effects a run
//! had (or did not have).

#![allow(dead_code)]

use routesync_core::config::{EngineConfig, ProxyConfig};
use routesync_core::error::{Error, Result};
use routesync_core::model::{DomainEntry, SourceRecord, SyncOutcome, SyncStatus};
use routesync_core::traits::{
    ContainerRuntime, ContainerSpec, DomainFetcher, RoutingStore, ServiceReloader,
    SourceDirectory, StatusRecorder,
};
use routesync_core::{EngineEvent, FileRunLock, ProxyReconciler, SyncEngine};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const TEMPLATE: &str = "upstream pbx {\n##SERVERLIST##}\n";

/// A status row as the destination stores it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub flag: i32,
    pub error: String,
}

/// In-memory destination: directory, routing tables and status rows
#[derive(Default)]
pub struct MemoryDestination {
    sources: Mutex<Vec<SourceRecord>>,
    domains: Mutex<Vec<DomainEntry>>,
    statuses: Mutex<HashMap<i64, StatusRow>>,
    fail_directory: AtomicBool,
    fail_reset: AtomicBool,
    fail_status: AtomicBool,
    stall_directory: AtomicBool,
    list_calls: AtomicUsize,
    reset_calls: AtomicUsize,
    write_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl MemoryDestination {
    pub fn new(sources: Vec<SourceRecord>) -> Self {
        Self {
            sources: Mutex::new(sources),
            ..Self::default()
        }
    }

    /// Pre-populate the routing table (state left by an earlier run)
    pub fn seed_domains(&self, entries: &[(&str, &str)]) {
        let mut domains = self.domains.lock().unwrap();
        for (name, owner) in entries {
            domains.push(DomainEntry::new(*name, *owner));
        }
    }

    /// Pre-populate a status row
    pub fn seed_status(&self, source_id: i64, row: StatusRow) {
        self.statuses.lock().unwrap().insert(source_id, row);
    }

    pub fn set_sources(&self, sources: Vec<SourceRecord>) {
        *self.sources.lock().unwrap() = sources;
    }

    pub fn fail_directory(&self) {
        self.fail_directory.store(true, Ordering::SeqCst);
    }

    pub fn fail_reset(&self) {
        self.fail_reset.store(true, Ordering::SeqCst);
    }

    pub fn fail_status(&self) {
        self.fail_status.store(true, Ordering::SeqCst);
    }

    /// Make discovery hang for a minute
    pub fn stall_directory(&self) {
        self.stall_directory.store(true, Ordering::SeqCst);
    }

    pub fn domains(&self) -> Vec<DomainEntry> {
        self.domains.lock().unwrap().clone()
    }

    pub fn domain_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.domains().into_iter().map(|d| d.name).collect();
        names.sort();
        names
    }

    pub fn status(&self, source_id: i64) -> Option<StatusRow> {
        self.statuses.lock().unwrap().get(&source_id).cloned()
    }

    pub fn status_count(&self) -> usize {
        self.statuses.lock().unwrap().len()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SourceDirectory for MemoryDestination {
    async fn list_sources(&self) -> Result<Vec<SourceRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.stall_directory.load(Ordering::SeqCst) {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        }
        if self.fail_directory.load(Ordering::SeqCst) {
            return Err(Error::database("Can't connect to MySQL server"));
        }
        Ok(self.sources.lock().unwrap().clone())
    }
}

#[async_trait::async_trait]
impl RoutingStore for MemoryDestination {
    async fn reset_routing_tables(&self) -> Result<()> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reset.load(Ordering::SeqCst) {
            return Err(Error::database("Table 'domain' is locked"));
        }
        self.domains.lock().unwrap().clear();
        Ok(())
    }

    async fn write_domains(&self, source: &SourceRecord, domains: &[String]) -> Result<usize> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let mut table = self.domains.lock().unwrap();
        for name in domains {
            // duplicate keys are ignored, the first owner stays
            if !table.iter().any(|d| &d.name == name) {
                table.push(DomainEntry::new(name.as_str(), source.address.as_str()));
            }
        }
        Ok(domains.len())
    }
}

#[async_trait::async_trait]
impl StatusRecorder for MemoryDestination {
    async fn record_status(&self, outcome: &SyncOutcome) -> Result<()> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(Error::database("Lock wait timeout exceeded"));
        }
        self.statuses.lock().unwrap().insert(
            outcome.source_id,
            StatusRow {
                flag: outcome.status.as_flag(),
                error: outcome.error_text().to_string(),
            },
        );
        Ok(())
    }
}

/// Fetcher answering per source address; unknown addresses are unreachable
#[derive(Default)]
pub struct ScriptedFetcher {
    domains: HashMap<String, Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: &str, domains: &[&str]) -> Self {
        self.domains.insert(
            address.to_string(),
            domains.iter().map(|d| d.to_string()).collect(),
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DomainFetcher for ScriptedFetcher {
    async fn enabled_domains(&self, source: &SourceRecord) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.domains.get(&source.address).cloned().ok_or_else(|| {
            Error::database(format!(
                "connection to {}:5432 refused",
                source.db_host
            ))
        })
    }

    fn fetcher_name(&self) -> &'static str {
        "scripted"
    }
}

/// Reloader that counts invocations
#[derive(Default)]
pub struct CountingReloader {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl CountingReloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let reloader = Self::default();
        reloader.fail.store(true, Ordering::SeqCst);
        reloader
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ServiceReloader for CountingReloader {
    async fn reload(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::reload("error: 500 - command not found"));
        }
        Ok(())
    }
}

/// Container runtime simulating a single proxy container
///
/// Clones share state, so a test keeps one handle while the reconciler owns another.
#[derive(Clone, Default)]
pub struct MockRuntime {
    running: Arc<AtomicBool>,
    calls: Arc<Mutex<Vec<String>>>,
    last_spec: Arc<Mutex<Option<ContainerSpec>>>,
}

impl MockRuntime {
    pub fn new(running: bool) -> Self {
        let runtime = Self::default();
        runtime.running.store(running, Ordering::SeqCst);
        runtime
    }

    pub fn is_up(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mutating calls, in order (inspection is not recorded)
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_spec(&self) -> Option<ContainerSpec> {
        self.last_spec.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for MockRuntime {
    async fn is_running(&self, _name: &str) -> Result<bool> {
        Ok(self.running.load(Ordering::SeqCst))
    }

    async fn stop_and_remove(&self, name: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("stop {}", name));
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self, spec: &ContainerSpec) -> Result<()> {
        self.calls.lock().unwrap().push(format!("start {}", spec.name));
        *self.last_spec.lock().unwrap() = Some(spec.clone());
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn exec(&self, name: &str, command: &[String]) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("exec {} {}", name, command.join(" ")));
        Ok(())
    }
}

/// Source record whose database host equals its address
pub fn source(id: i64, address: &str) -> SourceRecord {
    SourceRecord::new(id, address, address, "fusionpbx", "secret")
}

/// Proxy settings rooted in `dir`, with the template already written
pub fn proxy_config(dir: &Path) -> ProxyConfig {
    std::fs::write(dir.join("proxy.tpl"), TEMPLATE).unwrap();
    ProxyConfig {
        template_path: dir.join("proxy.tpl"),
        config_path: dir.join("proxy.conf"),
        html_dir: dir.join("html"),
        ..ProxyConfig::default()
    }
}

/// Everything a contract test needs to drive and observe one engine
pub struct Harness {
    pub destination: Arc<MemoryDestination>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub reloader: Arc<CountingReloader>,
    pub runtime: MockRuntime,
    pub lock: Arc<FileRunLock>,
    pub proxy: ProxyConfig,
}

impl Harness {
    /// Harness with a fresh lock and proxy files under `dir`
    pub fn new(
        dir: &Path,
        destination: MemoryDestination,
        fetcher: ScriptedFetcher,
        runtime: MockRuntime,
    ) -> Self {
        Self {
            destination: Arc::new(destination),
            fetcher: Arc::new(fetcher),
            reloader: Arc::new(CountingReloader::new()),
            runtime,
            lock: Arc::new(FileRunLock::new(dir.join(".sync-lock"))),
            proxy: proxy_config(dir),
        }
    }

    pub fn with_reloader(mut self, reloader: CountingReloader) -> Self {
        self.reloader = Arc::new(reloader);
        self
    }

    /// Build an engine wired to this harness
    pub fn engine(&self) -> (SyncEngine, mpsc::Receiver<EngineEvent>) {
        SyncEngine::builder()
            .lock(self.lock.clone())
            .destination(self.destination.clone())
            .fetcher(self.fetcher.clone())
            .reloader(self.reloader.clone())
            .proxy(ProxyReconciler::new(
                self.proxy.clone(),
                Box::new(self.runtime.clone()),
            ))
            .build(&EngineConfig::default())
            .expect("engine construction succeeds")
    }

    /// Rendered proxy configuration, if any was written
    pub fn rendered_config(&self) -> Option<String> {
        std::fs::read_to_string(&self.proxy.config_path).ok()
    }
}

/// Drain all events currently buffered in the channel
pub fn drain(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn success_row() -> StatusRow {
    StatusRow {
        flag: SyncStatus::Success.as_flag(),
        error: String::new(),
    }
}
