//! Data model shared by the engine and its backends

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An enabled upstream system, as read from the destination's directory
///
/// Immutable for the duration of one run.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Source identifier (key of the status row)
    pub id: i64,
    /// Network address that serves this source's domains
    pub address: String,
    /// Host of the source's own database
    pub db_host: String,
    /// Database user
    pub db_username: String,
    /// Database password
    /// ⚠️ NEVER log this value
    pub db_password: String,
}

impl SourceRecord {
    /// Create a new source record
    pub fn new(
        id: i64,
        address: impl Into<String>,
        db_host: impl Into<String>,
        db_username: impl Into<String>,
        db_password: impl Into<String>,
    ) -> Self {
        Self {
            id,
            address: address.into(),
            db_host: db_host.into(),
            db_username: db_username.into(),
            db_password: db_password.into(),
        }
    }
}

// Custom Debug implementation that hides the database password
impl std::fmt::Debug for SourceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRecord")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("db_host", &self.db_host)
            .field("db_username", &self.db_username)
            .field("db_password", &"<REDACTED>")
            .finish()
    }
}

/// A routable domain tagged with the address of the source that reported it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainEntry {
    /// Domain name (unique key in the routing table)
    pub name: String,
    /// Address of the owning source
    pub owner_address: String,
}

impl DomainEntry {
    /// Create a new domain entry
    pub fn new(name: impl Into<String>, owner_address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner_address: owner_address.into(),
        }
    }
}

/// Outcome of replicating one source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// All of the source's domains were written
    Success,
    /// Nothing from the source was written
    Failure,
}

impl SyncStatus {
    /// Numeric flag stored in the destination's status column
    pub fn as_flag(self) -> i32 {
        match self {
            SyncStatus::Success => 1,
            SyncStatus::Failure => 0,
        }
    }
}

/// Result of replicating one source during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Source identifier
    pub source_id: i64,
    /// Source address
    pub address: String,
    /// Success or failure
    pub status: SyncStatus,
    /// Number of domains written for this source
    pub domains_written: usize,
    /// When replication finished
    pub finished_at: DateTime<Utc>,
    /// Error detail (present only on failure)
    pub error: Option<String>,
}

impl SyncOutcome {
    /// Successful replication of `domains_written` domains
    pub fn success(source: &SourceRecord, domains_written: usize) -> Self {
        Self {
            source_id: source.id,
            address: source.address.clone(),
            status: SyncStatus::Success,
            domains_written,
            finished_at: Utc::now(),
            error: None,
        }
    }

    /// Failed replication
    pub fn failure(source: &SourceRecord, error: impl Into<String>) -> Self {
        Self {
            source_id: source.id,
            address: source.address.clone(),
            status: SyncStatus::Failure,
            domains_written: 0,
            finished_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    /// Whether the source succeeded
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }

    /// Error text for the status row, empty on success
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }
}

/// What the proxy reconciler did during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProxyOutcome {
    /// A new proxy process was started with this many upstream servers
    Started { servers: usize },
    /// The running proxy was told to reload with this many upstream servers
    Reloaded { servers: usize },
    /// No sources: the running proxy was stopped and removed
    Stopped,
    /// No sources and no proxy was running
    AlreadyStopped,
    /// Proxy reconciliation is disabled
    Skipped,
    /// Reconciliation failed (logged, non-fatal)
    Failed { error: String },
}

/// Summary of one completed reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Number of sources returned by discovery
    pub sources_discovered: usize,
    /// Per-source outcomes, in processing order
    pub outcomes: Vec<SyncOutcome>,
    /// Whether the consuming service accepted the reload
    pub reloaded: bool,
    /// What happened to the proxy
    pub proxy: ProxyOutcome,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Number of sources that synced successfully
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of sources that failed
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Trim domain names, skip empty ones and collapse duplicates (first wins)
pub fn normalize_domains<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for name in names {
        let name = name.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        if seen.insert(name.to_string()) {
            result.push(name.to_string());
        }
    }

    result
}

/// Source addresses in discovery order, each address once
pub fn distinct_addresses(sources: &[SourceRecord]) -> Vec<String> {
    normalize_domains(sources.iter().map(|s| s.address.as_str()))
}

/// Addresses reported by more than one source, in discovery order
pub fn duplicate_addresses(sources: &[SourceRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();

    for source in sources {
        if !seen.insert(source.address.as_str()) && !duplicates.contains(&source.address) {
            duplicates.push(source.address.clone());
        }
    }

    duplicates
}
