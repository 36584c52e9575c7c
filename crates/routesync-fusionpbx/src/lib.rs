// # FusionPBX Domain Fetcher
//
// Reads the enabled domains of one FusionPBX tenant system from its
// PostgreSQL database (`v_domains`).
//
// ## Connection Model
//
// Sources are contacted once per run, so every call opens a single
// connection with the host and credentials of the `SourceRecord`, runs one
// query and closes it. Nothing is cached between runs.
//
// ## Security Requirements
//
// - Source passwords NEVER appear in logs or error messages

use std::time::Duration;

use async_trait::async_trait;
use routesync_core::config::SourceDbConfig;
use routesync_core::model::SourceRecord;
use routesync_core::traits::DomainFetcher;
use routesync_core::{Error, Result};
use sqlx::Connection;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use tracing::debug;

/// Enabled domains; the cast accepts both text and boolean columns
const ENABLED_DOMAINS_SQL: &str =
    "SELECT domain_name FROM v_domains WHERE domain_enabled::text = 'true' ORDER BY domain_name";

/// Fetches enabled domains from FusionPBX databases
#[derive(Debug, Clone)]
pub struct FusionPbxFetcher {
    database: String,
    port: u16,
    connect_timeout: Duration,
}

impl FusionPbxFetcher {
    /// Create a fetcher
    ///
    /// # Parameters
    ///
    /// - `config`: Database name and port shared by all sources
    /// - `connect_timeout`: Upper bound for establishing a connection
    pub fn new(config: &SourceDbConfig, connect_timeout: Duration) -> Self {
        Self {
            database: config.database.clone(),
            port: config.port,
            connect_timeout,
        }
    }

    /// Connection options for `source`
    pub fn connect_options(&self, source: &SourceRecord) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&source.db_host)
            .port(self.port)
            .username(&source.db_username)
            .password(&source.db_password)
            .database(&self.database)
            .application_name("routesync")
    }

    async fn connect(&self, source: &SourceRecord) -> Result<PgConnection> {
        let options = self.connect_options(source);
        tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| {
                Error::timeout(
                    format!("connecting to {}:{}", source.db_host, self.port),
                    self.connect_timeout.as_secs(),
                )
            })?
            .map_err(|e| {
                Error::database(format!(
                    "Failed to connect to {}:{}/{}: {}",
                    source.db_host, self.port, self.database, e
                ))
            })
    }
}

#[async_trait]
impl DomainFetcher for FusionPbxFetcher {
    async fn enabled_domains(&self, source: &SourceRecord) -> Result<Vec<String>> {
        let mut conn = self.connect(source).await?;

        let domains = sqlx::query_scalar::<_, String>(ENABLED_DOMAINS_SQL)
            .fetch_all(&mut conn)
            .await
            .map_err(|e| {
                Error::database(format!(
                    "Failed to query domains on {}: {}",
                    source.db_host, e
                ))
            });

        if let Err(e) = conn.close().await {
            debug!("Closing connection to {} failed: {}", source.db_host, e);
        }

        domains
    }

    fn fetcher_name(&self) -> &'static str {
        "fusionpbx"
    }
}
