//! MySQL-backed destination store

use std::time::Duration;

use async_trait::async_trait;
use routesync_core::config::DestinationConfig;
use routesync_core::model::{SourceRecord, SyncOutcome};
use routesync_core::traits::{RoutingStore, SourceDirectory, StatusRecorder};
use routesync_core::{Error, Result};
use sqlx::Row;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use tracing::debug;

/// Enabled sources joined with their gateway address, in id order
const LIST_SOURCES_SQL: &str = "SELECT CAST(f.pbx_id AS SIGNED) AS pbx_id, g.address, f.db_ip, \
     f.db_username, f.db_password \
     FROM dsip_fusionpbx_db f JOIN dr_gateways g ON f.pbx_id = g.gwid \
     WHERE f.enabled = 1 ORDER BY f.pbx_id";

const TRUNCATE_DOMAIN_SQL: &str = "TRUNCATE TABLE domain";

const TRUNCATE_DOMAIN_ATTRS_SQL: &str = "TRUNCATE TABLE domain_attrs";

const INSERT_DOMAIN_SQL: &str = "INSERT IGNORE INTO domain (id, domain, did) VALUES (NULL, ?, ?)";

const INSERT_DOMAIN_ATTR_SQL: &str = "INSERT IGNORE INTO domain_attrs (id, did, name, type, value) \
     VALUES (NULL, ?, 'pbx_ip', 2, ?)";

const UPDATE_STATUS_SQL: &str = "UPDATE dsip_fusionpbx_db \
     SET syncstatus = ?, lastsync = ?, syncerror = ? WHERE pbx_id = ?";

/// Kamailio MySQL database
///
/// The pool connects lazily, so construction never touches the network and
/// an unreachable database surfaces as an error of the first operation.
pub struct KamailioStore {
    pool: MySqlPool,
    host: String,
    database: String,
}

// Custom Debug implementation that keeps the connection options out of logs
impl std::fmt::Debug for KamailioStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KamailioStore")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl KamailioStore {
    /// Create a store for `config`
    ///
    /// # Parameters
    ///
    /// - `config`: Destination connection parameters
    /// - `acquire_timeout`: Upper bound for obtaining a connection
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect_lazy(config: &DestinationConfig, acquire_timeout: Duration) -> Result<Self> {
        config.validate()?;

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(acquire_timeout)
            .connect_lazy_with(options);

        debug!(
            "Prepared destination pool for {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            host: config.host.clone(),
            database: config.database.clone(),
        })
    }

    /// Close all pooled connections
    ///
    /// Later operations fail instead of reconnecting.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn source_from_row(row: &MySqlRow) -> std::result::Result<SourceRecord, sqlx::Error> {
    let password: Option<String> = row.try_get("db_password")?;
    Ok(SourceRecord::new(
        row.try_get::<i64, _>("pbx_id")?,
        row.try_get::<String, _>("address")?,
        row.try_get::<String, _>("db_ip")?,
        row.try_get::<String, _>("db_username")?,
        password.unwrap_or_default(),
    ))
}

fn db_error(context: &str, err: sqlx::Error) -> Error {
    Error::database(format!("{}: {}", context, err))
}

#[async_trait]
impl SourceDirectory for KamailioStore {
    async fn list_sources(&self) -> Result<Vec<SourceRecord>> {
        let rows = sqlx::query(LIST_SOURCES_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::directory(format!("Failed to query enabled sources: {}", e)))?;

        rows.iter()
            .map(|row| {
                source_from_row(row)
                    .map_err(|e| Error::directory(format!("Malformed source row: {}", e)))
            })
            .collect()
    }
}

#[async_trait]
impl RoutingStore for KamailioStore {
    async fn reset_routing_tables(&self) -> Result<()> {
        for statement in [TRUNCATE_DOMAIN_SQL, TRUNCATE_DOMAIN_ATTRS_SQL] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::reset(format!("{} failed: {}", statement, e)))?;
        }
        Ok(())
    }

    async fn write_domains(&self, source: &SourceRecord, domains: &[String]) -> Result<usize> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        for domain in domains {
            sqlx::query(INSERT_DOMAIN_SQL)
                .bind(domain)
                .bind(domain)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error(&format!("Failed to insert domain {}", domain), e))?;

            sqlx::query(INSERT_DOMAIN_ATTR_SQL)
                .bind(domain)
                .bind(&source.address)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error(&format!("Failed to insert attribute of {}", domain), e))?;
        }

        // dropping an uncommitted transaction rolls it back
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit domains", e))?;

        Ok(domains.len())
    }
}

#[async_trait]
impl StatusRecorder for KamailioStore {
    async fn record_status(&self, outcome: &SyncOutcome) -> Result<()> {
        let result = sqlx::query(UPDATE_STATUS_SQL)
            .bind(outcome.status.as_flag())
            .bind(outcome.finished_at)
            .bind(outcome.error_text())
            .bind(outcome.source_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::status(format!(
                    "Failed to update status of source {}: {}",
                    outcome.source_id, e
                ))
            })?;

        if result.rows_affected() == 0 {
            debug!(
                "Status of source {} unchanged or source row missing",
                outcome.source_id
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DestinationConfig {
        DestinationConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            password: "hunter2".to_string(),
            ..DestinationConfig::default()
        }
    }

    #[tokio::test]
    async fn test_debug_hides_password() {
        let store = KamailioStore::connect_lazy(&config(), Duration::from_secs(1)).unwrap();
        let debug = format!("{:?}", store);

        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<REDACTED>"));
        assert!(debug.contains("kamailio"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = DestinationConfig {
            host: String::new(),
            ..config()
        };

        let result = KamailioStore::connect_lazy(&config, Duration::from_secs(1));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_directory_is_an_error_not_an_empty_list() {
        let store = KamailioStore::connect_lazy(&config(), Duration::from_secs(2)).unwrap();

        let result = store.list_sources().await;
        assert!(matches!(result, Err(Error::DirectoryUnavailable(_))));
    }

    #[tokio::test]
    async fn test_unreachable_reset_is_reset_failure() {
        let store = KamailioStore::connect_lazy(&config(), Duration::from_secs(2)).unwrap();

        let result = store.reset_routing_tables().await;
        assert!(matches!(result, Err(Error::ResetFailed(_))));
    }

    #[tokio::test]
    async fn test_closed_store_refuses_work() {
        let store = KamailioStore::connect_lazy(&config(), Duration::from_secs(2)).unwrap();
        store.close().await;

        let result = store.list_sources().await;
        assert!(matches!(result, Err(Error::DirectoryUnavailable(_))));
    }

    #[test]
    fn test_statements_target_expected_tables() {
        assert!(LIST_SOURCES_SQL.contains("f.pbx_id = g.gwid"));
        assert!(LIST_SOURCES_SQL.contains("f.enabled = 1"));
        assert!(INSERT_DOMAIN_SQL.starts_with("INSERT IGNORE INTO domain "));
        assert!(INSERT_DOMAIN_ATTR_SQL.contains("'pbx_ip', 2"));
        assert!(UPDATE_STATUS_SQL.contains("WHERE pbx_id = ?"));
    }
}
