//! Configuration types for routesync
//!
//! This module defines all configuration structures used throughout the workspace.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main routesync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Destination (routing directory) database
    pub destination: DestinationConfig,

    /// Settings shared by every source database connection
    #[serde(default)]
    pub source_db: SourceDbConfig,

    /// Reload trigger settings
    #[serde(default)]
    pub reload: ReloadConfig,

    /// Reverse-proxy settings
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Run lock settings
    #[serde(default)]
    pub lock: LockConfig,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.destination.validate()?;
        self.source_db.validate()?;
        self.reload.validate()?;
        self.proxy.validate()?;
        self.lock.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// Connection parameters of the destination database
#[derive(Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Database host
    #[serde(default = "default_destination_host")]
    pub host: String,

    /// Database port
    #[serde(default = "default_destination_port")]
    pub port: u16,

    /// Database user
    #[serde(default = "default_destination_user")]
    pub username: String,

    /// Database password
    /// ⚠️ NEVER log this value
    #[serde(default)]
    pub password: String,

    /// Database name
    #[serde(default = "default_destination_database")]
    pub database: String,
}

impl DestinationConfig {
    /// Validate the destination configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.host.is_empty() {
            return Err(crate::Error::config("Destination host cannot be empty"));
        }
        if self.port == 0 {
            return Err(crate::Error::config("Destination port must be > 0"));
        }
        if self.username.is_empty() {
            return Err(crate::Error::config("Destination username cannot be empty"));
        }
        if self.database.is_empty() {
            return Err(crate::Error::config("Destination database cannot be empty"));
        }
        Ok(())
    }
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            host: default_destination_host(),
            port: default_destination_port(),
            username: default_destination_user(),
            password: String::new(),
            database: default_destination_database(),
        }
    }
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("database", &self.database)
            .finish()
    }
}

/// Settings for connecting to source databases
///
/// Host and credentials come from each [`crate::SourceRecord`]; only what the
/// directory does not store lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDbConfig {
    /// Database name on every source
    #[serde(default = "default_source_database")]
    pub database: String,

    /// Database port on every source
    #[serde(default = "default_source_port")]
    pub port: u16,
}

impl SourceDbConfig {
    /// Validate the source database configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.database.is_empty() {
            return Err(crate::Error::config("Source database name cannot be empty"));
        }
        if self.port == 0 {
            return Err(crate::Error::config("Source database port must be > 0"));
        }
        Ok(())
    }
}

impl Default for SourceDbConfig {
    fn default() -> Self {
        Self {
            database: default_source_database(),
            port: default_source_port(),
        }
    }
}

/// Reload trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadConfig {
    /// Management command of the consuming service
    #[serde(default = "default_reload_command")]
    pub command_path: PathBuf,

    /// Arguments (the reload subcommand)
    #[serde(default = "default_reload_args")]
    pub args: Vec<String>,
}

impl ReloadConfig {
    /// Validate the reload configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.command_path.as_os_str().is_empty() {
            return Err(crate::Error::config("Reload command path cannot be empty"));
        }
        Ok(())
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            command_path: default_reload_command(),
            args: default_reload_args(),
        }
    }
}

/// Reverse-proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Whether to reconcile the proxy at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Template containing the placeholder token
    #[serde(default = "default_template_path")]
    pub template_path: PathBuf,

    /// Where the rendered configuration is written
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// Static content directory mounted into the proxy
    #[serde(default = "default_html_dir")]
    pub html_dir: PathBuf,

    /// Placeholder replaced by the server list
    #[serde(default = "default_placeholder")]
    pub placeholder: String,

    /// Name of the proxy container
    #[serde(default = "default_container_name")]
    pub container_name: String,

    /// Image of the proxy container
    #[serde(default = "default_image")]
    pub image: String,

    /// Port published on the host
    #[serde(default = "default_http_port")]
    pub host_port: u16,

    /// Port inside the container
    #[serde(default = "default_http_port")]
    pub container_port: u16,

    /// Mount point of the rendered configuration inside the container
    #[serde(default = "default_config_mount_target")]
    pub config_mount_target: String,

    /// Mount point of the static content inside the container
    #[serde(default = "default_html_mount_target")]
    pub html_mount_target: String,

    /// Command executed inside a running proxy to reload it
    #[serde(default = "default_proxy_reload_command")]
    pub reload_command: Vec<String>,
}

impl ProxyConfig {
    /// Validate the proxy configuration
    ///
    /// A disabled proxy is always valid.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !self.enabled {
            return Ok(());
        }
        if self.placeholder.is_empty() {
            return Err(crate::Error::config("Proxy template placeholder cannot be empty"));
        }
        if self.container_name.is_empty() {
            return Err(crate::Error::config("Proxy container name cannot be empty"));
        }
        if self.image.is_empty() {
            return Err(crate::Error::config("Proxy image cannot be empty"));
        }
        if self.host_port == 0 || self.container_port == 0 {
            return Err(crate::Error::config("Proxy ports must be > 0"));
        }
        if self.config_path.as_os_str().is_empty() {
            return Err(crate::Error::config("Proxy config path cannot be empty"));
        }
        if self.config_path == self.template_path {
            return Err(crate::Error::config(
                "Proxy config path must differ from the template path",
            ));
        }
        if self.reload_command.is_empty() {
            return Err(crate::Error::config("Proxy reload command cannot be empty"));
        }
        Ok(())
    }

    /// Disabled proxy configuration
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            template_path: default_template_path(),
            config_path: default_config_path(),
            html_dir: default_html_dir(),
            placeholder: default_placeholder(),
            container_name: default_container_name(),
            image: default_image(),
            host_port: default_http_port(),
            container_port: default_http_port(),
            config_mount_target: default_config_mount_target(),
            html_mount_target: default_html_mount_target(),
            reload_command: default_proxy_reload_command(),
        }
    }
}

/// Run lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Marker file path
    #[serde(default = "default_lock_path")]
    pub path: PathBuf,
}

impl LockConfig {
    /// Validate the lock configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.path.as_os_str().is_empty() {
            return Err(crate::Error::config("Lock path cannot be empty"));
        }
        Ok(())
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            path: default_lock_path(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for every database, command and container call (in seconds)
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.operation_timeout_secs == 0 {
            return Err(crate::Error::config("Operation timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    /// Operation timeout as a [`Duration`]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout_secs: default_operation_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_destination_host() -> String {
    "localhost".to_string()
}

fn default_destination_port() -> u16 {
    3306
}

fn default_destination_user() -> String {
    "kamailio".to_string()
}

fn default_destination_database() -> String {
    "kamailio".to_string()
}

fn default_source_database() -> String {
    "fusionpbx".to_string()
}

fn default_source_port() -> u16 {
    5432
}

fn default_reload_command() -> PathBuf {
    PathBuf::from("/usr/sbin/kamcmd")
}

fn default_reload_args() -> Vec<String> {
    vec!["domain.reload".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_template_path() -> PathBuf {
    PathBuf::from("./routesync.nginx.tpl")
}

fn default_config_path() -> PathBuf {
    PathBuf::from("./routesync.nginx")
}

fn default_html_dir() -> PathBuf {
    PathBuf::from("./html")
}

fn default_placeholder() -> String {
    "##SERVERLIST##".to_string()
}

fn default_container_name() -> String {
    "routesync-nginx".to_string()
}

fn default_image() -> String {
    "nginx:latest".to_string()
}

fn default_http_port() -> u16 {
    80
}

fn default_config_mount_target() -> String {
    "/etc/nginx/conf.d/default.conf".to_string()
}

fn default_html_mount_target() -> String {
    "/etc/nginx/html".to_string()
}

fn default_proxy_reload_command() -> Vec<String> {
    vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()]
}

fn default_lock_path() -> PathBuf {
    PathBuf::from("./.sync-lock")
}

fn default_operation_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    100
}
