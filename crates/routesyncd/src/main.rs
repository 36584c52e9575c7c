// # routesyncd - routesync daemon
//
// This daemon is a thin integration layer. All reconciliation logic lives in
// routesync-core; the backends live in their own crates.
//
// The routesyncd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the Kamailio, FusionPBX and Docker backends into a SyncEngine
// 4. Running one reconciliation, or one every interval until SIGTERM/SIGINT
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Destination (Kamailio MySQL)
// - `ROUTESYNC_DEST_HOST`: Database host (default: localhost)
// - `ROUTESYNC_DEST_PORT`: Database port (default: 3306)
// - `ROUTESYNC_DEST_USER`: Database user (default: kamailio)
// - `ROUTESYNC_DEST_PASSWORD`: Database password (required)
// - `ROUTESYNC_DEST_DATABASE`: Database name (default: kamailio)
//
// ### Sources (FusionPBX PostgreSQL)
// - `ROUTESYNC_SOURCE_DATABASE`: Database name on every source (default: fusionpbx)
// - `ROUTESYNC_SOURCE_PORT`: Database port on every source (default: 5432)
//
// ### Reload
// - `ROUTESYNC_KAMCMD_PATH`: kamcmd binary (default: /usr/sbin/kamcmd)
//
// ### Proxy
// - `ROUTESYNC_PROXY_ENABLED`: Reconcile the nginx proxy (default: true)
// - `ROUTESYNC_PROXY_TEMPLATE`: Template path (default: ./routesync.nginx.tpl)
// - `ROUTESYNC_PROXY_CONFIG`: Rendered config path (default: ./routesync.nginx)
// - `ROUTESYNC_PROXY_HTML_DIR`: Static content directory (default: ./html)
// - `ROUTESYNC_PROXY_CONTAINER`: Container name (default: routesync-nginx)
// - `ROUTESYNC_PROXY_IMAGE`: Container image (default: nginx:latest)
// - `ROUTESYNC_DOCKER_BIN`: docker binary (default: docker)
//
// ### Engine
// - `ROUTESYNC_LOCK_PATH`: Run lock marker (default: ./.sync-lock)
// - `ROUTESYNC_TIMEOUT_SECS`: Bound for every external call (default: 30)
// - `ROUTESYNC_INTERVAL_SECS`: Run periodically (default: unset, run once)
// - `ROUTESYNC_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export ROUTESYNC_DEST_HOST=10.0.0.10
// export ROUTESYNC_DEST_PASSWORD=kamailiorw
// export ROUTESYNC_PROXY_TEMPLATE=/etc/routesync/nginx.tpl
//
// routesyncd
// ```

use anyhow::{Context, Result};
use routesync_core::config::SyncConfig;
use routesync_core::{EngineEvent, FileRunLock, ProxyReconciler, RunReport, SyncEngine};
use routesync_docker::{DEFAULT_DOCKER_BIN, DockerCli};
use routesync_fusionpbx::FusionPbxFetcher;
use routesync_kamailio::{KamailioStore, KamcmdReloader};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{IntervalStream, ReceiverStream};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// - 0: Run completed (or clean shutdown of the periodic loop)
/// - 1: Configuration or startup error
/// - 2: Runtime error (discovery or reset failed)
/// - 3: Another run holds the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoutesyncExitCode {
    /// Clean exit
    Success = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Fatal run error
    RuntimeError = 2,
    /// Lock held by another run
    AlreadyRunning = 3,
}

impl From<RoutesyncExitCode> for ExitCode {
    fn from(code: RoutesyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    sync: SyncConfig,
    docker_bin: String,
    interval_secs: Option<u64>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value lookup
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut sync = SyncConfig::default();

        let dest = &mut sync.destination;
        if let Some(host) = lookup("ROUTESYNC_DEST_HOST") {
            dest.host = host;
        }
        dest.port = parse_or(&lookup, "ROUTESYNC_DEST_PORT", dest.port)?;
        if let Some(user) = lookup("ROUTESYNC_DEST_USER") {
            dest.username = user;
        }
        dest.password = lookup("ROUTESYNC_DEST_PASSWORD").context(
            "ROUTESYNC_DEST_PASSWORD is required. \
            Set it via: export ROUTESYNC_DEST_PASSWORD=your_password",
        )?;
        if let Some(database) = lookup("ROUTESYNC_DEST_DATABASE") {
            dest.database = database;
        }

        if let Some(database) = lookup("ROUTESYNC_SOURCE_DATABASE") {
            sync.source_db.database = database;
        }
        sync.source_db.port = parse_or(&lookup, "ROUTESYNC_SOURCE_PORT", sync.source_db.port)?;

        if let Some(path) = lookup("ROUTESYNC_KAMCMD_PATH") {
            sync.reload.command_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("ROUTESYNC_LOCK_PATH") {
            sync.lock.path = PathBuf::from(path);
        }

        let proxy = &mut sync.proxy;
        if let Some(enabled) = lookup("ROUTESYNC_PROXY_ENABLED") {
            proxy.enabled = parse_bool("ROUTESYNC_PROXY_ENABLED", &enabled)?;
        }
        if let Some(path) = lookup("ROUTESYNC_PROXY_TEMPLATE") {
            proxy.template_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("ROUTESYNC_PROXY_CONFIG") {
            proxy.config_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("ROUTESYNC_PROXY_HTML_DIR") {
            proxy.html_dir = PathBuf::from(path);
        }
        if let Some(name) = lookup("ROUTESYNC_PROXY_CONTAINER") {
            proxy.container_name = name;
        }
        if let Some(image) = lookup("ROUTESYNC_PROXY_IMAGE") {
            proxy.image = image;
        }

        sync.engine.operation_timeout_secs = parse_or(
            &lookup,
            "ROUTESYNC_TIMEOUT_SECS",
            sync.engine.operation_timeout_secs,
        )?;

        let interval_secs = match lookup("ROUTESYNC_INTERVAL_SECS") {
            Some(raw) => Some(parse_value("ROUTESYNC_INTERVAL_SECS", &raw)?),
            None => None,
        };

        Ok(Self {
            sync,
            docker_bin: lookup("ROUTESYNC_DOCKER_BIN").unwrap_or_else(|| DEFAULT_DOCKER_BIN.to_string()),
            interval_secs,
            log_level: lookup("ROUTESYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.sync.destination.password.is_empty() {
            anyhow::bail!("ROUTESYNC_DEST_PASSWORD cannot be empty");
        }

        self.sync.validate()?;

        if self.sync.proxy.enabled {
            if self.docker_bin.is_empty() {
                anyhow::bail!("ROUTESYNC_DOCKER_BIN cannot be empty when the proxy is enabled");
            }
            if !self.sync.proxy.template_path.is_file() {
                anyhow::bail!(
                    "Proxy template not found: {}. \
                    Set ROUTESYNC_PROXY_TEMPLATE or disable the proxy with ROUTESYNC_PROXY_ENABLED=false",
                    self.sync.proxy.template_path.display()
                );
            }
        }

        if let Some(parent) = self.sync.lock.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "ROUTESYNC_LOCK_PATH parent directory does not exist: {}. \
                    Create it first: sudo mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        if let Some(interval) = self.interval_secs
            && interval == 0
        {
            anyhow::bail!("ROUTESYNC_INTERVAL_SECS must be > 0");
        }

        self.level()?;
        Ok(())
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "ROUTESYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    fn operation_timeout(&self) -> Duration {
        self.sync.engine.operation_timeout()
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be true or false. Got: {}", key, raw),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return RoutesyncExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return RoutesyncExitCode::ConfigError.into();
    }

    let log_level = config.level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return RoutesyncExitCode::ConfigError.into();
    }

    info!("Starting routesyncd");
    debug!("Configuration: {:?}", config.sync);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return RoutesyncExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match run_daemon(config).await {
            Ok(code) => code,
            Err(e) => {
                error!("Startup error: {:#}", e);
                RoutesyncExitCode::ConfigError
            }
        }
    });

    code.into()
}

/// Engine plus the handles the daemon needs after the runs
struct Daemon {
    engine: SyncEngine,
    events: tokio::sync::mpsc::Receiver<EngineEvent>,
    destination: Arc<KamailioStore>,
}

/// Wire the backends into an engine
fn build_daemon(config: &Config) -> Result<Daemon> {
    let timeout = config.operation_timeout();

    let destination = Arc::new(
        KamailioStore::connect_lazy(&config.sync.destination, timeout)
            .context("Failed to prepare the destination database")?,
    );

    let mut builder = SyncEngine::builder()
        .lock(Arc::new(FileRunLock::new(&config.sync.lock.path)))
        .destination(Arc::clone(&destination))
        .fetcher(Arc::new(FusionPbxFetcher::new(&config.sync.source_db, timeout)))
        .reloader(Arc::new(KamcmdReloader::new(&config.sync.reload, timeout)));

    if config.sync.proxy.enabled {
        let runtime = DockerCli::new(&config.docker_bin, timeout);
        builder = builder.proxy(ProxyReconciler::new(
            config.sync.proxy.clone(),
            Box::new(runtime),
        ));
    } else {
        info!("Proxy reconciliation disabled");
    }

    let (engine, events) = builder.build(&config.sync.engine)?;
    Ok(Daemon {
        engine,
        events,
        destination,
    })
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<RoutesyncExitCode> {
    let Daemon {
        engine,
        events,
        destination,
    } = build_daemon(&config)?;
    tokio::spawn(log_events(ReceiverStream::new(events)));

    let mut shutdown = ShutdownSignals::install()?;

    let code = match config.interval_secs {
        None => match run_until_shutdown(&engine, shutdown.recv()).await {
            RunEnd::Finished(code) => code,
            RunEnd::Interrupted => RoutesyncExitCode::RuntimeError,
        },
        Some(interval_secs) => {
            run_periodically(&engine, &mut shutdown, Duration::from_secs(interval_secs)).await;
            RoutesyncExitCode::Success
        }
    };

    destination.close().await;
    info!("Shutting down routesyncd");
    Ok(code)
}

async fn run_periodically(engine: &SyncEngine, shutdown: &mut ShutdownSignals, every: Duration) {
    info!("Running every {}s", every.as_secs());

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = IntervalStream::new(interval);

    loop {
        tokio::select! {
            Some(_) = ticks.next() => {
                if run_until_shutdown(engine, shutdown.recv()).await == RunEnd::Interrupted {
                    break;
                }
            }
            signal = shutdown.recv() => {
                info!("Received shutdown signal: {}", signal);
                break;
            }
        }
    }
}

/// How a single run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEnd {
    /// The run completed with this exit code
    Finished(RoutesyncExitCode),
    /// A shutdown signal arrived first and the run was abandoned
    Interrupted,
}

/// Run one reconciliation unless `shutdown` resolves first
///
/// An abandoned run is dropped, which drops its lock guard and removes the
/// marker. The routing tables may be half rebuilt; the next run rebuilds them.
async fn run_until_shutdown<S>(engine: &SyncEngine, shutdown: S) -> RunEnd
where
    S: Future<Output = &'static str>,
{
    tokio::select! {
        code = run_cycle(engine) => RunEnd::Finished(code),
        signal = shutdown => {
            warn!("Received {} during a reconciliation, abandoning the run", signal);
            RunEnd::Interrupted
        }
    }
}

/// Run one reconciliation and map its result to an exit code
async fn run_cycle(engine: &SyncEngine) -> RoutesyncExitCode {
    match engine.run_once().await {
        Ok(report) => {
            log_report(&report);
            RoutesyncExitCode::Success
        }
        Err(routesync_core::Error::AlreadyRunning { marker }) => {
            warn!(
                "Another reconciliation holds {}; remove it manually if it is stale",
                marker.display()
            );
            RoutesyncExitCode::AlreadyRunning
        }
        Err(e) => {
            error!("Reconciliation failed: {}", e);
            RoutesyncExitCode::RuntimeError
        }
    }
}

fn log_report(report: &RunReport) {
    info!(
        "Run complete: {} source(s), {} synced, {} failed, reload {}, proxy {:?} ({} ms)",
        report.sources_discovered,
        report.succeeded(),
        report.failed(),
        if report.reloaded { "ok" } else { "failed" },
        report.proxy,
        (report.finished_at - report.started_at).num_milliseconds()
    );
    for outcome in report.outcomes.iter().filter(|o| !o.is_success()) {
        warn!(
            "Source {} ({}) failed: {}",
            outcome.source_id,
            outcome.address,
            outcome.error_text()
        );
    }
}

async fn log_events(mut events: ReceiverStream<EngineEvent>) {
    while let Some(event) = events.next().await {
        debug!("Engine event: {:?}", event);
    }
}

/// SIGTERM and SIGINT handlers, installed once for the periodic loop
#[cfg(unix)]
struct ShutdownSignals {
    sigterm: Signal,
    sigint: Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
        Ok(Self { sigterm, sigint })
    }

    /// Wait for the next signal and return its name
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// CTRL-C handler for non-Unix platforms
#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for CTRL-C: {}", e);
        }
        "SIGINT"
    }
}
