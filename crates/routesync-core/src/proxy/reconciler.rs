//! Proxy reconciler
//!
//! Makes the reverse-proxy process match the current list of source addresses.
//!
//! ## State Machine
//!
//! ```text
//!   addresses      proxy        action                         result
//!   ─────────      ─────        ──────                         ──────
//!   empty          running      stop + remove                  Stopped
//!   empty          absent       nothing                        AlreadyStopped
//!   non-empty      absent       write config, start            Started
//!   non-empty      running      write config, exec reload      Reloaded
//! ```
//!
//! No configuration file is written when the address list is empty.
//! Failures are returned as [`Error::ProxyReconcileFailed`]; the engine logs
//! them and never rolls back routing data because of them.

use std::path::Path;

use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::model::ProxyOutcome;
use crate::proxy::render::{render_config, write_atomic};
use crate::traits::{ContainerRuntime, ContainerSpec, PortMapping, VolumeMount};
use tracing::{debug, info};

/// Reconciles the reverse proxy against a source address list
pub struct ProxyReconciler {
    config: ProxyConfig,
    runtime: Box<dyn ContainerRuntime>,
}

impl ProxyReconciler {
    /// Create a reconciler
    ///
    /// # Parameters
    ///
    /// - `config`: Proxy settings (template, paths, container)
    /// - `runtime`: Container runtime used to inspect and control the proxy
    pub fn new(config: ProxyConfig, runtime: Box<dyn ContainerRuntime>) -> Self {
        Self { config, runtime }
    }

    /// Proxy settings
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Reconcile the proxy with `addresses`
    ///
    /// `addresses` is used in the given order; callers pass the discovery order
    /// so the rendered file is stable across runs.
    pub async fn reconcile(&self, addresses: &[String]) -> Result<ProxyOutcome> {
        let name = self.config.container_name.as_str();

        if addresses.is_empty() {
            return self.stop_if_running(name).await;
        }

        let rendered = self.render(addresses).await?;
        write_atomic(&self.config.config_path, &rendered).await?;
        debug!(
            "Rendered proxy configuration with {} server(s) to {}",
            addresses.len(),
            self.config.config_path.display()
        );

        if self.is_running(name).await? {
            self.runtime
                .exec(name, &self.config.reload_command)
                .await
                .map_err(|e| Error::proxy(format!("Failed to reload {}: {}", name, e)))?;
            info!("Reloaded proxy {}", name);
            Ok(ProxyOutcome::Reloaded {
                servers: addresses.len(),
            })
        } else {
            let spec = self.container_spec()?;
            self.runtime
                .start(&spec)
                .await
                .map_err(|e| Error::proxy(format!("Failed to start {}: {}", name, e)))?;
            info!("Started proxy {} ({})", name, spec.image);
            Ok(ProxyOutcome::Started {
                servers: addresses.len(),
            })
        }
    }

    /// Container specification used when the proxy has to be started
    ///
    /// Host paths are made absolute because bind mounts require it.
    pub fn container_spec(&self) -> Result<ContainerSpec> {
        Ok(ContainerSpec {
            name: self.config.container_name.clone(),
            image: self.config.image.clone(),
            ports: vec![PortMapping {
                host: self.config.host_port,
                container: self.config.container_port,
            }],
            mounts: vec![
                VolumeMount {
                    source: absolute(&self.config.config_path)?,
                    target: self.config.config_mount_target.clone(),
                    read_only: false,
                },
                VolumeMount {
                    source: absolute(&self.config.html_dir)?,
                    target: self.config.html_mount_target.clone(),
                    read_only: false,
                },
            ],
        })
    }

    async fn render(&self, addresses: &[String]) -> Result<String> {
        let template = tokio::fs::read_to_string(&self.config.template_path)
            .await
            .map_err(|e| {
                Error::proxy(format!(
                    "Failed to read template {}: {}",
                    self.config.template_path.display(),
                    e
                ))
            })?;

        render_config(&template, &self.config.placeholder, addresses)
    }

    async fn stop_if_running(&self, name: &str) -> Result<ProxyOutcome> {
        if !self.is_running(name).await? {
            debug!("No sources and proxy {} is not running", name);
            return Ok(ProxyOutcome::AlreadyStopped);
        }

        self.runtime
            .stop_and_remove(name)
            .await
            .map_err(|e| Error::proxy(format!("Failed to stop {}: {}", name, e)))?;
        info!("No sources left, stopped proxy {}", name);
        Ok(ProxyOutcome::Stopped)
    }

    async fn is_running(&self, name: &str) -> Result<bool> {
        self.runtime
            .is_running(name)
            .await
            .map_err(|e| Error::proxy(format!("Failed to inspect {}: {}", name, e)))
    }
}

fn absolute(path: &Path) -> Result<std::path::PathBuf> {
    std::path::absolute(path).map_err(|e| {
        Error::proxy(format!(
            "Failed to resolve absolute path for {}: {}",
            path.display(),
            e
        ))
    })
}
