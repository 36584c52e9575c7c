//! `kamcmd` reload trigger

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use routesync_core::config::ReloadConfig;
use routesync_core::traits::ServiceReloader;
use routesync_core::{Error, Result};
use tokio::process::Command;
use tracing::debug;

/// Tells Kamailio to reload its domain table
///
/// Runs `<command_path> <args..>` (by default `/usr/sbin/kamcmd domain.reload`)
/// once per call. Only the exit status matters; stderr is included in the
/// error when the command fails.
#[derive(Debug, Clone)]
pub struct KamcmdReloader {
    command_path: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl KamcmdReloader {
    /// Create a reloader from the reload configuration
    pub fn new(config: &ReloadConfig, timeout: Duration) -> Self {
        Self {
            command_path: config.command_path.clone(),
            args: config.args.clone(),
            timeout,
        }
    }

}

#[async_trait]
impl ServiceReloader for KamcmdReloader {
    async fn reload(&self) -> Result<()> {
        let command = self.command_path.display();
        debug!("Running {} {}", command, self.args.join(" "));

        let output = Command::new(&self.command_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| Error::reload(format!("{} timed out after {}s", command, self.timeout.as_secs())))?
            .map_err(|e| Error::reload(format!("Failed to run {}: {}", command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::reload(format!(
                "{} exited with {}: {}",
                command,
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}
