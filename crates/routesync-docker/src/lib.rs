// # Docker Container Runtime
//
// Implements `ContainerRuntime` by shelling out to the `docker` CLI.
//
// ## Commands
//
// | operation         | command                                                   |
// |-------------------|-----------------------------------------------------------|
// | `is_running`      | `docker ps --filter name=^/<name>$ --format {{.Names}}`   |
// | `stop_and_remove` | `docker stop <name>` then `docker rm -f <name>`           |
// | `start`           | `docker rm -f <name>` then                                |
// |                   | `docker run -d --name <name> -p h:c -v src:dst:rw <image>` |
// | `exec`            | `docker exec <name> <command..>`                          |
//
// Every invocation is bounded by the configured timeout and killed when it
// expires.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use routesync_core::traits::{ContainerRuntime, ContainerSpec};
use routesync_core::{Error, Result};
use tokio::process::Command;
use tracing::debug;

/// Default docker binary (resolved through `PATH`)
pub const DEFAULT_DOCKER_BIN: &str = "docker";

/// Container runtime backed by the docker CLI
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
    timeout: Duration,
}

impl DockerCli {
    /// Create a runtime using `binary`
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Run docker with `args` and return stdout
    async fn run(&self, args: Vec<OsString>) -> Result<String> {
        let operation = args
            .first()
            .map(|a| a.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("Running {} {:?}", self.binary.display(), args);

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| Error::timeout(format!("docker {}", operation), self.timeout.as_secs()))?
            .map_err(|e| {
                Error::container(format!("Failed to run {}: {}", self.binary.display(), e))
            })?;

        if !output.status.success() {
            return Err(Error::container(format!(
                "docker {} exited with {}: {}",
                operation,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Arguments listing a running container with exactly this name
pub fn ps_args(name: &str) -> Vec<OsString> {
    vec![
        "ps".into(),
        "--filter".into(),
        format!("name=^/{}$", name).into(),
        "--format".into(),
        "{{.Names}}".into(),
    ]
}

/// Arguments stopping the named container
pub fn stop_args(name: &str) -> Vec<OsString> {
    vec!["stop".into(), name.into()]
}

/// Arguments force-removing the named container, running or exited
pub fn rm_args(name: &str) -> Vec<OsString> {
    vec!["rm".into(), "-f".into(), name.into()]
}

/// Arguments starting `spec` detached
pub fn run_args(spec: &ContainerSpec) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["run".into(), "-d".into(), "--name".into(), spec.name.as_str().into()];

    for port in &spec.ports {
        args.push("-p".into());
        args.push(format!("{}:{}", port.host, port.container).into());
    }

    for mount in &spec.mounts {
        let mode = if mount.read_only { "ro" } else { "rw" };
        let mut volume = mount.source.clone().into_os_string();
        volume.push(format!(":{}:{}", mount.target, mode));
        args.push("-v".into());
        args.push(volume);
    }

    args.push(spec.image.as_str().into());
    args
}

/// Arguments running `command` inside the named container
pub fn exec_args(name: &str, command: &[String]) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["exec".into(), name.into()];
    args.extend(command.iter().map(OsString::from));
    args
}

/// Whether a failed `docker rm` only reported that nothing was there
fn is_missing_container(err: &Error) -> bool {
    matches!(err, Error::Container(msg) if msg.contains("No such container"))
}

/// Whether `docker ps` output lists `name`
fn lists_container(stdout: &str, name: &str) -> bool {
    stdout.lines().any(|line| line.trim() == name)
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn is_running(&self, name: &str) -> Result<bool> {
        let stdout = self.run(ps_args(name)).await?;
        Ok(lists_container(&stdout, name))
    }

    async fn stop_and_remove(&self, name: &str) -> Result<()> {
        self.run(stop_args(name)).await?;
        self.run(rm_args(name)).await?;
        Ok(())
    }

    async fn start(&self, spec: &ContainerSpec) -> Result<()> {
        // `docker ps` lists running containers only; an exited one still holds the name
        match self.run(rm_args(&spec.name)).await {
            Ok(_) => debug!("Removed leftover container {}", spec.name),
            Err(e) if is_missing_container(&e) => {}
            Err(e) => return Err(e),
        }

        let id = self.run(run_args(spec)).await?;
        debug!("Started container {} ({})", spec.name, id.trim());
        Ok(())
    }

    async fn exec(&self, name: &str, command: &[String]) -> Result<()> {
        if command.is_empty() {
            return Err(Error::container("Cannot exec an empty command"));
        }
        self.run(exec_args(name, command)).await?;
        Ok(())
    }
}
