// # Container Runtime Trait
//
// The process-management boundary used by the proxy reconciler.
//
// ## Implementations
//
// - Docker CLI: `routesync-docker` crate

use async_trait::async_trait;
use std::path::PathBuf;

/// Host to container port binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Port on the host
    pub host: u16,
    /// Port inside the container
    pub container: u16,
}

/// A host path mounted into the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    /// Host path
    pub source: PathBuf,
    /// Path inside the container
    pub target: String,
    /// Mount read-only instead of read-write
    pub read_only: bool,
}

/// Everything needed to start the proxy container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name (also used to find it later)
    pub name: String,
    /// Image to run
    pub image: String,
    /// Published ports
    pub ports: Vec<PortMapping>,
    /// Bind mounts
    pub mounts: Vec<VolumeMount>,
}

/// Controls named containers
///
/// Implementations execute exactly one runtime operation per call and carry
/// their own bounded timeout.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether a container with this name is currently running
    async fn is_running(&self, name: &str) -> Result<bool, crate::Error>;

    /// Stop the named container and remove it
    async fn stop_and_remove(&self, name: &str) -> Result<(), crate::Error>;

    /// Start a new detached container
    async fn start(&self, spec: &ContainerSpec) -> Result<(), crate::Error>;

    /// Execute a command inside the running container
    async fn exec(&self, name: &str, command: &[String]) -> Result<(), crate::Error>;
}
