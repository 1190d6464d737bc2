//! Container engine abstraction.
//!
//! [`ContainerEngine`] is the seam between the lifecycle logic and the
//! container runtime. [`DockerEngine`] implements it over bollard; tests use
//! [`FakeEngine`](crate::testing::FakeEngine).

pub mod detect;
mod docker;

use async_trait::async_trait;

pub use docker::{DockerEngine, connect_docker};

use crate::error::EngineError;

/// A network known to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    pub id: String,
    pub name: String,
}

/// Coarse container state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Stopped,
}

/// A container known to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
}

impl ContainerHandle {
    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }
}

/// A memory-backed mount discarded with the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmpfsMount {
    pub path: String,
    /// Size cap in Docker syntax (e.g. `512m`).
    pub size: String,
}

impl TmpfsMount {
    /// Mount options: writable, no exec, no setuid, size-capped.
    pub fn options(&self) -> String {
        format!("rw,noexec,nosuid,size={}", self.size)
    }
}

/// Everything needed to create the database container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Port the database listens on inside the container.
    pub container_port: u16,
    /// Host port bound on all interfaces.
    pub host_port: u16,
    pub env: Vec<(String, String)>,
    pub tmpfs: Vec<TmpfsMount>,
    /// Network joined at creation time.
    pub network: String,
    /// Aliases on that network.
    pub aliases: Vec<String>,
}

/// Operations the harness needs from a container runtime.
///
/// Implementations report absent objects as [`EngineError::NotFound`] and
/// "already exists" responses as [`EngineError::Conflict`].
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn list_networks(&self) -> Result<Vec<NetworkHandle>, EngineError>;

    /// Create an attachable bridge network with duplicate checking.
    async fn create_network(&self, name: &str) -> Result<NetworkHandle, EngineError>;

    async fn inspect_network(&self, name: &str) -> Result<NetworkHandle, EngineError>;

    async fn remove_network(&self, name: &str) -> Result<(), EngineError>;

    /// Connect a container (by id or name) to a network.
    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        aliases: &[String],
    ) -> Result<(), EngineError>;

    async fn disconnect_network(
        &self,
        network: &str,
        container: &str,
        force: bool,
    ) -> Result<(), EngineError>;

    async fn inspect_container(&self, name: &str) -> Result<ContainerHandle, EngineError>;

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    async fn stop_container(&self, id: &str) -> Result<(), EngineError>;

    async fn restart_container(&self, id: &str) -> Result<(), EngineError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError>;
}
