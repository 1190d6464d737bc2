//! Docker implementation of [`ContainerEngine`] using bollard.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, NetworkingConfig,
    RemoveContainerOptions, RestartContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::{EndpointSettings, HostConfig, Network, PortBinding};
use bollard::network::{
    ConnectNetworkOptions, CreateNetworkOptions, DisconnectNetworkOptions, InspectNetworkOptions,
    ListNetworksOptions,
};

use crate::engine::{ContainerEngine, ContainerHandle, ContainerSpec, ContainerState, NetworkHandle};
use crate::error::EngineError;

/// Connect to the local Docker daemon and verify it answers a ping.
///
/// Tries bollard's local defaults (which honour `DOCKER_HOST`) first, then
/// the rootless and Docker Desktop socket locations.
pub async fn connect_docker() -> Result<Docker, EngineError> {
    let mut last_error = match Docker::connect_with_local_defaults() {
        Ok(docker) => match docker.ping().await {
            Ok(_) => return Ok(docker),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    for socket in fallback_sockets() {
        if !socket.exists() {
            continue;
        }
        let Some(path) = socket.to_str() else {
            continue;
        };
        tracing::debug!("Trying Docker socket {}", path);
        match Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION) {
            Ok(docker) => match docker.ping().await {
                Ok(_) => return Ok(docker),
                Err(e) => last_error = e.to_string(),
            },
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(EngineError::Unavailable { reason: last_error })
}

fn fallback_sockets() -> Vec<PathBuf> {
    let mut sockets = Vec::new();
    if let Some(runtime_dir) = std::env::var_os("XDG_RUNTIME_DIR") {
        sockets.push(PathBuf::from(runtime_dir).join("docker.sock"));
    }
    if let Some(home) = std::env::var_os("HOME") {
        sockets.push(PathBuf::from(home).join(".docker/run/docker.sock"));
    }
    sockets
}

/// Map a bollard error onto the engine taxonomy by HTTP status.
fn map_error(kind: &'static str, name: &str, operation: &str, err: BollardError) -> EngineError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => EngineError::NotFound {
            kind,
            name: name.to_string(),
        },
        BollardError::DockerResponseServerError {
            status_code: 409,
            message,
        } => EngineError::Conflict {
            kind,
            name: name.to_string(),
            reason: message,
        },
        BollardError::DockerResponseServerError {
            status_code: 304, ..
        } => EngineError::NotModified {
            kind,
            name: name.to_string(),
        },
        other => EngineError::Api {
            operation: operation.to_string(),
            reason: other.to_string(),
        },
    }
}

fn network_handle(network: Network, fallback_name: &str) -> NetworkHandle {
    NetworkHandle {
        id: network.id.unwrap_or_default(),
        name: network.name.unwrap_or_else(|| fallback_name.to_string()),
    }
}

/// Older daemons answer 403 instead of 409 when the endpoint already exists.
/// Any other 403 (e.g. a predefined network) is a real refusal.
fn map_connect_error(network: &str, container: &str, err: BollardError) -> EngineError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 403,
            message,
        } if message.contains("already exists") => EngineError::Conflict {
            kind: "endpoint",
            name: format!("{container}@{network}"),
            reason: message,
        },
        other => map_error("network", network, "connect_network", other),
    }
}

/// Attachable bridge network, refused if the name is taken.
fn create_network_request(name: &str) -> CreateNetworkOptions<String> {
    CreateNetworkOptions {
        name: name.to_string(),
        check_duplicate: true,
        driver: "bridge".to_string(),
        attachable: true,
        ..Default::default()
    }
}

fn create_container_request(
    spec: &ContainerSpec,
) -> (CreateContainerOptions<String>, Config<String>) {
    let port_key = format!("{}/tcp", spec.container_port);

    let port_bindings = HashMap::from([(
        port_key.clone(),
        Some(vec![PortBinding {
            host_ip: Some("0.0.0.0".to_string()),
            host_port: Some(spec.host_port.to_string()),
        }]),
    )]);

    let exposed_ports: HashMap<String, HashMap<(), ()>> =
        HashMap::from([(port_key, HashMap::new())]);

    let tmpfs: HashMap<String, String> = spec
        .tmpfs
        .iter()
        .map(|m| (m.path.clone(), m.options()))
        .collect();

    let env: Vec<String> = spec
        .env
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    let host_config = HostConfig {
        port_bindings: Some(port_bindings),
        tmpfs: Some(tmpfs),
        auto_remove: Some(false),
        ..Default::default()
    };

    let networking_config = NetworkingConfig {
        endpoints_config: HashMap::from([(
            spec.network.clone(),
            EndpointSettings {
                aliases: Some(spec.aliases.clone()),
                ..Default::default()
            },
        )]),
    };

    let config = Config {
        image: Some(spec.image.clone()),
        env: if env.is_empty() { None } else { Some(env) },
        exposed_ports: Some(exposed_ports),
        host_config: Some(host_config),
        networking_config: Some(networking_config),
        ..Default::default()
    };

    let options = CreateContainerOptions {
        name: spec.name.clone(),
        ..Default::default()
    };

    (options, config)
}

/// [`ContainerEngine`] backed by a Docker daemon.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect to the local daemon via [`connect_docker`].
    pub async fn connect() -> Result<Self, EngineError> {
        Ok(Self::new(connect_docker().await?))
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn list_networks(&self) -> Result<Vec<NetworkHandle>, EngineError> {
        let networks = self
            .docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await
            .map_err(|e| map_error("network", "*", "list_networks", e))?;

        Ok(networks
            .into_iter()
            .filter(|n| n.name.is_some())
            .map(|n| network_handle(n, ""))
            .collect())
    }

    async fn create_network(&self, name: &str) -> Result<NetworkHandle, EngineError> {
        self.docker
            .create_network(create_network_request(name))
            .await
            .map_err(|e| map_error("network", name, "create_network", e))?;

        self.inspect_network(name).await
    }

    async fn inspect_network(&self, name: &str) -> Result<NetworkHandle, EngineError> {
        let network = self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
            .map_err(|e| map_error("network", name, "inspect_network", e))?;
        Ok(network_handle(network, name))
    }

    async fn remove_network(&self, name: &str) -> Result<(), EngineError> {
        self.docker
            .remove_network(name)
            .await
            .map_err(|e| map_error("network", name, "remove_network", e))
    }

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        aliases: &[String],
    ) -> Result<(), EngineError> {
        let options = ConnectNetworkOptions {
            container: container.to_string(),
            endpoint_config: EndpointSettings {
                aliases: if aliases.is_empty() {
                    None
                } else {
                    Some(aliases.to_vec())
                },
                ..Default::default()
            },
        };

        self.docker
            .connect_network(network, options)
            .await
            .map_err(|e| map_connect_error(network, container, e))
    }

    async fn disconnect_network(
        &self,
        network: &str,
        container: &str,
        force: bool,
    ) -> Result<(), EngineError> {
        let options = DisconnectNetworkOptions {
            container: container.to_string(),
            force,
        };

        self.docker
            .disconnect_network(network, options)
            .await
            .map_err(|e| map_error("network", network, "disconnect_network", e))
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerHandle, EngineError> {
        let info = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_error("container", name, "inspect_container", e))?;

        let running = info
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);

        Ok(ContainerHandle {
            id: info.id.unwrap_or_else(|| name.to_string()),
            name: info
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| name.to_string()),
            state: if running {
                ContainerState::Running
            } else {
                ContainerState::Stopped
            },
        })
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle, EngineError> {
        let (options, config) = create_container_request(spec);

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| map_error("container", &spec.name, "create_container", e))?;

        for warning in &response.warnings {
            tracing::warn!("Docker warning creating {}: {}", spec.name, warning);
        }

        Ok(ContainerHandle {
            id: response.id,
            name: spec.name.clone(),
            state: ContainerState::Stopped,
        })
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_error("container", id, "start_container", e))
    }

    async fn stop_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .stop_container(id, None::<StopContainerOptions>)
            .await
            .map_err(|e| map_error("container", id, "stop_container", e))
    }

    async fn restart_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .restart_container(id, None::<RestartContainerOptions>)
            .await
            .map_err(|e| map_error("container", id, "restart_container", e))
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| map_error("container", id, "remove_container", e))
    }
}
