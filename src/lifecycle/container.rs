//! Database container lifecycle: find-or-create, start, attach, restart.

use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::config::HarnessConfig;
use crate::engine::{ContainerEngine, ContainerHandle, ContainerSpec, TmpfsMount};
use crate::error::{EngineError, HarnessError};

/// Build the creation spec for the configured database container.
///
/// The backend's credential variables come first; explicitly configured
/// `env` pairs follow and win on duplicate names.
pub fn container_spec(config: &HarnessConfig) -> ContainerSpec {
    let mut env = config.backend.credential_env(
        &config.db_user,
        config.db_password.expose_secret(),
        &config.db_name,
    );
    env.extend(config.env.iter().cloned());

    ContainerSpec {
        name: config.container_name.clone(),
        image: config.image.clone(),
        container_port: config.backend.internal_port(),
        host_port: config.host_port,
        env,
        tmpfs: vec![
            TmpfsMount {
                path: config.data_dir.clone(),
                size: config.tmpfs_size.clone(),
            },
            TmpfsMount {
                path: config.tmp_dir.clone(),
                size: config.tmpfs_size.clone(),
            },
        ],
        network: config.network_name.clone(),
        aliases: vec![config.container_name.clone()],
    }
}

pub struct ContainerManager {
    engine: Arc<dyn ContainerEngine>,
}

impl ContainerManager {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Look a container up by name; absence is `Ok(None)`.
    pub async fn find(&self, name: &str) -> Result<Option<ContainerHandle>, EngineError> {
        match self.engine.inspect_container(name).await {
            Ok(handle) => Ok(Some(handle)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Return the configured container, creating it if it does not exist.
    pub async fn ensure_container(
        &self,
        config: &HarnessConfig,
    ) -> Result<ContainerHandle, HarnessError> {
        let name = &config.container_name;

        match self.find(name).await {
            Ok(Some(existing)) => {
                tracing::debug!(
                    "Reusing container {} ({}, {:?})",
                    existing.name,
                    existing.id,
                    existing.state
                );
                return Ok(existing);
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("Inspecting {} failed, creating it: {}", name, e),
        }

        let spec = container_spec(config);
        match self.engine.create_container(&spec).await {
            Ok(created) => {
                tracing::info!("Created container {} from {}", created.name, spec.image);
                Ok(created)
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!("Container {} appeared concurrently, fetching it", name);
                self.engine
                    .inspect_container(name)
                    .await
                    .map_err(|source| HarnessError::ContainerCreationFailed {
                        name: name.clone(),
                        source,
                    })
            }
            Err(source) => Err(HarnessError::ContainerCreationFailed {
                name: name.clone(),
                source,
            }),
        }
    }

    /// Start the container unless it is already running.
    pub async fn start(&self, container: &ContainerHandle) -> Result<(), HarnessError> {
        if container.is_running() {
            tracing::debug!("Container {} already running", container.name);
            return Ok(());
        }

        match self.engine.start_container(&container.id).await {
            Ok(()) | Err(EngineError::NotModified { .. }) => {
                tracing::info!("Started container {}", container.name);
                Ok(())
            }
            Err(source) => Err(HarnessError::ContainerStartFailed {
                name: container.name.clone(),
                source,
            }),
        }
    }

    pub async fn restart(&self, container: &ContainerHandle) -> Result<(), EngineError> {
        self.engine.restart_container(&container.id).await?;
        tracing::info!("Restarted container {}", container.name);
        Ok(())
    }

    /// Connect the caller's own container to the harness network.
    ///
    /// No-op without a configured container id. Already being connected
    /// counts as success.
    pub async fn attach_external(&self, config: &HarnessConfig) -> Result<(), EngineError> {
        let Some(ref id) = config.current_container_id else {
            return Ok(());
        };

        match self
            .engine
            .connect_network(&config.network_name, id, &[])
            .await
        {
            Ok(()) => {
                tracing::info!("Attached container {} to {}", id, config.network_name);
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!("Container {} already on {}", id, config.network_name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Force-disconnect the caller's container from the harness network.
    pub async fn detach_external(&self, config: &HarnessConfig) -> Result<(), EngineError> {
        let Some(ref id) = config.current_container_id else {
            return Ok(());
        };

        self.engine
            .disconnect_network(&config.network_name, id, true)
            .await?;
        tracing::info!("Detached container {} from {}", id, config.network_name);
        Ok(())
    }

    pub async fn stop(&self, container: &ContainerHandle) -> Result<(), EngineError> {
        match self.engine.stop_container(&container.id).await {
            Ok(()) | Err(EngineError::NotModified { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn remove(&self, container: &ContainerHandle) -> Result<(), EngineError> {
        self.engine.remove_container(&container.id, true).await
    }
}
