//! Find-or-create for the harness bridge network.

use std::sync::Arc;

use crate::engine::{ContainerEngine, NetworkHandle};
use crate::error::EngineError;

pub struct NetworkManager {
    engine: Arc<dyn ContainerEngine>,
}

impl NetworkManager {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Return the network called `name`, creating it if it does not exist.
    ///
    /// A failed listing counts as "not found". If creation loses a race to
    /// another process, the winner's network is fetched and returned.
    pub async fn ensure_network(&self, name: &str) -> Result<NetworkHandle, EngineError> {
        if let Some(existing) = self.find(name).await {
            tracing::debug!("Reusing network {} ({})", existing.name, existing.id);
            return Ok(existing);
        }

        match self.engine.create_network(name).await {
            Ok(created) => {
                tracing::info!("Created network {} ({})", created.name, created.id);
                Ok(created)
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!("Network {} appeared concurrently, fetching it", name);
                self.engine.inspect_network(name).await
            }
            Err(e) => Err(e),
        }
    }

    async fn find(&self, name: &str) -> Option<NetworkHandle> {
        match self.engine.list_networks().await {
            Ok(networks) => networks.into_iter().find(|n| n.name == name),
            Err(e) => {
                tracing::debug!("Listing networks failed, assuming {} is absent: {}", name, e);
                None
            }
        }
    }

    pub async fn remove_network(&self, name: &str) -> Result<(), EngineError> {
        self.engine.remove_network(name).await
    }
}
