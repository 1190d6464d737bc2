//! The lifecycle facade tying network, container and verifier together.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::{ConnectionParameters, HarnessConfig};
use crate::engine::{ContainerEngine, DockerEngine};
use crate::error::{EngineError, HarnessError, Result};
use crate::lifecycle::container::ContainerManager;
use crate::lifecycle::network::NetworkManager;
use crate::verify::{BackoffSchedule, ConnectivityVerifier, ReadinessProbe, VerifyReport, probe_for};

/// A cleanup step that can fail during [`TestDatabase::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStep {
    InspectContainer,
    StopContainer,
    RemoveContainer,
    DetachExternal,
    RemoveNetwork,
}

/// An error swallowed during cleanup.
#[derive(Debug, Clone)]
pub struct CleanupFailure {
    pub step: CleanupStep,
    pub error: EngineError,
}

/// What [`TestDatabase::stop`] did.
#[derive(Debug, Clone, Default)]
pub struct StopReport {
    /// Whether a container with the configured name existed.
    pub container_found: bool,
    /// Every error that was logged and swallowed, in order.
    pub failures: Vec<CleanupFailure>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, step: CleanupStep, result: std::result::Result<(), EngineError>) {
        if let Err(error) = result {
            tracing::warn!("Cleanup step {:?} failed: {}", step, error);
            self.failures.push(CleanupFailure { step, error });
        }
    }
}

/// An ephemeral database container for one test run.
///
/// `start` brings up the network and container and waits until the database
/// answers; `stop` removes everything again and never fails.
pub struct TestDatabase {
    config: HarnessConfig,
    networks: NetworkManager,
    containers: ContainerManager,
    verifier: ConnectivityVerifier,
    last_verification: RwLock<Option<VerifyReport>>,
}

impl TestDatabase {
    /// Create a manager over explicit engine and probe clients.
    pub fn new(
        config: HarnessConfig,
        engine: Arc<dyn ContainerEngine>,
        probe: Arc<dyn ReadinessProbe>,
    ) -> Self {
        Self {
            config,
            networks: NetworkManager::new(engine.clone()),
            containers: ContainerManager::new(engine),
            verifier: ConnectivityVerifier::new(probe),
            last_verification: RwLock::new(None),
        }
    }

    /// Validate `config`, connect to the local Docker daemon and pick the
    /// probe for the configured backend.
    pub async fn connect(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let probe = probe_for(config.backend)?;
        let engine = DockerEngine::connect()
            .await
            .map_err(|e| HarnessError::DockerNotAvailable {
                reason: e.to_string(),
            })?;
        Ok(Self::new(config, Arc::new(engine), probe))
    }

    pub fn with_backoff(mut self, schedule: BackoffSchedule) -> Self {
        self.verifier = self.verifier.with_schedule(schedule);
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Connection parameters for the configured container. No I/O.
    pub fn connection_parameters(&self) -> ConnectionParameters {
        self.config.connection_parameters()
    }

    /// Report from the most recent verification, if any ran.
    pub async fn last_verification(&self) -> Option<VerifyReport> {
        self.last_verification.read().await.clone()
    }

    /// Bring the database up and wait until it answers.
    ///
    /// Returns `Ok(None)` if the database never became ready; everything has
    /// been torn down by then. Network or container provisioning failures
    /// are returned as errors.
    pub async fn start(&self) -> Result<Option<ConnectionParameters>> {
        let config = &self.config;
        tracing::info!(
            "Starting test database {} ({})",
            config.container_name,
            config.image
        );

        let network = self
            .networks
            .ensure_network(&config.network_name)
            .await
            .map_err(|source| HarnessError::NetworkCreationFailed {
                name: config.network_name.clone(),
                source,
            })?;
        tracing::debug!("Using network {} ({})", network.name, network.id);

        let container = self.containers.ensure_container(config).await?;
        self.containers.start(&container).await?;

        if let Err(e) = self.containers.attach_external(config).await {
            // Verification from inside the network will fail and tear down.
            tracing::warn!(
                "Could not attach current container to {}: {}",
                config.network_name,
                e
            );
        }

        Ok(self.verify_or_teardown().await)
    }

    /// Restart the container and re-verify, or run [`start`](Self::start)
    /// if there is no container to restart.
    pub async fn restart(&self) -> Result<Option<ConnectionParameters>> {
        let container = match self.containers.find(&self.config.container_name).await {
            Ok(Some(container)) => container,
            Ok(None) => {
                tracing::info!(
                    "No container {} to restart, starting fresh",
                    self.config.container_name
                );
                return self.start().await;
            }
            Err(e) => {
                tracing::debug!(
                    "Inspecting {} failed, starting fresh: {}",
                    self.config.container_name,
                    e
                );
                return self.start().await;
            }
        };

        if let Err(e) = self.containers.restart(&container).await {
            tracing::warn!("Failed to restart {}: {}", container.name, e);
            return Ok(None);
        }

        Ok(self.verify_or_teardown().await)
    }

    /// Remove the container, detach the current container and remove the
    /// network. Best effort: failures are logged and collected, never
    /// returned. Without a container this does nothing.
    pub async fn stop(&self) -> StopReport {
        let config = &self.config;
        let mut report = StopReport::default();

        let container = match self.containers.find(&config.container_name).await {
            Ok(Some(container)) => container,
            Ok(None) => {
                tracing::debug!("No container {} to stop", config.container_name);
                return report;
            }
            Err(e) => {
                report.record(CleanupStep::InspectContainer, Err(e));
                return report;
            }
        };
        report.container_found = true;

        tracing::info!("Stopping test database {}", container.name);
        report.record(
            CleanupStep::StopContainer,
            self.containers.stop(&container).await,
        );
        report.record(
            CleanupStep::RemoveContainer,
            self.containers.remove(&container).await,
        );
        report.record(
            CleanupStep::DetachExternal,
            self.containers.detach_external(config).await,
        );
        report.record(
            CleanupStep::RemoveNetwork,
            self.networks.remove_network(&config.network_name).await,
        );

        if report.is_clean() {
            tracing::info!("Removed {} and {}", container.name, config.network_name);
        }
        report
    }

    /// Verify connectivity; on failure tear everything down once.
    async fn verify_or_teardown(&self) -> Option<ConnectionParameters> {
        let params = self.connection_parameters();

        let report = if self.config.verify_connection {
            self.verifier
                .verify(&params, &self.config.sentinel_query())
                .await
        } else {
            tracing::debug!("Connection verification disabled");
            VerifyReport::skipped()
        };

        let ready = report.succeeded();
        *self.last_verification.write().await = Some(report);

        if ready {
            return Some(params);
        }

        tracing::warn!(
            "Tearing down {} after failed verification",
            self.config.container_name
        );
        self.stop().await;
        None
    }
}
