//! Test doubles for the container engine and the database probe.
//!
//! Provides:
//! - [`FakeEngine`]: an in-memory [`ContainerEngine`] with an operation log,
//!   sticky failure injection and simulated creation races
//! - [`ScriptedProbe`]: a [`ReadinessProbe`] that fails a set number of
//!   times (or forever) before succeeding
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use itdb::HarnessConfig;
//! use itdb::lifecycle::TestDatabase;
//! use itdb::testing::{FakeEngine, ScriptedProbe};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_something() {
//!     let engine = Arc::new(FakeEngine::new());
//!     let probe = Arc::new(ScriptedProbe::succeed_after(2));
//!     let db = TestDatabase::new(HarnessConfig::default(), engine.clone(), probe);
//!     assert!(db.start().await.unwrap().is_some());
//! }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::config::ConnectionParameters;
use crate::engine::{ContainerEngine, ContainerHandle, ContainerSpec, ContainerState, NetworkHandle};
use crate::error::{EngineError, ProbeError};
use crate::verify::ReadinessProbe;

#[derive(Default)]
struct FakeState {
    networks: HashMap<String, NetworkHandle>,
    containers: HashMap<String, ContainerHandle>,
    specs: HashMap<String, ContainerSpec>,
    /// (network, container) pairs.
    endpoints: BTreeSet<(String, String)>,
    operations: Vec<String>,
    failures: HashMap<&'static str, EngineError>,
    race_network: bool,
    race_container: bool,
    next_id: u32,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn injected(&self, operation: &'static str) -> Result<(), EngineError> {
        match self.failures.get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Containers are addressable by id or by name, like Docker.
    fn container_name(&self, id_or_name: &str) -> Option<String> {
        if self.containers.contains_key(id_or_name) {
            return Some(id_or_name.to_string());
        }
        self.containers
            .values()
            .find(|c| c.id == id_or_name)
            .map(|c| c.name.clone())
    }

    fn missing_container(id_or_name: &str) -> EngineError {
        EngineError::NotFound {
            kind: "container",
            name: id_or_name.to_string(),
        }
    }

    fn missing_network(name: &str) -> EngineError {
        EngineError::NotFound {
            kind: "network",
            name: name.to_string(),
        }
    }

    fn insert_network(&mut self, name: &str) -> NetworkHandle {
        let handle = NetworkHandle {
            id: self.next_id("net"),
            name: name.to_string(),
        };
        self.networks.insert(name.to_string(), handle.clone());
        handle
    }

    fn insert_container(&mut self, spec: &ContainerSpec) -> ContainerHandle {
        let handle = ContainerHandle {
            id: self.next_id("ctr"),
            name: spec.name.clone(),
            state: ContainerState::Stopped,
        };
        self.containers.insert(spec.name.clone(), handle.clone());
        self.specs.insert(spec.name.clone(), spec.clone());
        self.endpoints.insert((spec.network.clone(), spec.name.clone()));
        handle
    }
}

/// In-memory container engine.
///
/// Mimics the Docker behaviours the harness depends on: 404 for absent
/// objects, 409 for duplicate names and endpoints, 304 when starting a
/// running or stopping a stopped container, and refusing to remove a
/// network that still has endpoints.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake engine state poisoned")
    }

    /// Make every call to `operation` fail with `err` until cleared.
    pub fn fail(&self, operation: &'static str, err: EngineError) {
        self.lock().failures.insert(operation, err);
    }

    pub fn clear_failure(&self, operation: &'static str) {
        self.lock().failures.remove(operation);
    }

    /// Next `create_network` behaves as if another process created the
    /// network first: the network appears and the call reports a conflict.
    pub fn race_network_creation(&self) {
        self.lock().race_network = true;
    }

    /// Same as [`race_network_creation`](Self::race_network_creation) for
    /// `create_container`.
    pub fn race_container_creation(&self) {
        self.lock().race_container = true;
    }

    pub fn seed_network(&self, name: &str) -> NetworkHandle {
        self.lock().insert_network(name)
    }

    pub fn seed_container(&self, name: &str, state: ContainerState) -> ContainerHandle {
        let mut guard = self.lock();
        let id = guard.next_id("ctr");
        let handle = ContainerHandle {
            id,
            name: name.to_string(),
            state,
        };
        guard.containers.insert(name.to_string(), handle.clone());
        handle
    }

    /// Every call made, as `operation:args` strings, in order.
    pub fn operations(&self) -> Vec<String> {
        self.lock().operations.clone()
    }

    /// Number of calls to `operation`.
    pub fn count(&self, operation: &str) -> usize {
        self.lock()
            .operations
            .iter()
            .filter(|entry| entry.split(':').next() == Some(operation))
            .count()
    }

    pub fn network(&self, name: &str) -> Option<NetworkHandle> {
        self.lock().networks.get(name).cloned()
    }

    pub fn networks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().networks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn container(&self, name: &str) -> Option<ContainerHandle> {
        self.lock().containers.get(name).cloned()
    }

    /// Spec the named container was created with, if the fake created it.
    pub fn container_spec(&self, name: &str) -> Option<ContainerSpec> {
        self.lock().specs.get(name).cloned()
    }

    /// Containers connected to `network`, sorted.
    pub fn endpoints(&self, network: &str) -> Vec<String> {
        self.lock()
            .endpoints
            .iter()
            .filter(|(n, _)| n == network)
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn begin(
        &self,
        operation: &'static str,
        args: &[&str],
    ) -> Result<MutexGuard<'_, FakeState>, EngineError> {
        let mut guard = self.lock();
        let mut entry = operation.to_string();
        for arg in args {
            entry.push(':');
            entry.push_str(arg);
        }
        guard.operations.push(entry);
        guard.injected(operation)?;
        Ok(guard)
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn list_networks(&self) -> Result<Vec<NetworkHandle>, EngineError> {
        let state = self.begin("list_networks", &[])?;
        let mut networks: Vec<NetworkHandle> = state.networks.values().cloned().collect();
        networks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(networks)
    }

    async fn create_network(&self, name: &str) -> Result<NetworkHandle, EngineError> {
        let mut state = self.begin("create_network", &[name])?;
        if std::mem::take(&mut state.race_network) {
            state.insert_network(name);
        }
        if state.networks.contains_key(name) {
            return Err(EngineError::Conflict {
                kind: "network",
                name: name.to_string(),
                reason: "network with name already exists".to_string(),
            });
        }
        Ok(state.insert_network(name))
    }

    async fn inspect_network(&self, name: &str) -> Result<NetworkHandle, EngineError> {
        let state = self.begin("inspect_network", &[name])?;
        state
            .networks
            .get(name)
            .cloned()
            .ok_or_else(|| FakeState::missing_network(name))
    }

    async fn remove_network(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.begin("remove_network", &[name])?;
        if !state.networks.contains_key(name) {
            return Err(FakeState::missing_network(name));
        }
        if state.endpoints.iter().any(|(n, _)| n == name) {
            return Err(EngineError::Api {
                operation: "remove_network".to_string(),
                reason: format!("network {name} has active endpoints"),
            });
        }
        state.networks.remove(name);
        Ok(())
    }

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        _aliases: &[String],
    ) -> Result<(), EngineError> {
        let mut state = self.begin("connect_network", &[network, container])?;
        if !state.networks.contains_key(network) {
            return Err(FakeState::missing_network(network));
        }
        let endpoint = (network.to_string(), container.to_string());
        if state.endpoints.contains(&endpoint) {
            return Err(EngineError::Conflict {
                kind: "endpoint",
                name: format!("{container}@{network}"),
                reason: "endpoint already exists in network".to_string(),
            });
        }
        state.endpoints.insert(endpoint);
        Ok(())
    }

    async fn disconnect_network(
        &self,
        network: &str,
        container: &str,
        force: bool,
    ) -> Result<(), EngineError> {
        let mode = if force { "force" } else { "graceful" };
        let mut state = self.begin("disconnect_network", &[network, container, mode])?;
        if !state
            .endpoints
            .remove(&(network.to_string(), container.to_string()))
        {
            return Err(EngineError::NotFound {
                kind: "endpoint",
                name: format!("{container}@{network}"),
            });
        }
        Ok(())
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerHandle, EngineError> {
        let state = self.begin("inspect_container", &[name])?;
        state
            .container_name(name)
            .and_then(|n| state.containers.get(&n).cloned())
            .ok_or_else(|| FakeState::missing_container(name))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle, EngineError> {
        let mut state = self.begin("create_container", &[&spec.name])?;
        if !state.networks.contains_key(&spec.network) {
            return Err(FakeState::missing_network(&spec.network));
        }
        if std::mem::take(&mut state.race_container) {
            state.insert_container(spec);
        }
        if state.containers.contains_key(&spec.name) {
            return Err(EngineError::Conflict {
                kind: "container",
                name: spec.name.clone(),
                reason: "container name already in use".to_string(),
            });
        }
        Ok(state.insert_container(spec))
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.begin("start_container", &[id])?;
        let name = state
            .container_name(id)
            .ok_or_else(|| FakeState::missing_container(id))?;
        let Some(container) = state.containers.get_mut(&name) else {
            return Err(FakeState::missing_container(id));
        };
        if container.is_running() {
            return Err(EngineError::NotModified {
                kind: "container",
                name,
            });
        }
        container.state = ContainerState::Running;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.begin("stop_container", &[id])?;
        let name = state
            .container_name(id)
            .ok_or_else(|| FakeState::missing_container(id))?;
        let Some(container) = state.containers.get_mut(&name) else {
            return Err(FakeState::missing_container(id));
        };
        if !container.is_running() {
            return Err(EngineError::NotModified {
                kind: "container",
                name,
            });
        }
        container.state = ContainerState::Stopped;
        Ok(())
    }

    async fn restart_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.begin("restart_container", &[id])?;
        let name = state
            .container_name(id)
            .ok_or_else(|| FakeState::missing_container(id))?;
        if let Some(container) = state.containers.get_mut(&name) {
            container.state = ContainerState::Running;
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let mut state = self.begin("remove_container", &[id])?;
        let name = state
            .container_name(id)
            .ok_or_else(|| FakeState::missing_container(id))?;
        let running = state.containers.get(&name).is_some_and(|c| c.is_running());
        if running && !force {
            return Err(EngineError::Conflict {
                kind: "container",
                name,
                reason: "cannot remove a running container without force".to_string(),
            });
        }
        state.containers.remove(&name);
        state.endpoints.retain(|(_, c)| c != &name);
        Ok(())
    }
}

/// A readiness probe with scripted results.
///
/// Use this in tests instead of a real database connection.
pub struct ScriptedProbe {
    remaining_failures: AtomicU32,
    always_fail: AtomicBool,
    call_count: AtomicU32,
    queries: Mutex<Vec<String>>,
    last_params: Mutex<Option<ConnectionParameters>>,
}

impl ScriptedProbe {
    /// Fail the first `failures` attempts, then succeed.
    pub fn succeed_after(failures: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            always_fail: AtomicBool::new(false),
            call_count: AtomicU32::new(0),
            queries: Mutex::new(Vec::new()),
            last_params: Mutex::new(None),
        }
    }

    /// Never succeed.
    pub fn always_fail() -> Self {
        let probe = Self::succeed_after(0);
        probe.set_failing(true);
        probe
    }

    /// Toggle permanent failure at runtime.
    pub fn set_failing(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of probe attempts so far.
    pub fn calls(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Queries received, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("probe queries poisoned").clone()
    }

    /// Parameters of the latest attempt.
    pub fn last_params(&self) -> Option<ConnectionParameters> {
        self.last_params.lock().expect("probe params poisoned").clone()
    }
}

#[async_trait]
impl ReadinessProbe for ScriptedProbe {
    async fn probe(&self, params: &ConnectionParameters, query: &str) -> Result<(), ProbeError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .expect("probe queries poisoned")
            .push(query.to_string());
        *self.last_params.lock().expect("probe params poisoned") = Some(params.clone());

        let scripted_failure = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if self.always_fail.load(Ordering::SeqCst) || scripted_failure {
            return Err(ProbeError::Connect {
                host: params.host.clone(),
                port: params.port,
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}
