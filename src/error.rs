//! Error types for the test database harness.

use std::time::Duration;

use thiserror::Error;

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set but could not be read (e.g. not unicode).
    #[error("Failed to read environment variable {key}: {message}")]
    EnvRead { key: String, message: String },

    /// A value failed to parse or validate.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors reported by a container engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine could not be reached at all.
    #[error("Container engine unavailable: {reason}")]
    Unavailable { reason: String },

    /// The named object does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// The object already exists or is already in the requested state.
    #[error("{kind} '{name}' conflicts with an existing object: {reason}")]
    Conflict {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// The request was a no-op (e.g. starting a running container).
    #[error("{kind} '{name}' was not modified")]
    NotModified { kind: &'static str, name: String },

    /// Any other engine API failure.
    #[error("Container engine call '{operation}' failed: {reason}")]
    Api { operation: String, reason: String },
}

impl EngineError {
    /// True when the error means the object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }

    /// True when the error means the object already exists.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }
}

/// A failed readiness probe attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// Could not open a connection.
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    /// Connected, but the sentinel query failed.
    #[error("Sentinel query failed: {reason}")]
    Query { reason: String },

    /// The sentinel query returned the wrong number of rows.
    #[error("Sentinel query returned {actual} rows, expected {expected}")]
    RowCount { expected: usize, actual: usize },
}

/// Errors surfaced by the lifecycle facade.
///
/// Only provisioning failures reach the caller; connectivity and cleanup
/// failures are reported through return values and logs instead.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Docker is not available.
    #[error("Docker not available: {reason}")]
    DockerNotAvailable { reason: String },

    /// Failed to create the network.
    #[error("Failed to create network '{name}': {source}")]
    NetworkCreationFailed {
        name: String,
        #[source]
        source: EngineError,
    },

    /// Failed to create the container.
    #[error("Failed to create container '{name}': {source}")]
    ContainerCreationFailed {
        name: String,
        #[source]
        source: EngineError,
    },

    /// Failed to start the container.
    #[error("Failed to start container '{name}': {source}")]
    ContainerStartFailed {
        name: String,
        #[source]
        source: EngineError,
    },

    /// The database never answered the sentinel query.
    #[error("Database not ready after {attempts} attempts ({elapsed:?}): {last_error}")]
    NotReady {
        attempts: u32,
        elapsed: Duration,
        last_error: ProbeError,
    },
}
