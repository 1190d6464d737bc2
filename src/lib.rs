//! Ephemeral database containers for integration tests.
//!
//! `itdb` ensures a bridge network, creates (or reuses) a named database
//! container on it with memory-backed storage, waits until the database
//! answers a sentinel query, and hands back connection parameters. Tearing
//! down is best effort and never fails.
//!
//! The container runtime and database driver sit behind the
//! [`ContainerEngine`](engine::ContainerEngine) and
//! [`ReadinessProbe`](verify::ReadinessProbe) traits, injected per
//! [`TestDatabase`].

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod testing;
pub mod verify;

pub use config::{ConnectionParameters, DatabaseBackend, HarnessConfig};
pub use error::{ConfigError, EngineError, HarnessError, ProbeError, Result};
pub use lifecycle::{StopReport, TestDatabase};
pub use verify::{BackoffSchedule, VerifyOutcome, VerifyReport};
