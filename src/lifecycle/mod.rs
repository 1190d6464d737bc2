//! Test database lifecycle management.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                             TestDatabase                                  │
//! │                                                                           │
//! │   start()                                                                 │
//! │      │                                                                    │
//! │      ▼                                                                    │
//! │   ┌──────────────┐     ┌──────────────────┐     ┌──────────────────────┐  │
//! │   │ Ensure       │────▶│ Ensure & Start   │────▶│ Attach Current       │  │
//! │   │ Network      │     │ Container        │     │ Container (optional) │  │
//! │   └──────────────┘     └──────────────────┘     └──────────────────────┘  │
//! │                                                            │              │
//! │                                                            ▼              │
//! │                        ┌──────────────────┐     ┌──────────────────────┐  │
//! │                        │ Stop & Remove    │◀────│ Verify Connectivity  │  │
//! │                        │ (on exhaustion)  │     │ (backoff, 10 tries)  │  │
//! │                        └──────────────────┘     └──────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use itdb::{HarnessConfig, TestDatabase};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarnessConfig::default()
//!     .with_database("nursebuddy")
//!     .with_host_port(3806)
//!     .apply_env(&itdb::config::process_env)?;
//!
//! let db = TestDatabase::connect(config).await?;
//!
//! match db.start().await? {
//!     Some(params) => println!("Database ready at {}", params),
//!     None => eprintln!("Database never became ready"),
//! }
//!
//! db.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod container;
pub mod manager;
pub mod network;

pub use container::{ContainerManager, container_spec};
pub use manager::{CleanupFailure, CleanupStep, StopReport, TestDatabase};
pub use network::NetworkManager;
