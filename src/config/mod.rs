//! Harness configuration.
//!
//! A [`HarnessConfig`] is built from defaults (optionally per backend),
//! adjusted with the `with_*` builders, and then overlaid with `ITDB_*`
//! environment variables. It is immutable once handed to a
//! [`TestDatabase`](crate::TestDatabase).

mod backend;
pub mod helpers;
mod params;

use secrecy::{ExposeSecret, SecretString};

pub use backend::DatabaseBackend;
pub use helpers::{EnvLookup, process_env};
pub use params::ConnectionParameters;

use crate::config::helpers::{optional_env, parse_bool_env, parse_optional_env};
use crate::error::ConfigError;

/// Overrides the image reference.
pub const ENV_IMAGE: &str = "ITDB_IMAGE";
/// Id of the container the caller runs in (e.g. a CI job container).
pub const ENV_CURRENT_CONTAINER_ID: &str = "ITDB_CURRENT_CONTAINER_ID";

const LOOPBACK: &str = "127.0.0.1";

/// Configuration for one test database container.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Database engine inside the container.
    pub backend: DatabaseBackend,
    /// Image reference to run.
    pub image: String,
    /// Container name, also used as its network alias.
    pub container_name: String,
    /// Host port mapped to the database port.
    pub host_port: u16,
    /// Bridge network the container joins.
    pub network_name: String,
    /// Data directory inside the container, mounted as tmpfs.
    pub data_dir: String,
    /// Temporary-files directory inside the container, mounted as tmpfs.
    pub tmp_dir: String,
    /// Size cap for each tmpfs mount (Docker size syntax, e.g. `512m`).
    pub tmpfs_size: String,
    /// Container to attach to the network when running inside Docker.
    pub current_container_id: Option<String>,
    /// Whether to poll the database after starting.
    pub verify_connection: bool,
    pub db_user: String,
    pub db_password: SecretString,
    pub db_name: String,
    /// Table the sentinel query reads from.
    pub marker_table: String,
    /// Extra environment passed to the container: (name, value).
    pub env: Vec<(String, String)>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::for_backend(DatabaseBackend::default())
    }
}

impl HarnessConfig {
    /// Defaults for the given backend.
    pub fn for_backend(backend: DatabaseBackend) -> Self {
        Self {
            backend,
            image: backend.default_image().to_string(),
            container_name: format!("itdb-{backend}"),
            host_port: backend.default_host_port(),
            network_name: "itdb-network".to_string(),
            data_dir: backend.default_data_dir().to_string(),
            tmp_dir: "/tmp".to_string(),
            tmpfs_size: "512m".to_string(),
            current_container_id: None,
            verify_connection: true,
            db_user: "ituser".to_string(),
            db_password: SecretString::from("ituser"),
            db_name: "itdb".to_string(),
            marker_table: "itdb_marker".to_string(),
            env: Vec::new(),
        }
    }

    /// Defaults overlaid with values from `lookup`.
    ///
    /// `ITDB_BACKEND` is read first so the backend-specific defaults apply.
    pub fn resolve(lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let backend = match optional_env(lookup, "ITDB_BACKEND")? {
            Some(b) => b.parse().map_err(|e| ConfigError::InvalidValue {
                key: "ITDB_BACKEND".to_string(),
                message: e,
            })?,
            None => DatabaseBackend::default(),
        };
        Self::for_backend(backend).apply_env(lookup)
    }

    /// Overlay environment overrides on an existing configuration and validate.
    pub fn apply_env(mut self, lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        if let Some(image) = optional_env(lookup, ENV_IMAGE)? {
            self.image = image;
        }
        if let Some(id) = optional_env(lookup, ENV_CURRENT_CONTAINER_ID)? {
            self.current_container_id = Some(id);
        }
        if let Some(name) = optional_env(lookup, "ITDB_CONTAINER_NAME")? {
            self.container_name = name;
        }
        if let Some(network) = optional_env(lookup, "ITDB_NETWORK")? {
            self.network_name = network;
        }
        if let Some(dir) = optional_env(lookup, "ITDB_DATA_DIR")? {
            self.data_dir = dir;
        }
        if let Some(size) = optional_env(lookup, "ITDB_TMPFS_SIZE")? {
            self.tmpfs_size = size;
        }
        if let Some(user) = optional_env(lookup, "ITDB_DB_USER")? {
            self.db_user = user;
        }
        if let Some(password) = optional_env(lookup, "ITDB_DB_PASSWORD")? {
            self.db_password = SecretString::from(password);
        }
        if let Some(name) = optional_env(lookup, "ITDB_DB_NAME")? {
            self.db_name = name;
        }
        if let Some(table) = optional_env(lookup, "ITDB_MARKER_TABLE")? {
            self.marker_table = table;
        }
        self.host_port = parse_optional_env(lookup, "ITDB_PORT", self.host_port)?;
        self.verify_connection = parse_bool_env(lookup, "ITDB_VERIFY", self.verify_connection)?;

        self.validate()?;
        Ok(self)
    }

    /// Check invariants the engine and database would otherwise reject late.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("image", &self.image),
            ("container_name", &self.container_name),
            ("network_name", &self.network_name),
            ("data_dir", &self.data_dir),
            ("db_user", &self.db_user),
            ("db_name", &self.db_name),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }
        if self.host_port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "host_port".to_string(),
                message: "must be between 1 and 65535".to_string(),
            });
        }
        if !is_identifier(&self.marker_table) {
            return Err(ConfigError::InvalidValue {
                key: "marker_table".to_string(),
                message: format!(
                    "'{}' is not a plain SQL identifier ([A-Za-z_][A-Za-z0-9_]*)",
                    self.marker_table
                ),
            });
        }
        Ok(())
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = name.into();
        self
    }

    pub fn with_host_port(mut self, port: u16) -> Self {
        self.host_port = port;
        self
    }

    pub fn with_network_name(mut self, name: impl Into<String>) -> Self {
        self.network_name = name.into();
        self
    }

    pub fn with_current_container_id(mut self, id: impl Into<String>) -> Self {
        self.current_container_id = Some(id.into());
        self
    }

    pub fn with_verify_connection(mut self, verify: bool) -> Self {
        self.verify_connection = verify;
        self
    }

    pub fn with_credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.db_user = user.into();
        self.db_password = SecretString::from(password.into());
        self
    }

    pub fn with_database(mut self, name: impl Into<String>) -> Self {
        self.db_name = name.into();
        self
    }

    pub fn with_marker_table(mut self, table: impl Into<String>) -> Self {
        self.marker_table = table.into();
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }

    /// Whether the caller reaches the database over the shared network
    /// rather than through the host port mapping.
    pub fn runs_inside_network(&self) -> bool {
        self.current_container_id.is_some()
    }

    /// Derive connection parameters. Pure; performs no I/O.
    pub fn connection_parameters(&self) -> ConnectionParameters {
        let (host, port) = if self.runs_inside_network() {
            (self.container_name.clone(), self.backend.internal_port())
        } else {
            (LOOPBACK.to_string(), self.host_port)
        };
        ConnectionParameters {
            host,
            port,
            user: self.db_user.clone(),
            password: self.db_password.expose_secret().to_string(),
            database: self.db_name.clone(),
        }
    }

    /// Query that must return exactly one row once the database is ready.
    pub fn sentinel_query(&self) -> String {
        format!("SELECT id FROM {} LIMIT 1", self.marker_table)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
