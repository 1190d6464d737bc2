use serde::{Deserialize, Serialize};

/// Which database engine the container runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    /// MySQL, probed with `mysql_async` (default).
    #[default]
    MySql,
    /// PostgreSQL, probed with `tokio-postgres`.
    Postgres,
}

impl DatabaseBackend {
    /// Port the database listens on inside the container.
    pub fn internal_port(&self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::Postgres => 5432,
        }
    }

    /// Host port used when none is configured.
    pub fn default_host_port(&self) -> u16 {
        match self {
            Self::MySql => 3806,
            Self::Postgres => 5932,
        }
    }

    pub fn default_image(&self) -> &'static str {
        match self {
            Self::MySql => "mysql:8.0",
            Self::Postgres => "postgres:16",
        }
    }

    /// Directory the image keeps its data files in.
    pub fn default_data_dir(&self) -> &'static str {
        match self {
            Self::MySql => "/var/lib/mysql",
            Self::Postgres => "/var/lib/postgresql/data",
        }
    }

    /// Variables the official image reads to create the user and database.
    pub fn credential_env(
        &self,
        user: &str,
        password: &str,
        database: &str,
    ) -> Vec<(String, String)> {
        let pairs = match self {
            Self::MySql => [
                ("MYSQL_USER", user),
                ("MYSQL_PASSWORD", password),
                ("MYSQL_DATABASE", database),
                ("MYSQL_RANDOM_ROOT_PASSWORD", "yes"),
            ],
            Self::Postgres => [
                ("POSTGRES_USER", user),
                ("POSTGRES_PASSWORD", password),
                ("POSTGRES_DB", database),
                ("PGDATA", self.default_data_dir()),
            ],
        };
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl std::fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MySql => write!(f, "mysql"),
            Self::Postgres => write!(f, "postgres"),
        }
    }
}

impl std::str::FromStr for DatabaseBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            _ => Err(format!(
                "invalid database backend '{}', expected 'mysql' or 'postgres'",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse_aliases() {
        assert_eq!("MySQL".parse::<DatabaseBackend>(), Ok(DatabaseBackend::MySql));
        assert_eq!("pg".parse::<DatabaseBackend>(), Ok(DatabaseBackend::Postgres));
        assert!("oracle".parse::<DatabaseBackend>().is_err());
    }

    #[test]
    fn test_credential_env() {
        let env = DatabaseBackend::Postgres.credential_env("ituser", "secret", "itdb");
        assert!(env.contains(&("POSTGRES_DB".to_string(), "itdb".to_string())));
        assert!(env.contains(&("POSTGRES_PASSWORD".to_string(), "secret".to_string())));

        let env = DatabaseBackend::MySql.credential_env("ituser", "secret", "itdb");
        assert_eq!(env[0], ("MYSQL_USER".to_string(), "ituser".to_string()));
    }

    #[test]
    fn test_backend_display_round_trips() {
        for backend in [DatabaseBackend::MySql, DatabaseBackend::Postgres] {
            assert_eq!(backend.to_string().parse::<DatabaseBackend>(), Ok(backend));
        }
    }
}
