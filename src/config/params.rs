use std::borrow::Cow;

use serde::Serialize;
use shell_escape::unix::escape;

/// Where and how to reach the test database.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionParameters {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl ConnectionParameters {
    /// Render as `KEY=value` lines, values quoted for `eval` in a POSIX shell.
    pub fn to_env_lines(&self, prefix: &str) -> String {
        let port = self.port.to_string();
        [
            ("HOST", self.host.as_str()),
            ("PORT", port.as_str()),
            ("USER", self.user.as_str()),
            ("PASSWORD", self.password.as_str()),
            ("NAME", self.database.as_str()),
        ]
        .into_iter()
        .map(|(key, value)| format!("{prefix}{key}={}\n", escape(Cow::Borrowed(value))))
        .collect()
    }
}

impl std::fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .finish()
    }
}

impl std::fmt::Display for ConnectionParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConnectionParameters {
        ConnectionParameters {
            host: "127.0.0.1".to_string(),
            port: 3806,
            user: "ituser".to_string(),
            password: "hunter2".to_string(),
            database: "nursebuddy".to_string(),
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_env_lines() {
        let lines = sample().to_env_lines("DB_");
        assert!(lines.contains("DB_HOST=127.0.0.1\n"));
        assert!(lines.contains("DB_PORT=3806\n"));
        assert!(lines.contains("DB_NAME=nursebuddy\n"));
    }

    #[test]
    fn test_env_lines_quote_shell_metacharacters() {
        let params = crate::config::HarnessConfig::default()
            .with_credentials("ituser", "p w$(id)")
            .connection_parameters();

        let lines = params.to_env_lines("DB_");

        assert!(lines.contains("DB_USER=ituser\n"));
        assert!(lines.contains("DB_PASSWORD='p w$(id)'\n"), "{lines}");
    }

    #[test]
    fn test_env_lines_escape_single_quotes() {
        let params = ConnectionParameters {
            password: "it's".to_string(),
            ..sample()
        };
        assert!(params.to_env_lines("DB_").contains("DB_PASSWORD='it'\\''s'\n"));
    }

    #[test]
    fn test_display() {
        assert_eq!(sample().to_string(), "ituser@127.0.0.1:3806/nursebuddy");
    }
}
