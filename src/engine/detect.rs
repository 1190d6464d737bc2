//! Why the Docker daemon could not be reached.
//!
//! `itdb doctor` and failed connects use this to say whether the `docker`
//! CLI is missing, the daemon is down, or `DOCKER_HOST` points nowhere.

use std::fmt;
use std::path::Path;

use crate::engine::connect_docker;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerStatus {
    /// A daemon answered a ping.
    Available,
    /// No daemon answered and no `docker` executable is on `PATH`.
    NotInstalled,
    /// The CLI is installed but no daemon answered.
    NotRunning,
}

impl fmt::Display for DockerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DockerStatus::Available => "available",
            DockerStatus::NotInstalled => "not installed",
            DockerStatus::NotRunning => "not running",
        })
    }
}

/// Outcome of [`check_docker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerDetection {
    pub status: DockerStatus,
    /// Last connection error, when the daemon was unreachable.
    pub reason: Option<String>,
    /// `DOCKER_HOST`, when set.
    pub docker_host: Option<String>,
}

impl DockerDetection {
    fn classify(
        connected: Result<(), EngineError>,
        cli_installed: bool,
        docker_host: Option<String>,
    ) -> Self {
        let (status, reason) = match connected {
            Ok(()) => (DockerStatus::Available, None),
            Err(e) if cli_installed => (DockerStatus::NotRunning, Some(e.to_string())),
            Err(e) => (DockerStatus::NotInstalled, Some(e.to_string())),
        };
        Self {
            status,
            reason,
            docker_host,
        }
    }

    /// What to try next, if Docker is unusable.
    pub fn hint(&self) -> Option<String> {
        match (self.status, &self.docker_host) {
            (DockerStatus::Available, _) => None,
            (_, Some(host)) => Some(format!(
                "DOCKER_HOST is {host}; check that a daemon listens there or unset it"
            )),
            (DockerStatus::NotRunning, None) => Some(
                "Start the Docker daemon, or set DOCKER_HOST if it uses a non-default socket"
                    .to_string(),
            ),
            (DockerStatus::NotInstalled, None) => Some(
                "Install Docker (https://docs.docker.com/get-docker/) or set DOCKER_HOST \
                 to a remote daemon"
                    .to_string(),
            ),
        }
    }
}

/// Ping the daemon the harness would use and classify any failure.
pub async fn check_docker() -> DockerDetection {
    let docker_host = std::env::var("DOCKER_HOST")
        .ok()
        .filter(|host| !host.is_empty());
    let connected = connect_docker().await.map(|_| ());
    DockerDetection::classify(connected, docker_cli_on_path(), docker_host)
}

fn docker_cli_on_path() -> bool {
    let executable = if cfg!(windows) { "docker.exe" } else { "docker" };
    std::env::var_os("PATH").is_some_and(|path| {
        std::env::split_paths(&path).any(|dir| is_file(&dir.join(executable)))
    })
}

fn is_file(path: &Path) -> bool {
    path.metadata().is_ok_and(|m| m.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unavailable() -> Result<(), EngineError> {
        Err(EngineError::Unavailable {
            reason: "No such file or directory".to_string(),
        })
    }

    #[test]
    fn test_reachable_daemon_needs_no_hint() {
        let detection = DockerDetection::classify(Ok(()), false, None);
        assert_eq!(detection.status, DockerStatus::Available);
        assert_eq!(detection.reason, None);
        assert_eq!(detection.hint(), None);
    }

    #[test]
    fn test_installed_cli_without_daemon() {
        let detection = DockerDetection::classify(unavailable(), true, None);
        assert_eq!(detection.status, DockerStatus::NotRunning);
        assert!(detection.reason.unwrap().contains("No such file"));
    }

    #[test]
    fn test_missing_cli() {
        let detection = DockerDetection::classify(unavailable(), false, None);
        assert_eq!(detection.status, DockerStatus::NotInstalled);
        assert!(detection.hint().unwrap().starts_with("Install Docker"));
    }

    #[test]
    fn test_docker_host_takes_precedence_in_hint() {
        let detection = DockerDetection::classify(
            unavailable(),
            true,
            Some("tcp://10.0.0.5:2375".to_string()),
        );
        let hint = detection.hint().unwrap();
        assert!(hint.starts_with("DOCKER_HOST is tcp://10.0.0.5:2375;"), "{hint}");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(DockerStatus::NotRunning.to_string(), "not running");
    }
}
