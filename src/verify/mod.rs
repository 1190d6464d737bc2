//! Database readiness verification.
//!
//! The container reports "running" long before the database inside it
//! accepts queries. [`ConnectivityVerifier`] closes that gap by running a
//! sentinel query through a [`ReadinessProbe`] until it returns exactly one
//! row, backing off between attempts.

#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "postgres")]
mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

#[cfg(feature = "mysql")]
pub use mysql::MySqlProbe;
#[cfg(feature = "postgres")]
pub use postgres::PostgresProbe;

use crate::config::{ConnectionParameters, DatabaseBackend};
use crate::error::{ConfigError, HarnessError, ProbeError};

/// One connect-query-close cycle against the database.
///
/// Implementations must close whatever they opened before returning,
/// on success and on failure alike.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn probe(&self, params: &ConnectionParameters, query: &str) -> Result<(), ProbeError>;
}

/// Build the probe matching `backend`.
pub fn probe_for(backend: DatabaseBackend) -> Result<Arc<dyn ReadinessProbe>, HarnessError> {
    match backend {
        #[cfg(feature = "mysql")]
        DatabaseBackend::MySql => Ok(Arc::new(MySqlProbe::new())),
        #[cfg(feature = "postgres")]
        DatabaseBackend::Postgres => Ok(Arc::new(PostgresProbe::new())),
        #[allow(unreachable_patterns)]
        other => Err(ConfigError::InvalidValue {
            key: "backend".to_string(),
            message: format!(
                "'{other}' support was not compiled in (enable the '{other}' feature)"
            ),
        }
        .into()),
    }
}

/// The sentinel query passes only when it returns exactly one row.
pub(crate) fn expect_single_row(rows: usize) -> Result<(), ProbeError> {
    match rows {
        1 => Ok(()),
        actual => Err(ProbeError::RowCount {
            expected: 1,
            actual,
        }),
    }
}

/// Growing wait between probe attempts.
///
/// Each wait is the previous one plus half of it, halves rounded up to the
/// millisecond: 500, 750, 1125, 1688, 2532, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    pub initial: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max_attempts: 10,
        }
    }
}

impl BackoffSchedule {
    /// Endless sequence of waits, starting with `initial`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        std::iter::successors(Some(self.initial), |prev| Some(grow(*prev)))
    }

    /// Sum of all waits when every attempt fails. Saturates.
    pub fn total_wait(&self) -> Duration {
        self.delays()
            .take(self.max_attempts.saturating_sub(1) as usize)
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

fn grow(prev: Duration) -> Duration {
    let ms = u64::try_from(prev.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(ms.saturating_add(ms.div_ceil(2)))
}

/// How a verification run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The sentinel query succeeded.
    Ready,
    /// Verification is disabled by configuration.
    Skipped,
    /// Every attempt failed.
    Exhausted,
}

/// What happened during one verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub outcome: VerifyOutcome,
    pub attempts: u32,
    /// Waits slept between attempts, in order.
    pub waits: Vec<Duration>,
    /// Time from the first attempt to the final result.
    pub elapsed: Duration,
    pub last_error: Option<ProbeError>,
}

impl VerifyReport {
    pub fn skipped() -> Self {
        Self {
            outcome: VerifyOutcome::Skipped,
            attempts: 0,
            waits: Vec::new(),
            elapsed: Duration::ZERO,
            last_error: None,
        }
    }

    /// Ready or skipped.
    pub fn succeeded(&self) -> bool {
        self.outcome != VerifyOutcome::Exhausted
    }

    /// The failure as an error, if the run was exhausted.
    pub fn to_error(&self) -> Option<HarnessError> {
        match (self.outcome, &self.last_error) {
            (VerifyOutcome::Exhausted, Some(last_error)) => Some(HarnessError::NotReady {
                attempts: self.attempts,
                elapsed: self.elapsed,
                last_error: last_error.clone(),
            }),
            _ => None,
        }
    }
}

/// Polls a database with [`BackoffSchedule`] until the sentinel query passes.
pub struct ConnectivityVerifier {
    probe: Arc<dyn ReadinessProbe>,
    schedule: BackoffSchedule,
}

impl ConnectivityVerifier {
    pub fn new(probe: Arc<dyn ReadinessProbe>) -> Self {
        Self {
            probe,
            schedule: BackoffSchedule::default(),
        }
    }

    pub fn with_schedule(mut self, schedule: BackoffSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Run the probe until it succeeds or attempts run out.
    ///
    /// Never fails; the outcome is in the report. Teardown on exhaustion is
    /// the caller's job.
    pub async fn verify(&self, params: &ConnectionParameters, query: &str) -> VerifyReport {
        let max_attempts = self.schedule.max_attempts.max(1);
        let started = Instant::now();
        let mut delays = self.schedule.delays();
        let mut waits = Vec::new();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            tracing::debug!(
                "Probing database at {}:{} (attempt {}/{})",
                params.host,
                params.port,
                attempt,
                max_attempts
            );

            match self.probe.probe(params, query).await {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    tracing::info!(
                        "Database {} ready after {} attempt(s) in {:?}",
                        params,
                        attempt,
                        elapsed
                    );
                    return VerifyReport {
                        outcome: VerifyOutcome::Ready,
                        attempts: attempt,
                        waits,
                        elapsed,
                        last_error: None,
                    };
                }
                Err(e) => {
                    tracing::debug!("Database not ready (attempt {}): {}", attempt, e);
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts
                && let Some(delay) = delays.next()
            {
                waits.push(delay);
                tokio::time::sleep(delay).await;
            }
        }

        let elapsed = started.elapsed();
        if let Some(ref e) = last_error {
            tracing::warn!(
                "Database {} not ready after {} attempts in {:?}: {}",
                params,
                max_attempts,
                elapsed,
                e
            );
        }

        VerifyReport {
            outcome: VerifyOutcome::Exhausted,
            attempts: max_attempts,
            waits,
            elapsed,
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProbe;
    use pretty_assertions::assert_eq;

    fn params() -> ConnectionParameters {
        crate::config::HarnessConfig::default().connection_parameters()
    }

    fn millis(ms: &[u64]) -> Vec<Duration> {
        ms.iter().copied().map(Duration::from_millis).collect()
    }

    #[test]
    fn test_backoff_sequence() {
        let delays: Vec<Duration> = BackoffSchedule::default().delays().take(9).collect();
        assert_eq!(
            delays,
            millis(&[500, 750, 1125, 1688, 2532, 3798, 5697, 8546, 12819])
        );
    }

    #[test]
    fn test_total_wait_is_bounded() {
        let total = BackoffSchedule::default().total_wait();
        assert_eq!(total, Duration::from_millis(37_455));
    }

    #[test]
    fn test_long_schedule_saturates() {
        let schedule = BackoffSchedule {
            initial: Duration::from_millis(500),
            max_attempts: 120,
        };

        let last = schedule.delays().nth(118).unwrap();
        assert_eq!(last, Duration::from_millis(u64::MAX));
        assert!(schedule.total_wait() >= last);
    }

    #[test]
    fn test_expect_single_row() {
        assert_eq!(expect_single_row(1), Ok(()));
        assert_eq!(
            expect_single_row(0),
            Err(ProbeError::RowCount {
                expected: 1,
                actual: 0
            })
        );
        assert_eq!(
            expect_single_row(2),
            Err(ProbeError::RowCount {
                expected: 1,
                actual: 2
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_attempt_never_sleeps() {
        let probe = Arc::new(ScriptedProbe::succeed_after(0));
        let verifier = ConnectivityVerifier::new(probe.clone());

        let report = verifier.verify(&params(), "SELECT id FROM itdb_marker LIMIT 1").await;

        assert_eq!(report.outcome, VerifyOutcome::Ready);
        assert_eq!(report.attempts, 1);
        assert!(report.waits.is_empty());
        assert_eq!(report.elapsed, Duration::ZERO);
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_failures() {
        let probe = Arc::new(ScriptedProbe::succeed_after(3));
        let verifier = ConnectivityVerifier::new(probe.clone());

        let report = verifier.verify(&params(), "q").await;

        assert_eq!(report.outcome, VerifyOutcome::Ready);
        assert_eq!(report.attempts, 4);
        assert_eq!(report.waits, millis(&[500, 750, 1125]));
        assert_eq!(report.elapsed, Duration::from_millis(2375));
        assert_eq!(probe.queries(), vec!["q".to_string(); 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_records_nine_waits() {
        let probe = Arc::new(ScriptedProbe::always_fail());
        let verifier = ConnectivityVerifier::new(probe.clone());

        let report = verifier.verify(&params(), "q").await;

        assert_eq!(report.outcome, VerifyOutcome::Exhausted);
        assert_eq!(report.attempts, 10);
        assert_eq!(probe.calls(), 10);
        assert_eq!(
            report.waits,
            millis(&[500, 750, 1125, 1688, 2532, 3798, 5697, 8546, 12819])
        );
        assert_eq!(report.elapsed, BackoffSchedule::default().total_wait());
        assert!(report.last_error.is_some());
        assert!(matches!(
            report.to_error(),
            Some(HarnessError::NotReady { attempts: 10, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_schedule() {
        let probe = Arc::new(ScriptedProbe::always_fail());
        let verifier = ConnectivityVerifier::new(probe.clone()).with_schedule(BackoffSchedule {
            initial: Duration::from_millis(10),
            max_attempts: 3,
        });

        let report = verifier.verify(&params(), "q").await;

        assert_eq!(report.attempts, 3);
        assert_eq!(report.waits, millis(&[10, 15]));
    }

    #[test]
    fn test_skipped_report_counts_as_success() {
        let report = VerifyReport::skipped();
        assert!(report.succeeded());
        assert!(report.to_error().is_none());
    }

    #[cfg(feature = "mysql")]
    #[test]
    fn test_probe_for_mysql() {
        assert!(probe_for(DatabaseBackend::MySql).is_ok());
    }
}
