//! End-to-end lifecycle tests against the in-memory engine.
//!
//! Every test runs on a paused tokio clock, so backoff sleeps complete
//! instantly while the recorded waits stay exact.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use itdb::engine::ContainerState;
use itdb::testing::{FakeEngine, ScriptedProbe};
use itdb::{ConnectionParameters, HarnessConfig, TestDatabase, VerifyOutcome};

fn nursebuddy() -> HarnessConfig {
    HarnessConfig::default()
        .with_database("nursebuddy")
        .with_host_port(3806)
        .with_verify_connection(true)
}

fn harness(
    config: HarnessConfig,
    probe: ScriptedProbe,
) -> (TestDatabase, Arc<FakeEngine>, Arc<ScriptedProbe>) {
    let engine = Arc::new(FakeEngine::new());
    let probe = Arc::new(probe);
    let db = TestDatabase::new(config, engine.clone(), probe.clone());
    (db, engine, probe)
}

// ── Happy path ──────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn start_returns_local_parameters_without_sleeping() {
    let (db, engine, probe) = harness(nursebuddy(), ScriptedProbe::succeed_after(0));

    let params = db.start().await.unwrap();

    assert_eq!(
        params,
        Some(ConnectionParameters {
            host: "127.0.0.1".to_string(),
            port: 3806,
            user: "ituser".to_string(),
            password: "ituser".to_string(),
            database: "nursebuddy".to_string(),
        })
    );
    assert_eq!(probe.calls(), 1);
    assert_eq!(probe.queries(), vec!["SELECT id FROM itdb_marker LIMIT 1".to_string()]);

    let report = db.last_verification().await.unwrap();
    assert_eq!(report.outcome, VerifyOutcome::Ready);
    assert!(report.waits.is_empty());
    assert_eq!(report.elapsed, Duration::ZERO);

    assert!(engine.container("itdb-mysql").unwrap().is_running());
    assert!(engine.network("itdb-network").is_some());
}

#[tokio::test(start_paused = true)]
async fn start_follows_provisioning_order() {
    let (db, engine, _probe) = harness(nursebuddy(), ScriptedProbe::succeed_after(0));

    db.start().await.unwrap();

    let ops = engine.operations();
    let names: Vec<&str> = ops.iter().map(|op| op.split(':').next().unwrap()).collect();
    assert_eq!(
        names,
        vec![
            "list_networks",
            "create_network",
            "inspect_container",
            "create_container",
            "start_container",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn start_tolerates_slow_database() {
    let (db, _engine, probe) = harness(nursebuddy(), ScriptedProbe::succeed_after(4));

    let params = db.start().await.unwrap();

    assert!(params.is_some());
    assert_eq!(probe.calls(), 5);
    let report = db.last_verification().await.unwrap();
    assert_eq!(report.attempts, 5);
    assert_eq!(
        report.waits,
        [500, 750, 1125, 1688].map(Duration::from_millis).to_vec()
    );
}

// ── Idempotence ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn starting_twice_reuses_network_and_container() {
    let (db, engine, probe) = harness(nursebuddy(), ScriptedProbe::succeed_after(0));

    let first = db.start().await.unwrap();
    let params_after_first = db.connection_parameters();
    assert!(engine.container("itdb-mysql").unwrap().is_running());

    let second = db.start().await.unwrap();
    assert!(engine.container("itdb-mysql").unwrap().is_running());

    assert_eq!(first, second);
    assert_eq!(params_after_first, db.connection_parameters());
    assert_eq!(engine.count("create_network"), 1);
    assert_eq!(engine.count("create_container"), 1);
    assert_eq!(engine.count("start_container"), 1);
    // A reused container is verified again.
    assert_eq!(probe.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn stopped_container_is_started_again() {
    let (db, engine, _probe) = harness(nursebuddy(), ScriptedProbe::succeed_after(0));
    engine.seed_network("itdb-network");
    engine.seed_container("itdb-mysql", ContainerState::Stopped);

    assert!(db.start().await.unwrap().is_some());

    assert_eq!(engine.count("create_container"), 0);
    assert_eq!(engine.count("start_container"), 1);
    assert!(engine.container("itdb-mysql").unwrap().is_running());
}

// ── Exhaustion ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn start_gives_up_after_ten_attempts_and_cleans_up() {
    let (db, engine, probe) = harness(nursebuddy(), ScriptedProbe::always_fail());

    let params = db.start().await.unwrap();

    assert_eq!(params, None);
    assert_eq!(probe.calls(), 10);

    let report = db.last_verification().await.unwrap();
    assert_eq!(report.outcome, VerifyOutcome::Exhausted);
    assert_eq!(
        report.waits,
        [500, 750, 1125, 1688, 2532, 3798, 5697, 8546, 12819]
            .map(Duration::from_millis)
            .to_vec()
    );

    // Torn down exactly once.
    assert_eq!(engine.count("remove_container"), 1);
    assert_eq!(engine.count("remove_network"), 1);
    assert!(engine.container("itdb-mysql").is_none());
    assert!(engine.network("itdb-network").is_none());
}

// ── Running inside the network ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn external_container_is_attached_and_probe_uses_alias() {
    let config = nursebuddy()
        .with_container_name("it-db")
        .with_current_container_id("ci-runner");
    let (db, engine, probe) = harness(config, ScriptedProbe::succeed_after(0));

    let params = db.start().await.unwrap().unwrap();

    assert_eq!(params.host, "it-db");
    assert_eq!(params.port, 3306);
    assert_eq!(probe.last_params(), Some(params));
    assert_eq!(
        engine.endpoints("itdb-network"),
        vec!["ci-runner".to_string(), "it-db".to_string()]
    );

    let report = db.stop().await;
    assert!(report.is_clean(), "{:?}", report.failures);
    assert!(engine.endpoints("itdb-network").is_empty());
    assert!(engine.network("itdb-network").is_none());
    assert!(
        engine
            .operations()
            .contains(&"disconnect_network:itdb-network:ci-runner:force".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn attaching_twice_does_not_fail_start() {
    let config = nursebuddy().with_current_container_id("ci-runner");
    let (db, engine, _probe) = harness(config, ScriptedProbe::succeed_after(0));

    assert!(db.start().await.unwrap().is_some());
    assert!(db.start().await.unwrap().is_some());

    assert_eq!(engine.count("connect_network"), 2);
}

// ── Stop ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stop_is_safe_when_nothing_exists() {
    let (db, engine, _probe) = harness(nursebuddy(), ScriptedProbe::succeed_after(0));

    let first = db.stop().await;
    let second = db.stop().await;

    assert!(!first.container_found && first.is_clean());
    assert!(!second.container_found && second.is_clean());
    assert_eq!(engine.count("remove_network"), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_after_start_removes_everything() {
    let (db, engine, _probe) = harness(nursebuddy(), ScriptedProbe::succeed_after(0));
    db.start().await.unwrap();

    let report = db.stop().await;

    assert!(report.container_found);
    assert!(report.is_clean());
    assert!(engine.container("itdb-mysql").is_none());
    assert!(engine.networks().is_empty());
}

// ── Restart ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn restart_without_container_behaves_like_start() {
    let (fresh, fresh_engine, _) = harness(nursebuddy(), ScriptedProbe::succeed_after(0));
    let (restarted, restart_engine, _) = harness(nursebuddy(), ScriptedProbe::succeed_after(0));

    let started = fresh.start().await.unwrap();
    let via_restart = restarted.restart().await.unwrap();

    assert_eq!(started, via_restart);
    assert!(restart_engine.container("itdb-mysql").unwrap().is_running());
    assert!(restart_engine.network("itdb-network").is_some());
    assert_eq!(restart_engine.count("create_container"), 1);
    assert_eq!(restart_engine.count("restart_container"), 0);
    assert_eq!(fresh_engine.networks(), restart_engine.networks());
}

#[tokio::test(start_paused = true)]
async fn restart_existing_container_reverifies() {
    let (db, engine, probe) = harness(nursebuddy(), ScriptedProbe::succeed_after(0));
    db.start().await.unwrap();

    let params = db.restart().await.unwrap();

    assert_eq!(params, Some(db.connection_parameters()));
    assert_eq!(engine.count("restart_container"), 1);
    assert_eq!(probe.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn restart_with_unready_database_returns_none() {
    let (db, engine, probe) = harness(nursebuddy(), ScriptedProbe::succeed_after(0));
    db.start().await.unwrap();
    probe.set_failing(true);

    let params = db.restart().await.unwrap();

    assert_eq!(params, None);
    assert!(engine.container("itdb-mysql").is_none());
    assert!(engine.network("itdb-network").is_none());
}

// ── Provisioning failures ──────────────────────────────────────────────────

#[tokio::test]
async fn network_creation_failure_propagates() {
    let (db, engine, probe) = harness(nursebuddy(), ScriptedProbe::succeed_after(0));
    engine.fail(
        "create_network",
        itdb::EngineError::Api {
            operation: "create_network".to_string(),
            reason: "address pool exhausted".to_string(),
        },
    );

    let err = db.start().await.unwrap_err();

    assert!(matches!(err, itdb::HarnessError::NetworkCreationFailed { .. }));
    assert_eq!(probe.calls(), 0);
}

#[tokio::test]
async fn container_creation_failure_propagates() {
    let (db, engine, _probe) = harness(nursebuddy(), ScriptedProbe::succeed_after(0));
    engine.fail(
        "create_container",
        itdb::EngineError::Api {
            operation: "create_container".to_string(),
            reason: "no such image".to_string(),
        },
    );

    let err = db.start().await.unwrap_err();

    assert!(matches!(err, itdb::HarnessError::ContainerCreationFailed { .. }));
}
