//! Integration tests for a whole tower.
//!
//! These tests assemble the service from its public parts:
//! - Reservation, load and fault reporting through the full workflow
//! - Stale telemetry during a run
//! - Availability returning to its starting value after a cycle
//! - One job at a time per fixture
//! - Failed manual jobs and late handoff signals
//! - Cycles driven by simulated fixtures

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use formation_tower::cellapi::{CellApi, CellApiCall, MockCellApi, TrayStatus};
use formation_tower::config::{SharedConfig, TowerConfig};
use formation_tower::fixture::{
    AdmissionError, AvailabilityStatus, CellReading, CellStatus, FixtureId, FixtureInfo,
    FixtureStatus, LoadRequest, Operational, TelemetryMessage,
};
use formation_tower::recipe::{Ingredients, RecipeCommand, RecipeStep};
use formation_tower::service::TowerService;
use formation_tower::transport::{FixtureSimulator, LoopbackTransport, Publisher, SimulatorConfig};

// =============================================================================
// Test Helpers
// =============================================================================

const WAIT: Duration = Duration::from_secs(5);
const TRAY: &str = "11223344A";

fn id(s: &str) -> FixtureId {
    s.parse().unwrap()
}

fn test_config() -> TowerConfig {
    let mut config = TowerConfig::default();
    config.tower.fixtures = vec![id("01-01"), id("01-02")];
    config.workflow.poll_interval = Duration::from_millis(10);
    config.workflow.readiness_timeout = Duration::from_secs(2);
    config.workflow.mailbox_timeout = Duration::from_millis(500);
    config.workflow.recover_in_progress = false;
    config
}

struct Tower {
    service: TowerService,
    transport: Arc<LoopbackTransport>,
    mock: Arc<MockCellApi>,
}

fn start_tower(config: TowerConfig) -> Tower {
    let (transport, subscriptions) = LoopbackTransport::new(config.tower.fixtures.clone());
    let transport = Arc::new(transport);
    let mock = Arc::new(MockCellApi::default());

    let cell_api: Arc<dyn CellApi> = mock.clone();
    let publisher: Arc<dyn Publisher> = transport.clone();
    let service = TowerService::start(
        SharedConfig::new(config),
        cell_api,
        publisher,
        subscriptions,
        CancellationToken::new(),
    )
    .unwrap();

    Tower {
        service,
        transport,
        mock,
    }
}

fn status(tower: &Tower, fixture: &FixtureId) -> AvailabilityStatus {
    tower.service.registry().get(fixture).unwrap().status()
}

async fn wait_for_status(tower: &Tower, fixture: &FixtureId, wanted: AvailabilityStatus) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while status(tower, fixture) != wanted {
        assert!(
            tokio::time::Instant::now() < deadline,
            "fixture {} stuck in {} waiting for {}",
            fixture,
            status(tower, fixture),
            wanted
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn wait_until(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn one_step_load(transaction_id: &str) -> LoadRequest {
    LoadRequest {
        transaction_id: transaction_id.to_string(),
        column: 1,
        level: 1,
        tray: TRAY.to_string(),
        recipe_name: "FORM_CYCLE".to_string(),
        recipe_version: 1,
        step_type: String::new(),
        steps: vec![RecipeStep {
            name: "form_charge_cc/1".to_string(),
            values: Ingredients {
                mode: "FORM_MODE_CC".to_string(),
                charge_current: 2.6,
                cutoff_voltage: 3.9,
                ..Default::default()
            },
        }],
    }
}

async fn send_status(
    tower: &Tower,
    fixture: &FixtureId,
    status: FixtureStatus,
    transaction_id: Option<&str>,
    cells: Vec<CellReading>,
) {
    let message = TelemetryMessage::Operational(Operational {
        status,
        info: transaction_id.map(|t| FixtureInfo {
            tray_barcode: TRAY.to_string(),
            fixture_location: "CM2-63010-01-01".to_string(),
            recipe_name: "FORM_CYCLE".to_string(),
            recipe_version: 1,
            transaction_id: t.to_string(),
            process_step: "FORM_CYCLE - 1".to_string(),
        }),
        cells,
        fire_alarm: false,
    });
    tower
        .transport
        .inject_message(fixture, &message)
        .await
        .unwrap();
}

fn readings(status: CellStatus) -> Vec<CellReading> {
    (0..4)
        .map(|_| CellReading {
            status,
            voltage: 4.1,
            current: 0.0,
        })
        .collect()
}

/// Reserve, make the fixture ready, load and wait for the recipe to go out.
async fn reserve_and_load(tower: &Tower, fixture: &FixtureId, transaction_id: &str) {
    tower
        .service
        .registry()
        .submit_reservation(TRAY, "01-01")
        .await
        .unwrap();
    wait_for_status(tower, fixture, AvailabilityStatus::WaitingForLoad).await;

    tower
        .service
        .registry()
        .submit_load(one_step_load(transaction_id))
        .await
        .unwrap();

    // Keep reporting READY until the recipe goes out
    let deadline = tokio::time::Instant::now() + WAIT;
    while tower.transport.published_to(fixture).is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "recipe never published");
        send_status(tower, fixture, FixtureStatus::Ready, None, Vec::new()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Transaction ids of published recipes, with consecutive repeats folded.
fn published_runs(transport: &LoopbackTransport, fixture: &FixtureId) -> Vec<String> {
    let mut runs: Vec<String> = Vec::new();
    for envelope in transport.published_to(fixture) {
        let Some(command) = RecipeCommand::from_envelope(&envelope) else {
            continue;
        };
        if runs.last() != Some(&command.info.transaction_id) {
            runs.push(command.info.transaction_id);
        }
    }
    runs
}

fn count_end_reports(mock: &MockCellApi) -> usize {
    mock.calls()
        .iter()
        .filter(|call| {
            matches!(
                call,
                CellApiCall::ProcessStatus {
                    status: TrayStatus::End,
                    ..
                }
            )
        })
        .count()
}

fn count_cell_map_calls(mock: &MockCellApi) -> usize {
    mock.calls()
        .iter()
        .filter(|call| matches!(call, CellApiCall::CellMap(_)))
        .count()
}

// =============================================================================
// Full Workflow Tests
// =============================================================================

#[tokio::test]
async fn test_reservation_load_fault_unload() {
    let tower = start_tower(test_config());
    let fixture = id("01-01");
    assert_eq!(tower.service.schedule_idle().await.unwrap(), 2);
    wait_for_status(&tower, &fixture, AvailabilityStatus::WaitingForReservation).await;

    reserve_and_load(&tower, &fixture, "txn-1").await;
    let published = tower.transport.published_to(&fixture);
    let command = RecipeCommand::from_envelope(&published[0]).unwrap();
    assert_eq!(command.steps.len(), 1);
    assert_eq!(command.cell_masks[0], 0b1111);

    send_status(&tower, &fixture, FixtureStatus::Active, Some("txn-1"), Vec::new()).await;
    wait_for_status(&tower, &fixture, AvailabilityStatus::Active).await;

    send_status(
        &tower,
        &fixture,
        FixtureStatus::Faulted,
        Some("txn-1"),
        readings(CellStatus::Failed),
    )
    .await;
    wait_for_status(&tower, &fixture, AvailabilityStatus::Unloading).await;

    let report = tower
        .service
        .registry()
        .get(&fixture)
        .unwrap()
        .last_report()
        .unwrap();
    assert!(report.fixture_fault);
    assert_eq!(report.transaction_id, "txn-1");
    assert_eq!(report.failed, 4);
    assert_eq!(count_end_reports(&tower.mock), 1);

    send_status(&tower, &fixture, FixtureStatus::Idle, None, Vec::new()).await;
    wait_for_status(&tower, &fixture, AvailabilityStatus::WaitingForReservation).await;

    tower.service.shutdown().await;
}

#[tokio::test]
async fn test_stale_telemetry_does_not_wedge_run() {
    let mut config = test_config();
    config.telemetry.operational_expiry = Duration::from_millis(100);
    let tower = start_tower(config);
    let fixture = id("01-01");
    tower.service.schedule_idle().await.unwrap();
    wait_for_status(&tower, &fixture, AvailabilityStatus::WaitingForReservation).await;

    reserve_and_load(&tower, &fixture, "txn-2").await;
    send_status(&tower, &fixture, FixtureStatus::Active, Some("txn-2"), Vec::new()).await;
    wait_for_status(&tower, &fixture, AvailabilityStatus::Active).await;

    // Link goes quiet well past the expiry
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(status(&tower, &fixture), AvailabilityStatus::Active);

    send_status(
        &tower,
        &fixture,
        FixtureStatus::Complete,
        Some("txn-2"),
        readings(CellStatus::Complete),
    )
    .await;
    wait_for_status(&tower, &fixture, AvailabilityStatus::Unloading).await;

    let report = tower
        .service
        .registry()
        .get(&fixture)
        .unwrap()
        .last_report()
        .unwrap();
    assert!(!report.fixture_fault);
    assert_eq!(report.passed, 4);

    tower.service.shutdown().await;
}

#[tokio::test]
async fn test_availability_round_trip() {
    let mut config = test_config();
    config.tower.allowed_fixtures = vec![id("01-01")];
    let tower = start_tower(config);
    let fixture = id("01-01");
    let other = id("01-02");

    assert_eq!(tower.service.schedule_idle().await.unwrap(), 1);
    wait_for_status(&tower, &fixture, AvailabilityStatus::WaitingForReservation).await;
    let before = tower.service.registry().availability();
    assert_eq!(before[&other], AvailabilityStatus::Unknown);

    // A fixture left out of service admits nothing
    let err = tower
        .service
        .registry()
        .submit_reservation(TRAY, "01-02")
        .await
        .unwrap_err();
    assert!(matches!(err, AdmissionError::NotAccepting { .. }));

    reserve_and_load(&tower, &fixture, "txn-3").await;
    send_status(&tower, &fixture, FixtureStatus::Active, Some("txn-3"), Vec::new()).await;
    send_status(
        &tower,
        &fixture,
        FixtureStatus::Complete,
        Some("txn-3"),
        readings(CellStatus::Complete),
    )
    .await;
    wait_for_status(&tower, &fixture, AvailabilityStatus::Unloading).await;
    send_status(&tower, &fixture, FixtureStatus::Idle, None, Vec::new()).await;
    wait_for_status(&tower, &fixture, AvailabilityStatus::WaitingForReservation).await;

    assert_eq!(tower.service.registry().availability(), before);

    tower.service.shutdown().await;
}

#[tokio::test]
async fn test_second_reservation_rejected_while_reserved() {
    let tower = start_tower(test_config());
    let fixture = id("01-01");
    tower.service.schedule_idle().await.unwrap();
    wait_for_status(&tower, &fixture, AvailabilityStatus::WaitingForReservation).await;

    let registry = tower.service.registry();
    registry.submit_reservation(TRAY, "01-01").await.unwrap();
    wait_for_status(&tower, &fixture, AvailabilityStatus::WaitingForLoad).await;

    let err = registry
        .submit_reservation("55667788B", "01-01")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::NotAccepting {
            signal: "reservation",
            ..
        }
    ));

    // The other fixture is unaffected
    registry
        .submit_reservation("55667788B", "CM2-63010-01-02")
        .await
        .unwrap();
    wait_for_status(&tower, &id("01-02"), AvailabilityStatus::WaitingForLoad).await;

    tower.service.shutdown().await;
}

#[tokio::test]
async fn test_unreserve_after_load_is_dropped() {
    let mut config = test_config();
    config.workflow.readiness_timeout = Duration::from_millis(300);
    let tower = start_tower(config);
    let fixture = id("01-01");
    let registry = tower.service.registry();
    tower.service.schedule_idle().await.unwrap();
    wait_for_status(&tower, &fixture, AvailabilityStatus::WaitingForReservation).await;

    registry.submit_reservation(TRAY, "01-01").await.unwrap();
    wait_for_status(&tower, &fixture, AvailabilityStatus::WaitingForLoad).await;
    registry.submit_load(one_step_load("txn-4")).await.unwrap();

    // The load is taken and the handshake is under way; nobody reports READY
    let mock = tower.mock.clone();
    wait_until("recipe handshake", move || count_cell_map_calls(&mock) == 1).await;
    assert_eq!(status(&tower, &fixture), AvailabilityStatus::WaitingForLoad);
    assert!(!registry.submit_unreserve(&fixture).unwrap());
    let err = registry.submit_load(one_step_load("txn-5")).await.unwrap_err();
    assert!(matches!(err, AdmissionError::NotAccepting { signal: "load", .. }));

    // Handshake times out and the next tray's reservation holds
    wait_for_status(&tower, &fixture, AvailabilityStatus::WaitingForReservation).await;
    registry.submit_reservation("55667788A", "01-01").await.unwrap();
    wait_for_status(&tower, &fixture, AvailabilityStatus::WaitingForLoad).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(status(&tower, &fixture), AvailabilityStatus::WaitingForLoad);
    assert_eq!(count_cell_map_calls(&tower.mock), 1);

    tower.service.shutdown().await;
}

#[tokio::test]
async fn test_failed_manual_job_frees_worker() {
    let mut config = test_config();
    config.workflow.readiness_timeout = Duration::from_millis(200);
    let tower = start_tower(config);

    // No fixture ever reports READY, so every manual job times out
    tower.service.submit_manual(TRAY, "01-01", false).await.unwrap();
    let mock = tower.mock.clone();
    wait_until("first manual job", move || count_cell_map_calls(&mock) == 1).await;

    tower
        .service
        .submit_manual("55667788A", "01-01", false)
        .await
        .unwrap();
    let mock = tower.mock.clone();
    wait_until("second manual job", move || count_cell_map_calls(&mock) == 2).await;

    let third = tokio::time::timeout(
        WAIT,
        tower.service.submit_manual("99887766B", "01-01", false),
    )
    .await;
    assert!(matches!(third, Ok(Ok(_))), "worker stuck after failed manual job");
    let mock = tower.mock.clone();
    wait_until("third manual job", move || count_cell_map_calls(&mock) == 3).await;
    assert!(tower.transport.published_to(&id("01-01")).is_empty());

    tower.service.shutdown().await;
}

// =============================================================================
// Simulated Fixture Tests
// =============================================================================

fn quick_simulator() -> SimulatorConfig {
    SimulatorConfig {
        heartbeat: Duration::from_millis(10),
        run_for: Duration::from_millis(60),
        unload_after: Duration::from_millis(60),
    }
}

#[tokio::test]
async fn test_simulated_cycle() {
    let config = test_config();
    let fixtures = config.tower.fixtures.clone();
    let tower = start_tower(config);
    let fixture = id("01-01");
    let sim = Arc::new(FixtureSimulator::new(
        tower.transport.clone(),
        fixtures,
        quick_simulator(),
    ));
    let sim_handle = sim.start(tower.service.cancel_token().clone());

    tower.service.schedule_idle().await.unwrap();
    wait_for_status(&tower, &fixture, AvailabilityStatus::WaitingForReservation).await;

    tower
        .service
        .registry()
        .submit_reservation(TRAY, "01-01")
        .await
        .unwrap();
    wait_for_status(&tower, &fixture, AvailabilityStatus::WaitingForLoad).await;
    tower
        .service
        .registry()
        .submit_load(one_step_load("txn-sim"))
        .await
        .unwrap();

    let mock = tower.mock.clone();
    wait_until("end of process", move || count_end_reports(&mock) == 1).await;
    wait_for_status(&tower, &fixture, AvailabilityStatus::WaitingForReservation).await;

    let closed = tower.mock.calls().iter().any(|call| {
        matches!(call, CellApiCall::CellStatuses { close: true, request, .. }
            if request.cells.len() == 4)
    });
    assert!(closed, "cell results not reported: {:?}", tower.mock.calls());
    assert_eq!(published_runs(&tower.transport, &fixture), vec!["txn-sim"]);

    tower.service.shutdown().await;
    sim_handle.await.unwrap();
}

#[tokio::test]
async fn test_manual_jobs_run_one_at_a_time() {
    let config = test_config();
    let fixtures = config.tower.fixtures.clone();
    let tower = start_tower(config);
    let fixture = id("01-01");
    let sim = Arc::new(FixtureSimulator::new(
        tower.transport.clone(),
        fixtures,
        quick_simulator(),
    ));
    let sim_handle = sim.start(tower.service.cancel_token().clone());

    let first = tower.service.submit_manual(TRAY, "01-01", false).await.unwrap();
    let second = tower
        .service
        .submit_manual("55667788A", "CM2-63010-01-01", false)
        .await
        .unwrap();
    assert_eq!(first, fixture);
    assert_eq!(second, fixture);

    let mock = tower.mock.clone();
    wait_until("both jobs", move || count_end_reports(&mock) == 2).await;

    // Each job's recipe went out only after the previous job finished
    let runs = published_runs(&tower.transport, &fixture);
    assert_eq!(runs.len(), 2, "interleaved publishes: {:?}", runs);
    assert_ne!(runs[0], runs[1]);

    tower.service.shutdown().await;
    sim_handle.await.unwrap();
}

#[tokio::test]
async fn test_manual_job_rejects_unknown_fixture() {
    let tower = start_tower(test_config());
    assert!(tower.service.submit_manual(TRAY, "02-01", false).await.is_err());
    assert!(tower.service.submit_manual("bad", "01-01", false).await.is_err());
    tower.service.shutdown().await;
}
