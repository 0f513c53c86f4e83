//! Idle: wait for a reservation or a load.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{apply_load, resolve_fixture, Next, WorkContext, WorkflowDeps, WorkflowState};
use crate::barcode::TrayBarcode;
use crate::config::TowerConfig;
use crate::fixture::{AvailabilityStatus, FixtureStatus, Operational, Reservation};

pub(super) async fn run(deps: &WorkflowDeps, ctx: &mut WorkContext) -> Next {
    let entry = &deps.entry;
    entry.prepared_for_delivery().open();
    entry.load_complete().open();

    let next = wait(deps, ctx).await;

    // WaitForLoad keeps listening for the load, nothing else does
    entry.prepared_for_delivery().close();
    if next != Next::To(WorkflowState::WaitForLoad) {
        entry.load_complete().close();
    }
    next
}

async fn wait(deps: &WorkflowDeps, ctx: &mut WorkContext) -> Next {
    let config = deps.config.snapshot();
    let entry = &deps.entry;
    entry.set_status(AvailabilityStatus::WaitingForReservation);

    // Jobs that arrive with tray and fixture skip the wait
    if ctx.is_populated() {
        let next = if ctx.in_progress {
            WorkflowState::InProcess
        } else {
            WorkflowState::ProcessStep
        };
        info!(
            fixture = %entry.id(),
            tray = %ctx.tray_raw(),
            next = %next,
            "Starting submitted job"
        );
        return Next::To(next);
    }

    info!(fixture = %entry.id(), "Waiting for reservation");
    let recover = config.workflow.recover_in_progress;
    let mut monitor = tokio::time::interval(config.workflow.poll_interval);

    loop {
        tokio::select! {
            _ = deps.cancel.cancelled() => return Next::Stop,

            reservation = entry.prepared_for_delivery().recv() => {
                let Ok(reservation) = reservation else {
                    return Next::Stop;
                };
                if accept_reservation(deps, &config, ctx, reservation) {
                    return Next::To(WorkflowState::WaitForLoad);
                }
            }

            load = entry.load_complete().recv() => {
                let Ok(load) = load else {
                    return Next::Stop;
                };
                if !config.tower.is_allowed(&entry.id()) {
                    warn!(
                        fixture = %entry.id(),
                        tray = %load.tray,
                        "Load ignored, fixture not allowed"
                    );
                    continue;
                }
                match apply_load(&config, entry.id(), ctx, load) {
                    Ok(()) => {
                        info!(
                            fixture = %entry.id(),
                            tray = %ctx.tray_raw(),
                            transaction_id = %ctx.transaction_id,
                            "Load received without reservation"
                        );
                        return Next::To(WorkflowState::ProcessStep);
                    }
                    Err(e) => {
                        warn!(fixture = %entry.id(), error = %e, "Rejected load");
                        *ctx = WorkContext::default();
                    }
                }
            }

            _ = monitor.tick(), if recover => {
                if let Some(next) = recover_running(deps, &config, ctx) {
                    return Next::To(next);
                }
            }
        }
    }
}

fn accept_reservation(
    deps: &WorkflowDeps,
    config: &TowerConfig,
    ctx: &mut WorkContext,
    reservation: Reservation,
) -> bool {
    let id = deps.entry.id();
    if !config.tower.is_allowed(&id) {
        warn!(fixture = %id, tray = %reservation.tray, "Reservation ignored, fixture not allowed");
        return false;
    }

    let tray = match TrayBarcode::parse(&reservation.tray) {
        Ok(tray) => tray,
        Err(e) => {
            warn!(fixture = %id, error = %e, "Rejected reservation");
            return false;
        }
    };
    let fixture = match resolve_fixture(config, &reservation.fixture) {
        Ok(fixture) => fixture,
        Err(e) => {
            warn!(fixture = %id, error = %e, "Rejected reservation");
            return false;
        }
    };
    if fixture.fixture_id().ok() != Some(id) {
        warn!(fixture = %id, named = %fixture, "Reservation names another fixture");
    }

    info!(fixture = %id, tray = %tray, "Reservation received");
    ctx.tray = Some(tray);
    ctx.fixture = Some(fixture);
    ctx.reserved_at = Some(reservation.received_at);
    true
}

/// Pick up a recipe the fixture reports as already running, e.g. after a restart.
fn recover_running(
    deps: &WorkflowDeps,
    config: &TowerConfig,
    ctx: &mut WorkContext,
) -> Option<WorkflowState> {
    let op = deps.entry.telemetry().operational().ok()?;
    let next = match op.status {
        FixtureStatus::Active => WorkflowState::InProcess,
        FixtureStatus::Complete => WorkflowState::EndProcess,
        _ => return None,
    };
    let transaction_id = op.transaction_id()?.to_string();

    // A cycle this workflow already finished is not recovered again
    let finished = deps.entry.last_report();
    if finished.is_some_and(|r| r.transaction_id == transaction_id) {
        return None;
    }

    match recovered_context(deps, config, &op) {
        Some(recovered) => {
            info!(
                fixture = %deps.entry.id(),
                tray = %recovered.tray_raw(),
                transaction_id = %transaction_id,
                resume = %next,
                "Recovering recipe already running on fixture"
            );
            *ctx = recovered;
            if next == WorkflowState::EndProcess {
                ctx.readings = op.cells;
            }
            Some(next)
        }
        None => {
            debug!(
                fixture = %deps.entry.id(),
                transaction_id = %transaction_id,
                "Running recipe not recoverable"
            );
            None
        }
    }
}

fn recovered_context(
    deps: &WorkflowDeps,
    config: &TowerConfig,
    op: &Operational,
) -> Option<WorkContext> {
    let info = op.info.as_ref()?;
    let tray = TrayBarcode::parse(&info.tray_barcode).ok()?;
    let fixture = resolve_fixture(config, &info.fixture_location)
        .or_else(|_| config.tower.fixture_barcode(deps.entry.id()))
        .ok()?;

    Some(WorkContext {
        tray: Some(tray),
        fixture: Some(fixture),
        process_step: info.recipe_name.clone(),
        recipe_version: info.recipe_version,
        transaction_id: info.transaction_id.clone(),
        in_progress: true,
        loaded_at: Some(Utc::now()),
        ..Default::default()
    })
}
