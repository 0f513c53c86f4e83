//! Unloading: wait for the tray to leave the fixture.

use std::time::Instant;

use tracing::{debug, info};

use super::{pause, Next, WorkContext, WorkflowDeps, WorkflowState};
use crate::fixture::{AvailabilityStatus, FixtureStatus};

pub(super) async fn run(deps: &WorkflowDeps, ctx: &mut WorkContext) -> Next {
    let config = deps.config.snapshot();
    let id = deps.entry.id();
    let telemetry = deps.entry.telemetry();
    deps.entry.set_status(AvailabilityStatus::Unloading);
    info!(fixture = %id, tray = %ctx.tray_raw(), "Waiting for unload");

    // Only reports sent after the tray finished count
    let entered = Instant::now();
    loop {
        match telemetry.operational_at(Instant::now()) {
            Ok(snapshot) if snapshot.received_at >= entered => match snapshot.message.status {
                FixtureStatus::Idle | FixtureStatus::Faulted => {
                    info!(
                        fixture = %id,
                        tray = %ctx.tray_raw(),
                        status = %snapshot.message.status,
                        "Tray unloaded"
                    );
                    break;
                }
                status => debug!(fixture = %id, status = %status, "Waiting for unload"),
            },
            Ok(_) => debug!(fixture = %id, "No report since unloading started"),
            Err(e) => debug!(fixture = %id, error = %e, "Waiting for unload"),
        }
        if pause(&deps.cancel, config.workflow.poll_interval).await.is_err() {
            return Next::Stop;
        }
    }

    if ctx.manual {
        info!(fixture = %id, "Manual job finished");
        return Next::Stop;
    }
    Next::To(WorkflowState::Idle)
}
