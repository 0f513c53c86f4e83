//! InProcess: supervise the running recipe until the fixture finishes.

use tracing::{debug, info, warn};

use super::{pause, Next, WorkContext, WorkflowDeps, WorkflowState};
use crate::fixture::{AvailabilityStatus, FixtureStatus};

/// Stale polls between repeated warnings.
const STALE_WARN_EVERY: u32 = 10;

pub(super) async fn run(deps: &WorkflowDeps, ctx: &mut WorkContext) -> Next {
    let config = deps.config.snapshot();
    let id = deps.entry.id();
    let telemetry = deps.entry.telemetry();
    deps.entry.set_status(AvailabilityStatus::Active);
    info!(
        fixture = %id,
        tray = %ctx.tray_raw(),
        transaction_id = %ctx.transaction_id,
        "Recipe running"
    );

    let mut stale_polls: u32 = 0;
    loop {
        match telemetry.operational() {
            Ok(op) => {
                if stale_polls > 0 {
                    info!(fixture = %id, missed = stale_polls, "Telemetry resumed");
                    stale_polls = 0;
                }
                match op.status {
                    FixtureStatus::Complete | FixtureStatus::Faulted => {
                        ctx.fixture_fault = op.status == FixtureStatus::Faulted;
                        ctx.readings = op.cells;
                        info!(
                            fixture = %id,
                            tray = %ctx.tray_raw(),
                            status = %op.status,
                            channels = ctx.readings.len(),
                            "Recipe finished"
                        );
                        return Next::To(WorkflowState::EndProcess);
                    }
                    FixtureStatus::Idle | FixtureStatus::Ready
                        if op.transaction_id() != Some(ctx.transaction_id.as_str()) =>
                    {
                        // The fixture dropped the recipe; nothing is left to report
                        warn!(
                            fixture = %id,
                            tray = %ctx.tray_raw(),
                            status = %op.status,
                            "Fixture no longer running the recipe, abandoning"
                        );
                        return Next::To(WorkflowState::Idle);
                    }
                    status => debug!(fixture = %id, status = %status, "Recipe in progress"),
                }
            }
            Err(e) if e.is_stale() => {
                stale_polls += 1;
                if stale_polls == 1 || stale_polls % STALE_WARN_EVERY == 0 {
                    warn!(
                        fixture = %id,
                        polls = stale_polls,
                        error = %e,
                        "Telemetry stale, retrying"
                    );
                } else {
                    debug!(fixture = %id, polls = stale_polls, "Telemetry stale, retrying");
                }
            }
            Err(e) => debug!(fixture = %id, error = %e, "No telemetry"),
        }

        if pause(&deps.cancel, config.workflow.poll_interval).await.is_err() {
            return Next::Stop;
        }
    }
}
