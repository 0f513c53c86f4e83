//! WaitForLoad: the tray is on its way; wait for it to land or be unreserved.

use tracing::{debug, info, warn};

use super::{apply_load, Next, WorkContext, WorkflowDeps, WorkflowState};
use crate::fixture::AvailabilityStatus;

pub(super) async fn run(deps: &WorkflowDeps, ctx: &mut WorkContext) -> Next {
    let entry = &deps.entry;
    discard_stale_unreserve(deps);
    entry.unreserve().open();

    let next = wait(deps, ctx).await;

    // Signals sent from here until the next cycle's listeners open are refused
    entry.unreserve().close();
    entry.load_complete().close();
    discard_stale_unreserve(deps);
    next
}

/// Drop an unreserve that slipped in while the previous listener was closing.
fn discard_stale_unreserve(deps: &WorkflowDeps) {
    if deps.entry.unreserve().drain() > 0 {
        debug!(fixture = %deps.entry.id(), "Discarded stale unreserve");
    }
}

async fn wait(deps: &WorkflowDeps, ctx: &mut WorkContext) -> Next {
    let config = deps.config.snapshot();
    let entry = &deps.entry;
    entry.set_status(AvailabilityStatus::WaitingForLoad);
    info!(fixture = %entry.id(), tray = %ctx.tray_raw(), "Waiting for load");

    tokio::select! {
        _ = deps.cancel.cancelled() => Next::Stop,

        load = entry.load_complete().recv() => {
            let Ok(load) = load else {
                return Next::Stop;
            };
            match apply_load(&config, entry.id(), ctx, load) {
                Ok(()) => {
                    info!(
                        fixture = %entry.id(),
                        tray = %ctx.tray_raw(),
                        recipe = %ctx.process_step,
                        transaction_id = %ctx.transaction_id,
                        "Load complete"
                    );
                    Next::To(WorkflowState::ProcessStep)
                }
                Err(e) => {
                    warn!(fixture = %entry.id(), error = %e, "Rejected load, returning to idle");
                    Next::To(WorkflowState::Idle)
                }
            }
        }

        unreserve = entry.unreserve().recv() => match unreserve {
            Ok(_) => {
                info!(fixture = %entry.id(), tray = %ctx.tray_raw(), "Reservation cancelled");
                Next::To(WorkflowState::Idle)
            }
            Err(_) => Next::Stop,
        },
    }
}
