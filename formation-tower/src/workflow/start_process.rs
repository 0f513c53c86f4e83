//! StartProcess: publish the recipe and wait for the fixture to take it.
//!
//! The handshake has two halves within one `readiness_timeout` budget:
//! wait for the fixture to report `READY`, then publish the recipe once per
//! poll tick until the fixture echoes the transaction id.

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{pause, Next, WorkContext, WorkflowDeps, WorkflowError, WorkflowState};
use crate::cellapi::TrayStatus;
use crate::config::TowerConfig;
use crate::fixture::FixtureStatus;
use crate::recipe::{cell_mask, RecipeCommand};

pub(super) async fn run(deps: &WorkflowDeps, ctx: &mut WorkContext) -> Next {
    let config = deps.config.snapshot();
    let fixture = deps.entry.id();

    match start(deps, &config, ctx).await {
        Ok(()) => {}
        Err(WorkflowError::Cancelled) => return Next::Stop,
        Err(e) => {
            warn!(
                fixture = %fixture,
                tray = %ctx.tray_raw(),
                error = %e,
                "Failed to start process, abandoning tray"
            );
            return Next::To(WorkflowState::Idle);
        }
    }

    let result = deps
        .cell_api(ctx.mock)
        .update_process_status(ctx.tray_serial(), ctx.fixture_raw(), TrayStatus::Start)
        .await;
    if let Err(e) = result {
        warn!(
            fixture = %fixture,
            tray = %ctx.tray_raw(),
            error = %e,
            "Failed to report process start"
        );
    }

    info!(
        fixture = %fixture,
        tray = %ctx.tray_raw(),
        transaction_id = %ctx.transaction_id,
        "Process started"
    );
    Next::To(WorkflowState::InProcess)
}

async fn start(
    deps: &WorkflowDeps,
    config: &TowerConfig,
    ctx: &mut WorkContext,
) -> Result<(), WorkflowError> {
    let id = deps.entry.id();
    let tray = ctx.tray.clone().ok_or(WorkflowError::MissingContext("tray"))?;
    let orientation = tray.orientation();

    let cells = deps.cell_api(ctx.mock).cell_map(tray.serial()).await?;
    let positions = config
        .cell_positions(orientation)
        .ok_or(WorkflowError::NoCellMap(orientation))?;
    let present: Vec<bool> = positions
        .iter()
        .map(|p| cells.get(p).is_some_and(|c| !c.is_empty))
        .collect();
    let loaded = present.iter().filter(|p| **p).count();
    ctx.cells = cells;

    if ctx.transaction_id.is_empty() {
        ctx.transaction_id = format!("{}-{}", id, Utc::now().format("%Y%m%d%H%M%S%3f"));
    }

    let command = RecipeCommand::start(
        ctx.fixture_info(),
        orientation.number(),
        &ctx.steps,
        cell_mask(&present),
    );
    let frame = command.to_envelope(id.to_string())?.encode()?;
    debug!(
        fixture = %id,
        cells = loaded,
        steps = ctx.steps.len(),
        bytes = frame.len(),
        "Recipe command built"
    );

    let timeout = config.workflow.readiness_timeout;
    let poll = config.workflow.poll_interval;
    let deadline = Instant::now() + timeout;
    let telemetry = deps.entry.telemetry();

    // First half: the fixture must be free to take a recipe
    loop {
        match telemetry.operational() {
            Ok(op) if op.status == FixtureStatus::Ready => break,
            Ok(op) if op.transaction_id() == Some(ctx.transaction_id.as_str()) => {
                info!(fixture = %id, "Fixture already running this transaction");
                return Ok(());
            }
            Ok(op) => debug!(fixture = %id, status = %op.status, "Waiting for READY"),
            Err(e) => debug!(fixture = %id, error = %e, "Waiting for READY"),
        }
        if Instant::now() >= deadline {
            return Err(WorkflowError::HandshakeTimeout {
                waiting_for: "report READY",
                after: timeout,
            });
        }
        pause(&deps.cancel, poll).await?;
    }

    // Second half: publish until the fixture echoes the transaction
    loop {
        deps.publisher.publish(&id, frame.clone()).await?;
        pause(&deps.cancel, poll).await?;

        if let Ok(op) = telemetry.operational() {
            if op.transaction_id() == Some(ctx.transaction_id.as_str()) {
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            return Err(WorkflowError::HandshakeTimeout {
                waiting_for: "acknowledge the recipe",
                after: timeout,
            });
        }
    }
}
