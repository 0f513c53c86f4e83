//! The per-fixture formation workflow.
//!
//! A fixture cycles through these states:
//!
//! ```text
//! Idle → WaitForLoad → ProcessStep → ReadRecipe → StartProcess
//!   ↑                                                  ↓
//! Unloading ← EndProcess ←───────────────────────── InProcess
//! ```
//!
//! Each state lives in its own module as an async function that performs
//! the state's actions against a [`WorkContext`] and names the successor.
//! [`Workflow`] ties them to the [`State`](crate::statemachine::State)
//! runner so a [`KeyedScheduler`](crate::statemachine::KeyedScheduler) can
//! drive one workflow per fixture.
//!
//! Non-manual cycles loop back to Idle indefinitely. A run stops only when
//! the cancellation token fires, when a recipe cannot be read, or when a
//! manual job finishes Unloading or gives up on its tray.

mod context;
mod deps;
mod end_process;
mod faults;
mod idle;
mod in_process;
mod process_step;
mod read_recipe;
mod start_process;
mod unloading;
mod wait_for_load;

pub use context::WorkContext;
pub use deps::WorkflowDeps;
pub use faults::FaultLedger;

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::barcode::{BarcodeError, FixtureBarcode, Orientation, TrayBarcode};
use crate::cellapi::CellApiError;
use crate::config::TowerConfig;
use crate::fixture::{FixtureId, LoadRequest};
use crate::recipe::RecipeError;
use crate::statemachine::State;
use crate::transport::TransportError;

/// Errors that end a state's work early.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Barcode(#[from] BarcodeError),

    #[error(transparent)]
    CellApi(#[from] CellApiError),

    #[error(transparent)]
    Recipe(#[from] RecipeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to encode recipe command: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("work context has no {0}")]
    MissingContext(&'static str),

    #[error("no cell map configured for orientation {0}")]
    NoCellMap(Orientation),

    #[error("fixture did not {waiting_for} within {after:?}")]
    HandshakeTimeout {
        waiting_for: &'static str,
        after: Duration,
    },

    #[error("workflow cancelled")]
    Cancelled,
}

/// The states of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    WaitForLoad,
    ProcessStep,
    ReadRecipe,
    StartProcess,
    InProcess,
    EndProcess,
    Unloading,
}

impl WorkflowState {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "Idle",
            WorkflowState::WaitForLoad => "WaitForLoad",
            WorkflowState::ProcessStep => "ProcessStep",
            WorkflowState::ReadRecipe => "ReadRecipe",
            WorkflowState::StartProcess => "StartProcess",
            WorkflowState::InProcess => "InProcess",
            WorkflowState::EndProcess => "EndProcess",
            WorkflowState::Unloading => "Unloading",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one state's actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    To(WorkflowState),
    Stop,
}

/// A fixture's workflow as seen by the state runner.
#[derive(Debug, Clone)]
pub struct Workflow {
    deps: WorkflowDeps,
    state: WorkflowState,
    ctx: WorkContext,
    next: Option<Next>,
}

impl Workflow {
    /// A workflow starting in Idle with an empty context.
    pub fn new(deps: WorkflowDeps) -> Self {
        Self {
            deps,
            state: WorkflowState::Idle,
            ctx: WorkContext::default(),
            next: None,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn context(&self) -> &WorkContext {
        &self.ctx
    }

    /// Whether the last run stopped because of cancellation.
    pub fn was_cancelled(&self) -> bool {
        self.deps.cancel.is_cancelled()
    }
}

impl State for Workflow {
    type Context = WorkContext;

    fn name(&self) -> &'static str {
        self.state.name()
    }

    fn set_context(&mut self, context: WorkContext) {
        self.ctx = context;
    }

    async fn run_actions(&mut self) {
        let deps = &self.deps;
        let ctx = &mut self.ctx;
        let next = match self.state {
            WorkflowState::Idle => idle::run(deps, ctx).await,
            WorkflowState::WaitForLoad => wait_for_load::run(deps, ctx).await,
            WorkflowState::ProcessStep => process_step::run(deps, ctx).await,
            WorkflowState::ReadRecipe => read_recipe::run(deps, ctx).await,
            WorkflowState::StartProcess => start_process::run(deps, ctx).await,
            WorkflowState::InProcess => in_process::run(deps, ctx).await,
            WorkflowState::EndProcess => end_process::run(deps, ctx).await,
            WorkflowState::Unloading => unloading::run(deps, ctx).await,
        };
        // A state interrupted by cancellation never hands over
        let next = if deps.cancel.is_cancelled() { Next::Stop } else { next };
        // A single-shot job that falls back to Idle is over; Idle would
        // otherwise wait on the mailboxes and hold the worker forever
        let next = if ctx.manual && next == Next::To(WorkflowState::Idle) {
            warn!(
                fixture = %deps.entry.id(),
                tray = %ctx.tray_raw(),
                state = %self.state,
                "Manual job abandoned"
            );
            Next::Stop
        } else {
            next
        };
        self.next = Some(next);
    }

    fn next(mut self) -> Self {
        let Some(Next::To(state)) = self.next.take() else {
            return self;
        };
        info!(
            fixture = %self.deps.entry.id(),
            from = %self.state,
            to = %state,
            "Workflow transition"
        );
        if state == WorkflowState::Idle {
            self.ctx = WorkContext::default();
        }
        self.state = state;
        self
    }

    fn is_terminal(&self) -> bool {
        matches!(self.next, Some(Next::Stop))
    }
}

/// Sleep for `duration` unless cancelled first.
async fn pause(cancel: &CancellationToken, duration: Duration) -> Result<(), WorkflowError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(WorkflowError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Resolve a fixture named either by full barcode or by `CC-LL` id.
fn resolve_fixture(config: &TowerConfig, fixture: &str) -> Result<FixtureBarcode, BarcodeError> {
    match FixtureBarcode::parse(fixture) {
        Ok(barcode) => Ok(barcode),
        Err(_) => {
            let id: FixtureId = fixture.parse()?;
            config.tower.fixture_barcode(id)
        }
    }
}

/// Fill the context from a load-complete message.
///
/// The load is authoritative: a tray or fixture that disagrees with an
/// earlier reservation is logged and replaced.
fn apply_load(
    config: &TowerConfig,
    entry: FixtureId,
    ctx: &mut WorkContext,
    load: LoadRequest,
) -> Result<(), WorkflowError> {
    let tray = TrayBarcode::parse(&load.tray)?;
    let fixture = config
        .tower
        .fixture_barcode(FixtureId::new(load.column, load.level)?)?;

    if let Some(reserved) = &ctx.tray {
        if reserved != &tray {
            warn!(
                fixture = %entry,
                reserved = %reserved,
                loaded = %tray,
                "Load names a different tray than the reservation, using the load"
            );
        }
    }
    if let Some(reserved) = &ctx.fixture {
        if reserved.fixture_id().ok() != fixture.fixture_id().ok() {
            warn!(
                fixture = %entry,
                reserved = %reserved,
                loaded = %fixture,
                "Load names a different fixture than the reservation, using the load"
            );
        }
    }

    ctx.tray = Some(tray);
    ctx.fixture = Some(fixture);
    ctx.process_step = load.recipe_name;
    ctx.recipe_version = load.recipe_version;
    ctx.step_type = load.step_type;
    ctx.steps = load.steps;
    ctx.transaction_id = load.transaction_id;
    ctx.loaded_at = Some(Utc::now());
    Ok(())
}
