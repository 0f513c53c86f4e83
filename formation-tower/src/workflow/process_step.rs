//! ProcessStep: settle which process step the tray runs.

use tracing::{info, warn};

use super::{Next, WorkContext, WorkflowDeps, WorkflowState};
use crate::recipe::parse_recipe_version;

pub(super) async fn run(deps: &WorkflowDeps, ctx: &mut WorkContext) -> Next {
    let config = deps.config.snapshot();
    let fixture = deps.entry.id();

    if ctx.process_step.is_empty() {
        let result = deps
            .cell_api(ctx.mock)
            .next_process_step(ctx.tray_serial())
            .await;
        match result {
            Ok(step) => {
                let label = if step.step.is_empty() { &step.name } else { &step.step };
                let (name, version) = parse_recipe_version(label);
                ctx.process_step = name;
                if ctx.recipe_version == 0 {
                    ctx.recipe_version = version;
                }
                if ctx.step_type.is_empty() {
                    ctx.step_type = step.step_type;
                }
            }
            Err(e) => {
                warn!(
                    fixture = %fixture,
                    tray = %ctx.tray_raw(),
                    error = %e,
                    "Failed to get next process step"
                );
                return Next::To(WorkflowState::Idle);
            }
        }
    } else if ctx.recipe_version == 0 {
        let (name, version) = parse_recipe_version(&ctx.process_step);
        ctx.process_step = name;
        ctx.recipe_version = version;
    }

    if ctx.process_step.is_empty() {
        warn!(fixture = %fixture, tray = %ctx.tray_raw(), "Cell API returned no process step");
        return Next::To(WorkflowState::Idle);
    }

    let allowed = &config.recipes.allowed_step_type;
    if !ctx.step_type.is_empty() && &ctx.step_type != allowed {
        warn!(
            fixture = %fixture,
            tray = %ctx.tray_raw(),
            step_type = %ctx.step_type,
            allowed = %allowed,
            "Step type not run on this tower, releasing tray"
        );
        ctx.skip_close = true;
        return Next::To(WorkflowState::EndProcess);
    }

    info!(
        fixture = %fixture,
        tray = %ctx.tray_raw(),
        step = %ctx.step_label(),
        source = config.recipes.source.as_str(),
        "Process step resolved"
    );
    Next::To(WorkflowState::ReadRecipe)
}
