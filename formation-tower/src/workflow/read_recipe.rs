//! ReadRecipe: load the step list for the process step.

use tracing::{error, info};

use super::{Next, WorkContext, WorkflowDeps, WorkflowError, WorkflowState};
use crate::config::{RecipeSource, TowerConfig};
use crate::fixture::AvailabilityStatus;
use crate::recipe::{Cookbook, RecipeError, RecipeStep};

pub(super) async fn run(deps: &WorkflowDeps, ctx: &mut WorkContext) -> Next {
    let config = deps.config.snapshot();
    let fixture = deps.entry.id();

    if !ctx.steps.is_empty() {
        info!(fixture = %fixture, steps = ctx.steps.len(), "Using steps from load");
        return Next::To(WorkflowState::StartProcess);
    }

    match read_steps(deps, &config, ctx).await {
        Ok(steps) => {
            info!(
                fixture = %fixture,
                recipe = %ctx.process_step,
                steps = steps.len(),
                source = config.recipes.source.as_str(),
                "Recipe loaded"
            );
            ctx.steps = steps;
            Next::To(WorkflowState::StartProcess)
        }
        Err(e) => {
            // Needs an operator; the fixture stays out of service
            error!(
                fixture = %fixture,
                tray = %ctx.tray_raw(),
                recipe = %ctx.process_step,
                error = %e,
                "Failed to read recipe, stopping workflow"
            );
            deps.entry.set_status(AvailabilityStatus::Unknown);
            Next::Stop
        }
    }
}

async fn read_steps(
    deps: &WorkflowDeps,
    config: &TowerConfig,
    ctx: &WorkContext,
) -> Result<Vec<RecipeStep>, WorkflowError> {
    let steps = match config.recipes.source {
        RecipeSource::CellApi => deps
            .cell_api(ctx.mock)
            .step_configuration(ctx.tray_serial())
            .await?
            .ordered_steps()?,
        RecipeSource::Local => {
            Cookbook::load(&config.recipes.recipe_file, &config.recipes.ingredients_file)?
                .steps_for(&ctx.process_step)?
        }
    };
    if steps.is_empty() {
        return Err(RecipeError::Empty(ctx.process_step.clone()).into());
    }
    Ok(steps)
}
