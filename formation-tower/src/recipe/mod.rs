//! Formation recipes.
//!
//! A recipe is an ordered list of steps; each step carries the ingredients
//! the fixture firmware needs (mode, currents, cutoffs, timeout). Recipes
//! come either from the Cell API as a [`StepConfiguration`] or from the local
//! [`Cookbook`] files, and are translated into a [`RecipeCommand`] before
//! being published to a fixture.

mod cellmask;
mod cookbook;
mod wire;

pub use cellmask::cell_mask;
pub use cookbook::Cookbook;
pub use wire::{EndingStyle, FormMode, FormRequest, RecipeCommand, WireStep, RECIPE_KIND};

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading or resolving a recipe.
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("recipe '{0}' not found")]
    UnknownRecipe(String),

    #[error("recipe '{recipe}' uses unknown ingredient '{ingredient}'")]
    UnknownIngredient { recipe: String, ingredient: String },

    #[error("invalid value for {ingredient}.{key}: '{value}'")]
    InvalidValue {
        ingredient: String,
        key: String,
        value: String,
    },

    #[error("step ordering references missing step {0}")]
    MissingStep(u32),

    #[error("recipe '{0}' has no steps")]
    Empty(String),
}

/// Parameters for one recipe step.
///
/// Numeric semantics belong to the fixture firmware; the tower only carries
/// the values through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ingredients {
    pub mode: String,
    pub ending_style: String,
    pub charge_current: f32,
    pub max_current: f32,
    pub cutoff_voltage: f32,
    pub cutoff_current: f32,
    pub cutoff_dv: f32,
    pub charge_power: f32,
    pub cutoff_ah: f32,
    pub v_cell_min_quality: f32,
    pub v_cell_max_quality: f32,
    /// Seconds before the fixture abandons the step
    pub step_timeout: f32,
}

/// A named step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeStep {
    pub name: String,
    #[serde(default)]
    pub values: Ingredients,
}

/// Step set served by the Cell API for a tray's next formation step.
///
/// `recipe_list` holds each distinct step once; `step_ordering` lists the
/// keys in execution order and may repeat them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfiguration {
    pub recipe_list: BTreeMap<String, RecipeStep>,
    pub step_ordering: Vec<u32>,
}

impl StepConfiguration {
    /// Expand into the ordered step list.
    pub fn ordered_steps(&self) -> Result<Vec<RecipeStep>, RecipeError> {
        self.step_ordering
            .iter()
            .map(|n| {
                self.recipe_list
                    .get(&n.to_string())
                    .cloned()
                    .ok_or(RecipeError::MissingStep(*n))
            })
            .collect()
    }
}

/// Split a Cell API step label (`swift_quality_cycling - 3`) into name and version.
///
/// Labels without a version suffix yield version 0.
pub fn parse_recipe_version(step: &str) -> (String, u32) {
    match step.rsplit_once(" - ") {
        Some((name, version)) => match version.trim().parse::<u32>() {
            Ok(v) => (name.trim().to_string(), v),
            Err(_) => (step.trim().to_string(), 0),
        },
        None => (step.trim().to_string(), 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recipe_version() {
        assert_eq!(
            parse_recipe_version("swift_quality_cycling - 1"),
            ("swift_quality_cycling".to_string(), 1)
        );
        assert_eq!(parse_recipe_version("FORM_CYCLE"), ("FORM_CYCLE".to_string(), 0));
        assert_eq!(parse_recipe_version("odd - x"), ("odd - x".to_string(), 0));
    }

    #[test]
    fn test_ordered_steps_repeat_and_order() {
        let json = r#"{
            "recipe_list": {
                "1": {"name": "charge_cc/1", "values": {"mode": "FORM_MODE_CC", "charge_current": 10.0}},
                "2": {"name": "charge_cv/1", "values": {"mode": "FORM_MODE_CV"}}
            },
            "step_ordering": [1, 2, 1]
        }"#;
        let conf: StepConfiguration = serde_json::from_str(json).unwrap();
        let steps = conf.ordered_steps().unwrap();
        let names: Vec<_> = steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["charge_cc/1", "charge_cv/1", "charge_cc/1"]);
        assert_eq!(steps[0].values.charge_current, 10.0);
    }

    #[test]
    fn test_ordered_steps_missing_key() {
        let conf = StepConfiguration {
            recipe_list: BTreeMap::new(),
            step_ordering: vec![4],
        };
        assert!(matches!(conf.ordered_steps(), Err(RecipeError::MissingStep(4))));
    }
}
