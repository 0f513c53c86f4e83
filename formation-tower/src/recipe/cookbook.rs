//! Recipes from local files.
//!
//! Two INI files describe the local cookbook. The recipe file lists each
//! recipe's ingredient names in run order:
//!
//! ```ini
//! [FORM_CYCLE]
//! steps = PRECHARGE, CHARGE
//! ```
//!
//! The ingredients file holds the parameters for each name:
//!
//! ```ini
//! [PRECHARGE]
//! mode = FORM_MODE_CC
//! charge_current = 2.6
//! max_current = 3
//! cutoff_voltage = 3.2
//! step_timeout = 3600
//! ```

use std::collections::HashMap;
use std::path::Path;

use ini::{Ini, Properties};

use super::{Ingredients, RecipeError, RecipeStep};

/// Every locally defined recipe, resolved to its step list.
#[derive(Debug, Clone, Default)]
pub struct Cookbook {
    recipes: HashMap<String, Vec<RecipeStep>>,
}

impl Cookbook {
    /// Load and cross-check the recipe and ingredients files.
    pub fn load(recipe_path: &Path, ingredients_path: &Path) -> Result<Self, RecipeError> {
        let recipes = Ini::load_from_file(recipe_path).map_err(|e| RecipeError::Load {
            path: recipe_path.to_path_buf(),
            source: e,
        })?;
        let ingredients = Ini::load_from_file(ingredients_path).map_err(|e| RecipeError::Load {
            path: ingredients_path.to_path_buf(),
            source: e,
        })?;
        Self::from_ini(&recipes, &ingredients)
    }

    pub(crate) fn from_ini(recipes: &Ini, ingredients: &Ini) -> Result<Self, RecipeError> {
        let mut book = HashMap::new();

        for (name, props) in recipes.iter() {
            let Some(name) = name else { continue };
            let names = props.get("steps").unwrap_or_default();

            let mut steps = Vec::new();
            for ingredient in names.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let section = ingredients.section(Some(ingredient)).ok_or_else(|| {
                    RecipeError::UnknownIngredient {
                        recipe: name.to_string(),
                        ingredient: ingredient.to_string(),
                    }
                })?;
                steps.push(RecipeStep {
                    name: ingredient.to_string(),
                    values: parse_ingredients(ingredient, section)?,
                });
            }
            book.insert(name.to_string(), steps);
        }

        Ok(Self { recipes: book })
    }

    /// Ordered steps for `recipe`.
    pub fn steps_for(&self, recipe: &str) -> Result<Vec<RecipeStep>, RecipeError> {
        let steps = self
            .recipes
            .get(recipe)
            .ok_or_else(|| RecipeError::UnknownRecipe(recipe.to_string()))?;
        if steps.is_empty() {
            return Err(RecipeError::Empty(recipe.to_string()));
        }
        Ok(steps.clone())
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

fn parse_ingredients(name: &str, props: &Properties) -> Result<Ingredients, RecipeError> {
    let number = |key: &str| -> Result<f32, RecipeError> {
        match props.get(key) {
            None => Ok(0.0),
            Some(v) => v.trim().parse().map_err(|_| RecipeError::InvalidValue {
                ingredient: name.to_string(),
                key: key.to_string(),
                value: v.to_string(),
            }),
        }
    };

    Ok(Ingredients {
        mode: props.get("mode").unwrap_or_default().trim().to_string(),
        ending_style: props.get("ending_style").unwrap_or_default().trim().to_string(),
        charge_current: number("charge_current")?,
        max_current: number("max_current")?,
        cutoff_voltage: number("cutoff_voltage")?,
        cutoff_current: number("cutoff_current")?,
        cutoff_dv: number("cutoff_dv")?,
        charge_power: number("charge_power")?,
        cutoff_ah: number("cutoff_ah")?,
        v_cell_min_quality: number("v_cell_min_quality")?,
        v_cell_max_quality: number("v_cell_max_quality")?,
        step_timeout: number("step_timeout")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPES: &str = "[FORM_CYCLE]\nsteps = PRECHARGE, CHARGE\n\n[EMPTY]\nsteps =\n";
    const INGREDIENTS: &str = "\
[PRECHARGE]
mode = FORM_MODE_CC
charge_current = 2.6
max_current = 3
cutoff_voltage = 3.2
step_timeout = 3600

[CHARGE]
mode = FORM_MODE_CV
ending_style = ENDING_STYLE_CELL_BYPASS_ENABLE
cutoff_voltage = 4.1
";

    fn cookbook() -> Cookbook {
        let recipes = Ini::load_from_str(RECIPES).unwrap();
        let ingredients = Ini::load_from_str(INGREDIENTS).unwrap();
        Cookbook::from_ini(&recipes, &ingredients).unwrap()
    }

    #[test]
    fn test_steps_in_order() {
        let steps = cookbook().steps_for("FORM_CYCLE").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].name, "PRECHARGE");
        assert_eq!(steps[0].values.charge_current, 2.6);
        assert_eq!(steps[0].values.step_timeout, 3600.0);
        assert_eq!(steps[1].values.mode, "FORM_MODE_CV");
        assert_eq!(steps[1].values.ending_style, "ENDING_STYLE_CELL_BYPASS_ENABLE");
    }

    #[test]
    fn test_unknown_and_empty_recipes() {
        let book = cookbook();
        assert!(matches!(book.steps_for("NOPE"), Err(RecipeError::UnknownRecipe(_))));
        assert!(matches!(book.steps_for("EMPTY"), Err(RecipeError::Empty(_))));
    }

    #[test]
    fn test_missing_ingredient() {
        let recipes = Ini::load_from_str("[R]\nsteps = GHOST\n").unwrap();
        let ingredients = Ini::load_from_str(INGREDIENTS).unwrap();
        let err = Cookbook::from_ini(&recipes, &ingredients).unwrap_err();
        assert!(matches!(err, RecipeError::UnknownIngredient { .. }));
    }

    #[test]
    fn test_bad_number() {
        let recipes = Ini::load_from_str("[R]\nsteps = X\n").unwrap();
        let ingredients = Ini::load_from_str("[X]\ncharge_current = lots\n").unwrap();
        let err = Cookbook::from_ini(&recipes, &ingredients).unwrap_err();
        assert!(matches!(err, RecipeError::InvalidValue { .. }));
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let recipe_path = dir.path().join("recipes.ini");
        let ingredients_path = dir.path().join("ingredients.ini");
        std::fs::write(&recipe_path, RECIPES).unwrap();
        std::fs::write(&ingredients_path, INGREDIENTS).unwrap();

        let book = Cookbook::load(&recipe_path, &ingredients_path).unwrap();
        assert_eq!(book.len(), 2);

        let missing = Cookbook::load(&dir.path().join("nope.ini"), &ingredients_path);
        assert!(matches!(missing, Err(RecipeError::Load { .. })));
    }
}
