//! Per-cycle work context.

use chrono::{DateTime, Utc};

use crate::barcode::{FixtureBarcode, TrayBarcode};
use crate::cellapi::CellMap;
use crate::fixture::{CellReading, FixtureInfo};
use crate::recipe::RecipeStep;

/// Everything one tray/fixture cycle carries from state to state.
///
/// Created when a reservation, load or manual job arrives and dropped when
/// the workflow returns to Idle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkContext {
    pub tray: Option<TrayBarcode>,
    pub fixture: Option<FixtureBarcode>,
    /// Process step (recipe) name
    pub process_step: String,
    pub recipe_version: u32,
    pub step_type: String,
    pub steps: Vec<RecipeStep>,
    pub transaction_id: String,

    /// Single-shot operator job; the run stops after Unloading
    pub manual: bool,
    /// Use the mock Cell API for this cycle
    pub mock: bool,
    /// The fixture is already running this recipe
    pub in_progress: bool,

    /// Cells the Cell API reported in the tray
    pub cells: CellMap,
    /// Final channel readings from the fixture
    pub readings: Vec<CellReading>,
    pub fixture_fault: bool,
    /// Report results without closing the process step
    pub skip_close: bool,

    pub reserved_at: Option<DateTime<Utc>>,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl WorkContext {
    /// Context for an operator-submitted job.
    pub fn manual(tray: TrayBarcode, fixture: FixtureBarcode) -> Self {
        Self {
            tray: Some(tray),
            fixture: Some(fixture),
            manual: true,
            ..Default::default()
        }
    }

    pub fn with_mock(mut self, mock: bool) -> Self {
        self.mock = mock;
        self
    }

    /// Whether tray and fixture are already known, so Idle need not wait.
    pub fn is_populated(&self) -> bool {
        self.tray.is_some() && self.fixture.is_some()
    }

    /// Tray serial used for Cell API calls.
    pub fn tray_serial(&self) -> &str {
        self.tray.as_ref().map(TrayBarcode::serial).unwrap_or_default()
    }

    pub fn tray_raw(&self) -> &str {
        self.tray.as_ref().map(TrayBarcode::raw).unwrap_or_default()
    }

    pub fn fixture_raw(&self) -> &str {
        self.fixture.as_ref().map(FixtureBarcode::raw).unwrap_or_default()
    }

    /// Step label in the Cell API's `name - version` form.
    pub fn step_label(&self) -> String {
        format!("{} - {}", self.process_step, self.recipe_version)
    }

    /// Identity block echoed back by the fixture while it runs the recipe.
    pub fn fixture_info(&self) -> FixtureInfo {
        FixtureInfo {
            tray_barcode: self.tray_raw().to_string(),
            fixture_location: self.fixture_raw().to_string(),
            recipe_name: self.process_step.clone(),
            recipe_version: self.recipe_version,
            transaction_id: self.transaction_id.clone(),
            process_step: self.step_label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual() -> WorkContext {
        WorkContext::manual(
            TrayBarcode::parse("11223344A").unwrap(),
            FixtureBarcode::parse("CM2-63010-01-01").unwrap(),
        )
    }

    #[test]
    fn test_default_is_empty() {
        let ctx = WorkContext::default();
        assert!(!ctx.is_populated());
        assert_eq!(ctx.tray_serial(), "");
        assert!(!ctx.manual);
    }

    #[test]
    fn test_manual_is_populated() {
        let ctx = manual().with_mock(true);
        assert!(ctx.is_populated());
        assert!(ctx.manual);
        assert!(ctx.mock);
        assert_eq!(ctx.tray_serial(), "11223344");
    }

    #[test]
    fn test_fixture_info() {
        let mut ctx = manual();
        ctx.process_step = "FORM_CYCLE".to_string();
        ctx.recipe_version = 2;
        ctx.transaction_id = "txn".to_string();

        let info = ctx.fixture_info();
        assert_eq!(info.tray_barcode, "11223344A");
        assert_eq!(info.fixture_location, "CM2-63010-01-01");
        assert_eq!(info.process_step, "FORM_CYCLE - 2");
        assert_eq!(info.transaction_id, "txn");
    }
}
