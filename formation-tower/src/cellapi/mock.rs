//! In-process Cell API stand-in.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::warn;

use super::{
    CellApi, CellApiError, CellApiFuture, CellData, CellMap, CellStatusRequest, FormationStep,
    TrayStatus, ALLOWED_STEP_TYPE,
};
use crate::recipe::{Ingredients, RecipeStep, StepConfiguration};

/// A call received by [`MockCellApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum CellApiCall {
    NextProcessStep(String),
    StepConfiguration(String),
    CellMap(String),
    ProcessStatus {
        tray: String,
        fixture: String,
        status: TrayStatus,
    },
    CellStatuses {
        tray: String,
        request: CellStatusRequest,
        close: bool,
    },
    CloseProcessStep {
        tray: String,
        recipe: String,
        version: u32,
    },
    HoldTray(String),
}

/// Cell API that serves canned answers and records every call.
///
/// Used when the tower runs with `mock = true` and by tests.
#[derive(Debug)]
pub struct MockCellApi {
    step: Mutex<FormationStep>,
    cells: Mutex<CellMap>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    calls: Mutex<Vec<CellApiCall>>,
}

impl MockCellApi {
    /// Mock serving `FORM_CYCLE - 1` and a tray full of cells at `positions`.
    pub fn new<I, S>(positions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self {
            step: Mutex::new(default_step()),
            cells: Mutex::new(CellMap::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        };
        mock.set_cells(positions);
        mock
    }

    pub fn set_step(&self, step: FormationStep) {
        *self.step.lock() = step;
    }

    /// Replace the cell map with one full cell per position.
    pub fn set_cells<I, S>(&self, positions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cells = positions
            .into_iter()
            .map(Into::into)
            .map(|position: String| {
                let cell = CellData {
                    serial: format!("{}-SN", position),
                    position: position.clone(),
                    is_empty: false,
                    status_code: 0,
                };
                (position, cell)
            })
            .collect();
        *self.cells.lock() = cells;
    }

    /// Make every read fail with `Unavailable`.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<CellApiCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: CellApiCall) {
        self.calls.lock().push(call);
    }

    fn read(&self, call: CellApiCall) -> Result<(), CellApiError> {
        self.record(call);
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(CellApiError::Unavailable("mock read failure".to_string()));
        }
        Ok(())
    }

    fn write(&self, call: CellApiCall) -> Result<(), CellApiError> {
        warn!(call = ?call, "Cell API mocked, write not sent");
        self.record(call);
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(CellApiError::Unavailable("mock write failure".to_string()));
        }
        Ok(())
    }
}

impl Default for MockCellApi {
    fn default() -> Self {
        Self::new(["A01", "A02", "A03", "A04"])
    }
}

fn default_step() -> FormationStep {
    let mut recipe_list = BTreeMap::new();
    recipe_list.insert(
        "1".to_string(),
        RecipeStep {
            name: "form_charge_cc/1".to_string(),
            values: Ingredients {
                mode: "FORM_MODE_CC".to_string(),
                charge_current: 2.6,
                max_current: 3.0,
                cutoff_voltage: 3.9,
                step_timeout: 3600.0,
                ..Default::default()
            },
        },
    );

    FormationStep {
        name: "FORM_CYCLE".to_string(),
        step: "FORM_CYCLE - 1".to_string(),
        step_type: ALLOWED_STEP_TYPE.to_string(),
        step_configuration: StepConfiguration {
            recipe_list,
            step_ordering: vec![1],
        },
    }
}

impl CellApi for MockCellApi {
    fn next_process_step<'a>(&'a self, tray: &'a str) -> CellApiFuture<'a, FormationStep> {
        Box::pin(async move {
            self.read(CellApiCall::NextProcessStep(tray.to_string()))?;
            Ok(self.step.lock().clone())
        })
    }

    fn step_configuration<'a>(&'a self, tray: &'a str) -> CellApiFuture<'a, StepConfiguration> {
        Box::pin(async move {
            self.read(CellApiCall::StepConfiguration(tray.to_string()))?;
            Ok(self.step.lock().step_configuration.clone())
        })
    }

    fn cell_map<'a>(&'a self, tray: &'a str) -> CellApiFuture<'a, CellMap> {
        Box::pin(async move {
            self.read(CellApiCall::CellMap(tray.to_string()))?;
            Ok(self.cells.lock().clone())
        })
    }

    fn update_process_status<'a>(
        &'a self,
        tray: &'a str,
        fixture: &'a str,
        status: TrayStatus,
    ) -> CellApiFuture<'a, ()> {
        Box::pin(async move {
            self.write(CellApiCall::ProcessStatus {
                tray: tray.to_string(),
                fixture: fixture.to_string(),
                status,
            })
        })
    }

    fn set_cell_statuses<'a>(
        &'a self,
        tray: &'a str,
        request: &'a CellStatusRequest,
        close: bool,
    ) -> CellApiFuture<'a, ()> {
        Box::pin(async move {
            self.write(CellApiCall::CellStatuses {
                tray: tray.to_string(),
                request: request.clone(),
                close,
            })
        })
    }

    fn close_process_step<'a>(
        &'a self,
        tray: &'a str,
        recipe: &'a str,
        version: u32,
    ) -> CellApiFuture<'a, ()> {
        Box::pin(async move {
            self.write(CellApiCall::CloseProcessStep {
                tray: tray.to_string(),
                recipe: recipe.to_string(),
                version,
            })
        })
    }

    fn hold_tray<'a>(&'a self, tray: &'a str) -> CellApiFuture<'a, ()> {
        Box::pin(async move { self.write(CellApiCall::HoldTray(tray.to_string())) })
    }
}
