//! Cell API: recipe metadata and result reporting.
//!
//! The Cell API knows which formation step a tray needs next, which cells a
//! tray holds, and accepts per-cell pass/fail results. The workflow talks to
//! it through the [`CellApi`] trait so that a [`MockCellApi`] can stand in
//! when the service is unavailable or under test.

mod http;
mod mock;

pub use http::{CellApiEndpoints, HttpCellApi};
pub use mock::{CellApiCall, MockCellApi};

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recipe::StepConfiguration;

/// The only step type a charge/discharge tower runs.
pub const ALLOWED_STEP_TYPE: &str = "cm_cd";

/// Errors talking to the Cell API.
#[derive(Debug, Error)]
pub enum CellApiError {
    #[error("Cell API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cell API {url} returned {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("invalid Cell API response: {0}")]
    InvalidResponse(String),

    #[error("Cell API unavailable: {0}")]
    Unavailable(String),
}

/// Boxed future returned by [`CellApi`] methods.
pub type CellApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CellApiError>> + Send + 'a>>;

/// The next formation step for a tray.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormationStep {
    pub name: String,
    /// Step label, usually `name - version`
    pub step: String,
    pub step_type: String,
    pub step_configuration: StepConfiguration,
}

/// One cell position in a tray.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellData {
    pub position: String,
    #[serde(rename = "cell_serial")]
    pub serial: String,
    pub is_empty: bool,
    pub status_code: i32,
}

/// Cells present in a tray keyed by position (`A01`).
pub type CellMap = HashMap<String, CellData>;

/// Process boundary reported to the Cell API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayStatus {
    Start,
    End,
}

impl TrayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrayStatus::Start => "start",
            TrayStatus::End => "end",
        }
    }
}

impl fmt::Display for TrayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellVerdict {
    Pass,
    Fail,
}

/// Pass/fail result for one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellResult {
    #[serde(rename = "cell_serial")]
    pub serial: String,
    pub status: CellVerdict,
}

/// Body of a cell status report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellStatusRequest {
    pub equipment_name: String,
    pub recipe_name: String,
    pub recipe_version: u32,
    pub cells: Vec<CellResult>,
}

/// Operations the workflow needs from the Cell API.
///
/// Every call may fail with a transport or API-level error; the caller
/// decides whether that ends the cycle or is only logged.
pub trait CellApi: Send + Sync {
    /// Next formation step for the tray serial.
    fn next_process_step<'a>(&'a self, tray: &'a str) -> CellApiFuture<'a, FormationStep>;

    /// Step configuration of the tray's next formation step.
    fn step_configuration<'a>(&'a self, tray: &'a str) -> CellApiFuture<'a, StepConfiguration>;

    /// Cells present in the tray. Empty and previously failed positions are left out.
    fn cell_map<'a>(&'a self, tray: &'a str) -> CellApiFuture<'a, CellMap>;

    fn update_process_status<'a>(
        &'a self,
        tray: &'a str,
        fixture: &'a str,
        status: TrayStatus,
    ) -> CellApiFuture<'a, ()>;

    /// Report per-cell results; `close` also closes the process step.
    fn set_cell_statuses<'a>(
        &'a self,
        tray: &'a str,
        request: &'a CellStatusRequest,
        close: bool,
    ) -> CellApiFuture<'a, ()>;

    fn close_process_step<'a>(
        &'a self,
        tray: &'a str,
        recipe: &'a str,
        version: u32,
    ) -> CellApiFuture<'a, ()>;

    /// Quarantine a tray so it is not routed to another fixture.
    fn hold_tray<'a>(&'a self, tray: &'a str) -> CellApiFuture<'a, ()>;
}
