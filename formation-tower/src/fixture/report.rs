//! Outcome of a completed fixture cycle.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Summary written by the workflow when a recipe ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub tray: String,
    pub fixture: String,
    pub recipe_name: String,
    pub recipe_version: u32,
    pub transaction_id: String,
    /// The fixture itself faulted, independent of per-cell outcomes
    pub fixture_fault: bool,
    pub passed: usize,
    pub failed: usize,
    pub finished_at: DateTime<Utc>,
}
