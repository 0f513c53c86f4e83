//! Service error types.

use thiserror::Error;

use crate::barcode::BarcodeError;
use crate::cellapi::CellApiError;
use crate::fixture::AdmissionError;
use crate::statemachine::SchedulerError;

/// Errors starting or driving a tower.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Cell API client could not be built
    #[error("Cell API error: {0}")]
    CellApi(#[from] CellApiError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Invalid barcode: {0}")]
    Barcode(#[from] BarcodeError),

    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),

    /// The tower configuration names no usable fixture
    #[error("Configuration error: {0}")]
    Config(String),
}
