//! Tray and fixture barcode parsing.
//!
//! Trays are labelled with a numeric serial followed by an orientation letter
//! (`11223344A`). Fixtures are labelled with their physical location
//! (`CM2-63010-01-01`: location, aisle, tower column, fixture level).

mod fixture;
mod tray;

pub use fixture::FixtureBarcode;
pub use tray::{Orientation, TrayBarcode};

use thiserror::Error;

/// Errors raised while parsing a barcode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BarcodeError {
    /// Tray barcode does not match `<serial><A-D>`
    #[error("invalid tray barcode '{0}'")]
    InvalidTray(String),

    /// Fixture barcode does not match `location-aisle-tower-fxn`
    #[error("invalid fixture barcode '{0}'")]
    InvalidFixture(String),

    /// Fixture id does not match `CC-LL`
    #[error("invalid fixture id '{0}'")]
    InvalidFixtureId(String),
}
