//! Fixture identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::barcode::BarcodeError;

/// Address of a physical fixture within a tower: column and level.
///
/// Rendered as `CC-LL` (`01-03` is column 1, level 3). The id is the key for
/// the fixture's registry entry and scheduler worker for the whole process
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FixtureId {
    column: u8,
    level: u8,
}

impl FixtureId {
    /// Highest column or level a fixture label can carry.
    pub const MAX_INDEX: u8 = 99;

    pub fn new(column: u8, level: u8) -> Result<Self, BarcodeError> {
        if !(1..=Self::MAX_INDEX).contains(&column) || !(1..=Self::MAX_INDEX).contains(&level) {
            return Err(BarcodeError::InvalidFixtureId(format!(
                "{:02}-{:02}",
                column, level
            )));
        }
        Ok(Self { column, level })
    }

    pub fn column(&self) -> u8 {
        self.column
    }

    pub fn level(&self) -> u8 {
        self.level
    }
}

impl fmt::Display for FixtureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.column, self.level)
    }
}

impl FromStr for FixtureId {
    type Err = BarcodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BarcodeError::InvalidFixtureId(s.to_string());
        let (column, level) = s.trim().split_once('-').ok_or_else(invalid)?;
        let column = column.parse::<u8>().map_err(|_| invalid())?;
        let level = level.parse::<u8>().map_err(|_| invalid())?;
        Self::new(column, level).map_err(|_| invalid())
    }
}

impl TryFrom<String> for FixtureId {
    type Error = BarcodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FixtureId> for String {
    fn from(id: FixtureId) -> Self {
        id.to_string()
    }
}
