//! Fixture barcodes.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use super::BarcodeError;
use crate::fixture::FixtureId;

fn fixture_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9]+)-([A-Za-z0-9]+)-([A-Za-z0-9]+)-([A-Za-z0-9]+)$")
            .expect("valid fixture pattern")
    })
}

/// A fixture location barcode: `location-aisle-tower-fxn`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FixtureBarcode {
    pub location: String,
    pub aisle: String,
    pub tower: String,
    pub fxn: String,
    raw: String,
}

impl FixtureBarcode {
    /// Parse a fixture barcode such as `CM2-63010-01-01`.
    pub fn parse(input: &str) -> Result<Self, BarcodeError> {
        let input = input.trim();
        let caps = fixture_pattern()
            .captures(input)
            .ok_or_else(|| BarcodeError::InvalidFixture(input.to_string()))?;

        Ok(Self {
            location: caps[1].to_string(),
            aisle: caps[2].to_string(),
            tower: caps[3].to_string(),
            fxn: caps[4].to_string(),
            raw: input.to_string(),
        })
    }

    /// Registry key for this fixture (`tower-fxn`).
    pub fn fixture_id(&self) -> Result<FixtureId, BarcodeError> {
        format!("{}-{}", self.tower, self.fxn).parse()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for FixtureBarcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for FixtureBarcode {
    type Err = BarcodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
