//! Tray barcodes.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use super::BarcodeError;

fn tray_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // at least 7 serial digits, then the orientation letter
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{7,}[A-Da-d]$").expect("valid tray pattern"))
}

/// Which way round a tray was placed into the fixture.
///
/// The letter suffix of a tray barcode identifies the corner the scanner
/// read from, so each orientation selects a different channel-to-cell map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Orientation {
    A,
    B,
    C,
    D,
}

impl Orientation {
    /// All orientations in barcode order.
    pub const ALL: [Orientation; 4] = [
        Orientation::A,
        Orientation::B,
        Orientation::C,
        Orientation::D,
    ];

    /// Numeric value used by the fixture firmware (A=1 .. D=4).
    pub fn number(self) -> u8 {
        match self {
            Orientation::A => 1,
            Orientation::B => 2,
            Orientation::C => 3,
            Orientation::D => 4,
        }
    }

    /// Upper-case letter for this orientation.
    pub fn letter(self) -> char {
        match self {
            Orientation::A => 'A',
            Orientation::B => 'B',
            Orientation::C => 'C',
            Orientation::D => 'D',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Orientation::A),
            'B' => Some(Orientation::B),
            'C' => Some(Orientation::C),
            'D' => Some(Orientation::D),
            _ => None,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for Orientation {
    type Err = BarcodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                Self::from_letter(c).ok_or_else(|| BarcodeError::InvalidTray(s.to_string()))
            }
            _ => Err(BarcodeError::InvalidTray(s.to_string())),
        }
    }
}

/// A scanned tray barcode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrayBarcode {
    serial: String,
    orientation: Orientation,
    raw: String,
}

impl TrayBarcode {
    /// Parse a tray barcode such as `11223344A`.
    pub fn parse(input: &str) -> Result<Self, BarcodeError> {
        let input = input.trim();
        if !tray_pattern().is_match(input) {
            return Err(BarcodeError::InvalidTray(input.to_string()));
        }

        let split = input.len() - 1;
        let orientation = input[split..].parse()?;

        Ok(Self {
            serial: input[..split].to_string(),
            orientation,
            raw: input.to_string(),
        })
    }

    /// Serial number without the orientation letter.
    ///
    /// This is the key the Cell API knows the tray by.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// The barcode exactly as scanned.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for TrayBarcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for TrayBarcode {
    type Err = BarcodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_tray_barcode() {
        let tray = TrayBarcode::parse("11223344A").unwrap();
        assert_eq!(tray.serial(), "11223344");
        assert_eq!(tray.orientation(), Orientation::A);
        assert_eq!(tray.raw(), "11223344A");
    }

    #[test]
    fn test_lowercase_orientation() {
        let tray = TrayBarcode::parse("1234567c").unwrap();
        assert_eq!(tray.orientation(), Orientation::C);
        assert_eq!(tray.orientation().number(), 3);
    }

    #[test]
    fn test_rejects_short_serial() {
        assert!(TrayBarcode::parse("123456A").is_err());
    }

    #[test]
    fn test_rejects_bad_orientation() {
        assert!(TrayBarcode::parse("11223344E").is_err());
        assert!(TrayBarcode::parse("11223344").is_err());
        assert!(TrayBarcode::parse("A11223344").is_err());
    }

    proptest! {
        #[test]
        fn test_valid_barcodes_roundtrip_serial(serial in "[0-9]{7,12}", letter in "[A-Da-d]") {
            let raw = format!("{}{}", serial, letter);
            let tray = TrayBarcode::parse(&raw).unwrap();
            prop_assert_eq!(tray.serial(), serial.as_str());
            prop_assert_eq!(
                tray.orientation().letter(),
                letter.chars().next().unwrap().to_ascii_uppercase()
            );
        }
    }
}
