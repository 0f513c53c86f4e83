//! Fixture availability as seen by admission control.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Where a fixture is in its workflow cycle.
///
/// Variants are declared in workflow order, so `a > b` means `a` is further
/// along the cycle than `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AvailabilityStatus {
    /// No workflow is driving the fixture
    Unknown = 0,
    /// Idle, accepting a delivery reservation
    WaitingForReservation = 1,
    /// Reserved, waiting for the tray to be loaded
    WaitingForLoad = 2,
    /// Recipe running
    Active = 3,
    /// Recipe finished, waiting for the tray to be removed
    Unloading = 4,
}

impl AvailabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityStatus::Unknown => "unknown",
            AvailabilityStatus::WaitingForReservation => "waiting_for_reservation",
            AvailabilityStatus::WaitingForLoad => "waiting_for_load",
            AvailabilityStatus::Active => "active",
            AvailabilityStatus::Unloading => "unloading",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => AvailabilityStatus::WaitingForReservation,
            2 => AvailabilityStatus::WaitingForLoad,
            3 => AvailabilityStatus::Active,
            4 => AvailabilityStatus::Unloading,
            _ => AvailabilityStatus::Unknown,
        }
    }
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-value cell holding a fixture's [`AvailabilityStatus`].
///
/// Reads never block; the workflow owning the fixture is the only writer.
#[derive(Debug)]
pub struct AvailabilityCell {
    value: AtomicU8,
}

impl AvailabilityCell {
    pub fn new(status: AvailabilityStatus) -> Self {
        Self {
            value: AtomicU8::new(status as u8),
        }
    }

    pub fn get(&self) -> AvailabilityStatus {
        AvailabilityStatus::from_u8(self.value.load(Ordering::Acquire))
    }

    pub fn set(&self, status: AvailabilityStatus) {
        self.value.store(status as u8, Ordering::Release);
    }
}

impl Default for AvailabilityCell {
    fn default() -> Self {
        Self::new(AvailabilityStatus::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_starts_unknown() {
        let cell = AvailabilityCell::default();
        assert_eq!(cell.get(), AvailabilityStatus::Unknown);
    }

    #[test]
    fn test_set_get() {
        let cell = AvailabilityCell::default();
        for status in [
            AvailabilityStatus::WaitingForReservation,
            AvailabilityStatus::WaitingForLoad,
            AvailabilityStatus::Active,
            AvailabilityStatus::Unloading,
            AvailabilityStatus::Unknown,
        ] {
            cell.set(status);
            assert_eq!(cell.get(), status);
        }
    }

    #[test]
    fn test_ordering_follows_cycle() {
        assert!(AvailabilityStatus::WaitingForLoad > AvailabilityStatus::WaitingForReservation);
        assert!(AvailabilityStatus::Active > AvailabilityStatus::WaitingForLoad);
        assert!(AvailabilityStatus::Unloading > AvailabilityStatus::Active);
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&AvailabilityStatus::WaitingForLoad).unwrap();
        assert_eq!(json, "\"waiting_for_load\"");
    }
}
