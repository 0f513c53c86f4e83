//! Tower-wide record of fixture faults per tray.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::fixture::FixtureId;

/// Which fixtures each tray has faulted on.
///
/// Shared by every workflow in the tower so a tray that keeps faulting
/// can be held instead of being routed to yet another fixture.
#[derive(Debug, Default)]
pub struct FaultLedger {
    faults: Mutex<HashMap<String, HashSet<FixtureId>>>,
}

impl FaultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fault and return the number of distinct fixtures the tray
    /// has now faulted on.
    pub fn record(&self, tray: &str, fixture: FixtureId) -> usize {
        let mut faults = self.faults.lock();
        let fixtures = faults.entry(tray.to_string()).or_default();
        fixtures.insert(fixture);
        fixtures.len()
    }

    pub fn count(&self, tray: &str) -> usize {
        self.faults.lock().get(tray).map_or(0, HashSet::len)
    }

    /// Forget a tray, e.g. once it has been held.
    pub fn clear(&self, tray: &str) {
        self.faults.lock().remove(tray);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_distinct_fixtures() {
        let ledger = FaultLedger::new();
        let a: FixtureId = "01-01".parse().unwrap();
        let b: FixtureId = "01-02".parse().unwrap();

        assert_eq!(ledger.record("1122", a), 1);
        assert_eq!(ledger.record("1122", a), 1);
        assert_eq!(ledger.record("1122", b), 2);
        assert_eq!(ledger.count("other"), 0);

        ledger.clear("1122");
        assert_eq!(ledger.count("1122"), 0);
    }
}
