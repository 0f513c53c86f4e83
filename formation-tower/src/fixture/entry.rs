//! Registry entry: the shared handle for one fixture.

use std::sync::Arc;

use parking_lot::Mutex;

use super::handoff::{LoadRequest, Reservation, Unreserve};
use super::mailbox::Mailbox;
use super::report::CycleReport;
use super::status::{AvailabilityCell, AvailabilityStatus};
use super::telemetry::{TelemetryCache, TelemetryExpiry};
use super::FixtureId;

/// Everything the outside world and the fixture's workflow share.
///
/// One instance per fixture, created at startup and shared through `Arc`
/// between the scheduler worker, the feed listener and admission control.
#[derive(Debug)]
pub struct FixtureEntry {
    id: FixtureId,
    telemetry: Arc<TelemetryCache>,
    prepared_for_delivery: Mailbox<Reservation>,
    load_complete: Mailbox<LoadRequest>,
    unreserve: Mailbox<Unreserve>,
    status: AvailabilityCell,
    last_report: Mutex<Option<CycleReport>>,
}

impl FixtureEntry {
    pub fn new(id: FixtureId, expiry: TelemetryExpiry) -> Self {
        Self {
            id,
            telemetry: Arc::new(TelemetryCache::new(expiry)),
            prepared_for_delivery: Mailbox::new("prepared_for_delivery"),
            load_complete: Mailbox::new("load_complete"),
            unreserve: Mailbox::closed("unreserve"),
            status: AvailabilityCell::default(),
            last_report: Mutex::new(None),
        }
    }

    pub fn id(&self) -> FixtureId {
        self.id
    }

    pub fn telemetry(&self) -> &Arc<TelemetryCache> {
        &self.telemetry
    }

    pub fn prepared_for_delivery(&self) -> &Mailbox<Reservation> {
        &self.prepared_for_delivery
    }

    pub fn load_complete(&self) -> &Mailbox<LoadRequest> {
        &self.load_complete
    }

    pub fn unreserve(&self) -> &Mailbox<Unreserve> {
        &self.unreserve
    }

    pub fn status(&self) -> AvailabilityStatus {
        self.status.get()
    }

    /// Only the workflow currently driving this fixture calls this.
    pub(crate) fn set_status(&self, status: AvailabilityStatus) {
        let previous = self.status.get();
        if previous != status {
            tracing::debug!(
                fixture = %self.id,
                from = %previous,
                to = %status,
                "availability changed"
            );
        }
        self.status.set(status);
    }

    /// Report from the most recently finished cycle.
    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report.lock().clone()
    }

    pub(crate) fn record_report(&self, report: CycleReport) {
        *self.last_report.lock() = Some(report);
    }
}
