//! Fixture registry and admission control.
//!
//! The registry is built once at startup from the configured fixture list and
//! never changes afterwards. Admission checks read a fixture's availability
//! before handing a signal to its workflow; a signal the fixture cannot act
//! on right now is rejected here rather than queued.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::entry::FixtureEntry;
use super::handoff::{LoadRequest, Reservation, Unreserve};
use super::mailbox::MailboxError;
use super::message::{Alert, Diagnostic, Operational};
use super::status::AvailabilityStatus;
use super::telemetry::{TelemetryError, TelemetryExpiry};
use super::FixtureId;
use crate::barcode::{BarcodeError, FixtureBarcode};

/// Default time a submitter waits for a fixture's mailbox slot.
pub const DEFAULT_MAILBOX_TIMEOUT: Duration = Duration::from_secs(5);

/// Reasons a submission was not delivered.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("fixture {0} is not registered")]
    UnknownFixture(String),

    #[error("fixture {fixture} is not accepting {signal} while {status}")]
    NotAccepting {
        fixture: FixtureId,
        signal: &'static str,
        status: AvailabilityStatus,
    },

    #[error("load for fixture {0} has no transaction id")]
    MissingTransactionId(FixtureId),

    #[error("invalid fixture: {0}")]
    Barcode(#[from] BarcodeError),

    #[error("delivery failed: {0}")]
    Mailbox(#[from] MailboxError),
}

/// Immutable map of every fixture this tower drives.
#[derive(Debug)]
pub struct FixtureRegistry {
    entries: HashMap<FixtureId, Arc<FixtureEntry>>,
    mailbox_timeout: Duration,
}

impl FixtureRegistry {
    pub fn new(
        fixtures: impl IntoIterator<Item = FixtureId>,
        expiry: TelemetryExpiry,
        mailbox_timeout: Duration,
    ) -> Self {
        let entries = fixtures
            .into_iter()
            .map(|id| (id, Arc::new(FixtureEntry::new(id, expiry))))
            .collect();
        Self {
            entries,
            mailbox_timeout,
        }
    }

    pub fn get(&self, id: &FixtureId) -> Option<&Arc<FixtureEntry>> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fixture ids in column/level order.
    pub fn ids(&self) -> Vec<FixtureId> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<FixtureEntry>> {
        self.entries.values()
    }

    fn entry(&self, id: &FixtureId) -> Result<&Arc<FixtureEntry>, AdmissionError> {
        self.entries
            .get(id)
            .ok_or_else(|| AdmissionError::UnknownFixture(id.to_string()))
    }

    /// Resolve a fixture given either as a full barcode or a `CC-LL` id.
    pub fn resolve(&self, fixture: &str) -> Result<FixtureId, AdmissionError> {
        let id = match fixture.parse::<FixtureId>() {
            Ok(id) => id,
            Err(_) => FixtureBarcode::parse(fixture)?.fixture_id()?,
        };
        if !self.entries.contains_key(&id) {
            return Err(AdmissionError::UnknownFixture(fixture.to_string()));
        }
        Ok(id)
    }

    /// Availability of every fixture, keyed by id.
    pub fn availability(&self) -> BTreeMap<FixtureId, AvailabilityStatus> {
        self.entries
            .iter()
            .map(|(id, entry)| (*id, entry.status()))
            .collect()
    }

    /// Hand a delivery reservation to an idle fixture.
    pub async fn submit_reservation(
        &self,
        tray: &str,
        fixture: &str,
    ) -> Result<(), AdmissionError> {
        let id = self.resolve(fixture)?;
        let entry = self.entry(&id)?;

        let status = entry.status();
        if status == AvailabilityStatus::Unknown
            || status > AvailabilityStatus::WaitingForReservation
        {
            return Err(AdmissionError::NotAccepting {
                fixture: id,
                signal: "reservation",
                status,
            });
        }

        entry
            .prepared_for_delivery()
            .send(Reservation::new(tray, fixture), self.mailbox_timeout)
            .await
            .map_err(|e| refused(entry, "reservation", e))?;
        info!(fixture = %id, tray, "reservation delivered");
        Ok(())
    }

    /// Hand a load-complete signal to a fixture that is not yet running.
    pub async fn submit_load(&self, load: LoadRequest) -> Result<(), AdmissionError> {
        let id = FixtureId::new(load.column, load.level)?;
        let entry = self.entry(&id)?;

        let status = entry.status();
        if status == AvailabilityStatus::Unknown || status > AvailabilityStatus::WaitingForLoad {
            return Err(AdmissionError::NotAccepting {
                fixture: id,
                signal: "load",
                status,
            });
        }
        if load.transaction_id.trim().is_empty() {
            return Err(AdmissionError::MissingTransactionId(id));
        }

        let tray = load.tray.clone();
        entry
            .load_complete()
            .send(load, self.mailbox_timeout)
            .await
            .map_err(|e| refused(entry, "load", e))?;
        info!(fixture = %id, tray = %tray, "load delivered");
        Ok(())
    }

    /// Best-effort cancellation of a reservation.
    ///
    /// Returns `true` when the signal was handed over, `false` when the
    /// fixture was not waiting for a load or nobody was listening.
    pub fn submit_unreserve(&self, id: &FixtureId) -> Result<bool, AdmissionError> {
        let entry = self.entry(id)?;

        if entry.status() != AvailabilityStatus::WaitingForLoad {
            debug!(fixture = %id, status = %entry.status(), "unreserve ignored");
            return Ok(false);
        }

        match entry.unreserve().try_send(Unreserve) {
            Ok(()) => {
                info!(fixture = %id, "unreserve delivered");
                Ok(true)
            }
            Err(MailboxError::NotAccepting { .. }) => {
                debug!(fixture = %id, "unreserve dropped, nobody listening");
                Ok(false)
            }
            Err(e) => {
                warn!(fixture = %id, error = %e, "unreserve dropped");
                Ok(false)
            }
        }
    }

    pub fn operational(
        &self,
        id: &FixtureId,
    ) -> Result<Result<Operational, TelemetryError>, AdmissionError> {
        Ok(self.entry(id)?.telemetry().operational())
    }

    pub fn diagnostic(
        &self,
        id: &FixtureId,
    ) -> Result<Result<Diagnostic, TelemetryError>, AdmissionError> {
        Ok(self.entry(id)?.telemetry().diagnostic())
    }

    pub fn alert(
        &self,
        id: &FixtureId,
    ) -> Result<Result<Alert, TelemetryError>, AdmissionError> {
        Ok(self.entry(id)?.telemetry().alert())
    }
}

/// A closed mailbox means the workflow moved past the state that takes `signal`.
fn refused(entry: &FixtureEntry, signal: &'static str, error: MailboxError) -> AdmissionError {
    match error {
        MailboxError::NotAccepting { .. } => AdmissionError::NotAccepting {
            fixture: entry.id(),
            signal,
            status: entry.status(),
        },
        other => AdmissionError::Mailbox(other),
    }
}
