//! Per-fixture telemetry cache.
//!
//! Keeps the most recent message of each kind together with the instant it
//! was received. Operational and diagnostic reads are freshness-checked
//! against a configured expiry; alerts are historical and never expire.
//!
//! The feed listener is the only writer. Readers take a short read lock and
//! clone the message out, so a reader never holds a lock across an await.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use thiserror::Error;

use super::message::{Alert, Diagnostic, Envelope, MessageKind, Operational, TelemetryMessage};

/// Default expiry for operational and diagnostic records.
pub const DEFAULT_TELEMETRY_EXPIRY: Duration = Duration::from_secs(10);

/// Errors from the telemetry cache.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Envelope kind is not operational, diagnostic or alert
    #[error("unknown telemetry message kind '{0}'")]
    UnknownMessageKind(String),

    /// Record is older than its expiry, or was never received
    #[error("stale telemetry: last seen {last_seen:?}, expiry {expiry:?}")]
    StaleData {
        last_seen: Option<Instant>,
        expiry: Duration,
    },

    /// No alert has arrived since startup
    #[error("no alert received")]
    NoAlertReceived,

    /// Frame or payload failed to decode
    #[error("telemetry decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TelemetryError {
    pub fn is_stale(&self) -> bool {
        matches!(self, TelemetryError::StaleData { .. })
    }
}

/// Per-kind expiry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryExpiry {
    pub operational: Duration,
    pub diagnostic: Duration,
}

impl Default for TelemetryExpiry {
    fn default() -> Self {
        Self {
            operational: DEFAULT_TELEMETRY_EXPIRY,
            diagnostic: DEFAULT_TELEMETRY_EXPIRY,
        }
    }
}

/// A cached message with the instant it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub message: T,
    pub received_at: Instant,
}

#[derive(Debug)]
struct Record<T> {
    message: Option<T>,
    last_seen: Option<Instant>,
}

impl<T: Clone> Record<T> {
    fn empty() -> Self {
        Self {
            message: None,
            last_seen: None,
        }
    }

    fn store(&mut self, message: T, at: Instant) {
        self.message = Some(message);
        // one writer, but never let a back-dated update move time backwards
        self.last_seen = Some(self.last_seen.map_or(at, |prev| prev.max(at)));
    }

    fn fresh(&self, now: Instant, expiry: Duration) -> Result<Snapshot<T>, TelemetryError> {
        match (&self.message, self.last_seen) {
            (Some(message), Some(seen)) if now.saturating_duration_since(seen) <= expiry => {
                Ok(Snapshot {
                    message: message.clone(),
                    received_at: seen,
                })
            }
            _ => Err(TelemetryError::StaleData {
                last_seen: self.last_seen,
                expiry,
            }),
        }
    }
}

/// Latest telemetry for one fixture.
#[derive(Debug)]
pub struct TelemetryCache {
    operational: RwLock<Record<Operational>>,
    diagnostic: RwLock<Record<Diagnostic>>,
    alert: RwLock<Record<Alert>>,
    expiry: TelemetryExpiry,
}

impl TelemetryCache {
    pub fn new(expiry: TelemetryExpiry) -> Self {
        Self {
            operational: RwLock::new(Record::empty()),
            diagnostic: RwLock::new(Record::empty()),
            alert: RwLock::new(Record::empty()),
            expiry,
        }
    }

    pub fn expiry(&self) -> TelemetryExpiry {
        self.expiry
    }

    /// Decode a raw frame and store it.
    pub fn ingest(&self, frame: &[u8]) -> Result<MessageKind, TelemetryError> {
        let envelope = Envelope::decode(frame)?;
        self.update(envelope)
    }

    /// Classify an envelope and overwrite the record for its kind.
    pub fn update(&self, envelope: Envelope) -> Result<MessageKind, TelemetryError> {
        self.update_at(envelope, Instant::now())
    }

    /// Like [`update`](Self::update) with an explicit receive instant.
    pub fn update_at(
        &self,
        envelope: Envelope,
        received_at: Instant,
    ) -> Result<MessageKind, TelemetryError> {
        let kind = MessageKind::from_wire(&envelope.kind)
            .ok_or_else(|| TelemetryError::UnknownMessageKind(envelope.kind.clone()))?;

        let message = match kind {
            MessageKind::Operational => {
                TelemetryMessage::Operational(serde_json::from_value(envelope.payload)?)
            }
            MessageKind::Diagnostic => {
                TelemetryMessage::Diagnostic(serde_json::from_value(envelope.payload)?)
            }
            MessageKind::Alert => {
                TelemetryMessage::Alert(serde_json::from_value(envelope.payload)?)
            }
        };

        self.store_at(message, received_at);
        Ok(kind)
    }

    /// Store an already-typed message.
    pub fn store(&self, message: TelemetryMessage) {
        self.store_at(message, Instant::now());
    }

    pub fn store_at(&self, message: TelemetryMessage, received_at: Instant) {
        match message {
            TelemetryMessage::Operational(m) => self.operational.write().store(m, received_at),
            TelemetryMessage::Diagnostic(m) => self.diagnostic.write().store(m, received_at),
            TelemetryMessage::Alert(m) => self.alert.write().store(m, received_at),
        }
    }

    /// Latest operational message, if fresh.
    pub fn operational(&self) -> Result<Operational, TelemetryError> {
        self.operational_at(Instant::now()).map(|s| s.message)
    }

    /// Operational snapshot judged fresh or stale as of `now`.
    pub fn operational_at(&self, now: Instant) -> Result<Snapshot<Operational>, TelemetryError> {
        self.operational.read().fresh(now, self.expiry.operational)
    }

    /// Latest diagnostic message, if fresh.
    pub fn diagnostic(&self) -> Result<Diagnostic, TelemetryError> {
        self.diagnostic_at(Instant::now()).map(|s| s.message)
    }

    pub fn diagnostic_at(&self, now: Instant) -> Result<Snapshot<Diagnostic>, TelemetryError> {
        self.diagnostic.read().fresh(now, self.expiry.diagnostic)
    }

    /// Most recent alert regardless of age.
    pub fn alert(&self) -> Result<Alert, TelemetryError> {
        self.alert
            .read()
            .message
            .clone()
            .ok_or(TelemetryError::NoAlertReceived)
    }

    /// When the given kind was last updated.
    pub fn last_seen(&self, kind: MessageKind) -> Option<Instant> {
        match kind {
            MessageKind::Operational => self.operational.read().last_seen,
            MessageKind::Diagnostic => self.diagnostic.read().last_seen,
            MessageKind::Alert => self.alert.read().last_seen,
        }
    }
}

impl Default for TelemetryCache {
    fn default() -> Self {
        Self::new(TelemetryExpiry::default())
    }
}
