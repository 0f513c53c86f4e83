//! Fixtures: identity, telemetry, handoff mailboxes and the registry.
//!
//! # Module Structure
//!
//! - [`id`]: `CC-LL` fixture addressing
//! - [`message`]: decoded operational/diagnostic/alert telemetry
//! - [`telemetry`]: freshness-checked telemetry cache
//! - [`feed`]: subscription-to-cache listener
//! - [`mailbox`]: depth-1 handoff channels
//! - [`entry`]: the shared per-fixture handle
//! - [`registry`]: all fixtures plus admission control

pub mod entry;
pub mod feed;
pub mod handoff;
pub mod id;
pub mod mailbox;
pub mod message;
pub mod registry;
pub mod report;
pub mod status;
pub mod telemetry;

pub use entry::FixtureEntry;
pub use feed::FeedListener;
pub use handoff::{LoadRequest, Reservation, Unreserve};
pub use id::FixtureId;
pub use mailbox::{Mailbox, MailboxError};
pub use message::{
    Alert, CellReading, CellStatus, Diagnostic, Envelope, FixtureInfo, FixtureStatus, MessageKind,
    Operational, TelemetryMessage,
};
pub use registry::{AdmissionError, FixtureRegistry, DEFAULT_MAILBOX_TIMEOUT};
pub use report::CycleReport;
pub use status::{AvailabilityCell, AvailabilityStatus};
pub use telemetry::{
    Snapshot, TelemetryCache, TelemetryError, TelemetryExpiry, DEFAULT_TELEMETRY_EXPIRY,
};
