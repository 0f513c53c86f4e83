//! Decoded fixture telemetry.
//!
//! Fixtures report three kinds of message, each wrapped in an [`Envelope`]
//! naming the fixture and the payload kind:
//!
//! - **operational**: equipment status, the running recipe's identity and
//!   per-channel cell readings
//! - **diagnostic**: free-form sensor readings
//! - **alert**: historical alarm records, including fire alarms

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Equipment status reported in an operational message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixtureStatus {
    #[default]
    Unknown,
    Idle,
    Ready,
    Active,
    Complete,
    Faulted,
}

impl FixtureStatus {
    /// Whether a running recipe has stopped, successfully or not.
    pub fn is_finished(&self) -> bool {
        matches!(self, FixtureStatus::Complete | FixtureStatus::Faulted)
    }
}

impl fmt::Display for FixtureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FixtureStatus::Unknown => "UNKNOWN",
            FixtureStatus::Idle => "IDLE",
            FixtureStatus::Ready => "READY",
            FixtureStatus::Active => "ACTIVE",
            FixtureStatus::Complete => "COMPLETE",
            FixtureStatus::Faulted => "FAULTED",
        };
        f.write_str(name)
    }
}

/// Per-channel outcome of a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellStatus {
    #[default]
    None,
    Complete,
    Failed,
}

/// Identity of the recipe a fixture is running, echoed back by the fixture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureInfo {
    pub tray_barcode: String,
    pub fixture_location: String,
    pub recipe_name: String,
    pub recipe_version: u32,
    pub transaction_id: String,
    pub process_step: String,
}

/// One channel's reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellReading {
    pub status: CellStatus,
    pub voltage: f32,
    pub current: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Operational {
    pub status: FixtureStatus,
    pub info: Option<FixtureInfo>,
    /// Readings in fixture channel order
    pub cells: Vec<CellReading>,
    pub fire_alarm: bool,
}

impl Operational {
    /// Transaction id the fixture is currently running, if any.
    pub fn transaction_id(&self) -> Option<&str> {
        self.info
            .as_ref()
            .map(|i| i.transaction_id.as_str())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Diagnostic {
    pub readings: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Alert {
    pub code: String,
    pub message: String,
    pub fire_alarm: bool,
}

/// Kinds of message the telemetry cache keeps a record for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Operational,
    Diagnostic,
    Alert,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Operational => "operational",
            MessageKind::Diagnostic => "diagnostic",
            MessageKind::Alert => "alert",
        }
    }

    /// Classify an envelope kind string.
    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "operational" => Some(MessageKind::Operational),
            "diagnostic" => Some(MessageKind::Diagnostic),
            "alert" => Some(MessageKind::Alert),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed telemetry message.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryMessage {
    Operational(Operational),
    Diagnostic(Diagnostic),
    Alert(Alert),
}

impl TelemetryMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            TelemetryMessage::Operational(_) => MessageKind::Operational,
            TelemetryMessage::Diagnostic(_) => MessageKind::Diagnostic,
            TelemetryMessage::Alert(_) => MessageKind::Alert,
        }
    }
}

/// Wire frame exchanged with fixtures in both directions.
///
/// The payload is left undecoded until the kind has been classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub fixture: String,
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Wrap a typed message for the given fixture.
    pub fn from_message(
        fixture: impl Into<String>,
        message: &TelemetryMessage,
    ) -> Result<Self, serde_json::Error> {
        let payload = match message {
            TelemetryMessage::Operational(m) => serde_json::to_value(m)?,
            TelemetryMessage::Diagnostic(m) => serde_json::to_value(m)?,
            TelemetryMessage::Alert(m) => serde_json::to_value(m)?,
        };
        Ok(Self {
            fixture: fixture.into(),
            kind: message.kind().as_str().to_string(),
            payload,
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_operational_envelope() {
        let raw = br#"{
            "fixture": "01-01",
            "kind": "operational",
            "payload": {
                "status": "FAULTED",
                "info": {"tray_barcode": "11223344A", "transaction_id": "txn-9"},
                "cells": [{"status": "FAILED", "voltage": 3.1}]
            }
        }"#;

        let envelope = Envelope::decode(raw).unwrap();
        assert_eq!(envelope.fixture, "01-01");
        assert_eq!(MessageKind::from_wire(&envelope.kind), Some(MessageKind::Operational));

        let op: Operational = serde_json::from_value(envelope.payload).unwrap();
        assert_eq!(op.status, FixtureStatus::Faulted);
        assert_eq!(op.transaction_id(), Some("txn-9"));
        assert_eq!(op.cells[0].status, CellStatus::Failed);
        assert!(!op.fire_alarm);
    }

    #[test]
    fn test_empty_transaction_id_is_none() {
        let op = Operational {
            info: Some(FixtureInfo::default()),
            ..Default::default()
        };
        assert_eq!(op.transaction_id(), None);
    }

    #[test]
    fn test_unknown_kind_is_not_classified() {
        assert_eq!(MessageKind::from_wire("heartbeat"), None);
    }

    #[test]
    fn test_from_message_sets_kind() {
        let msg = TelemetryMessage::Alert(Alert {
            code: "E42".to_string(),
            ..Default::default()
        });
        let envelope = Envelope::from_message("02-01", &msg).unwrap();
        assert_eq!(envelope.kind, "alert");
        assert_eq!(envelope.payload["code"], "E42");
    }
}
