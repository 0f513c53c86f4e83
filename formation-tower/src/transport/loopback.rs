//! In-process transport.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{PublishFuture, Publisher, Subscription, TransportError};
use crate::fixture::{Envelope, FixtureId, TelemetryMessage};

/// Transport that keeps everything in memory.
///
/// Inbound frames are injected with [`inject`](Self::inject); published
/// frames are recorded and, once [`tap`](Self::tap) has been called, also
/// forwarded to the tap receiver.
#[derive(Debug)]
pub struct LoopbackTransport {
    inbound: HashMap<FixtureId, mpsc::Sender<Vec<u8>>>,
    published: Mutex<Vec<(FixtureId, Vec<u8>)>>,
    tap: Mutex<Option<mpsc::UnboundedSender<(FixtureId, Vec<u8>)>>>,
}

impl LoopbackTransport {
    /// Create a transport for the given fixtures and their subscriptions.
    pub fn new(fixtures: impl IntoIterator<Item = FixtureId>) -> (Self, Vec<Subscription>) {
        let mut inbound = HashMap::new();
        let mut subscriptions = Vec::new();
        for id in fixtures {
            let (tx, sub) = Subscription::channel(id);
            inbound.insert(id, tx);
            subscriptions.push(sub);
        }

        let transport = Self {
            inbound,
            published: Mutex::new(Vec::new()),
            tap: Mutex::new(None),
        };
        (transport, subscriptions)
    }

    /// Deliver a raw inbound frame to a fixture's subscription.
    pub async fn inject(&self, fixture: &FixtureId, frame: Vec<u8>) -> Result<(), TransportError> {
        let tx = self
            .inbound
            .get(fixture)
            .ok_or(TransportError::UnknownFixture(*fixture))?;
        tx.send(frame)
            .await
            .map_err(|_| TransportError::Closed(*fixture))
    }

    /// Encode and deliver a typed message.
    pub async fn inject_message(
        &self,
        fixture: &FixtureId,
        message: &TelemetryMessage,
    ) -> Result<(), TransportError> {
        let frame = Envelope::from_message(fixture.to_string(), message)?.encode()?;
        self.inject(fixture, frame).await
    }

    /// Route published frames to a receiver as well as the record.
    pub fn tap(&self) -> mpsc::UnboundedReceiver<(FixtureId, Vec<u8>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tap.lock() = Some(tx);
        rx
    }

    /// Every frame published so far.
    pub fn published(&self) -> Vec<(FixtureId, Vec<u8>)> {
        self.published.lock().clone()
    }

    /// Decoded envelopes published to one fixture.
    pub fn published_to(&self, fixture: &FixtureId) -> Vec<Envelope> {
        self.published
            .lock()
            .iter()
            .filter(|(id, _)| id == fixture)
            .filter_map(|(_, frame)| Envelope::decode(frame).ok())
            .collect()
    }
}

impl Publisher for LoopbackTransport {
    fn publish<'a>(&'a self, fixture: &'a FixtureId, frame: Vec<u8>) -> PublishFuture<'a> {
        Box::pin(async move {
            if !self.inbound.contains_key(fixture) {
                return Err(TransportError::UnknownFixture(*fixture));
            }
            if let Some(tap) = self.tap.lock().as_ref() {
                let _ = tap.send((*fixture, frame.clone()));
            }
            self.published.lock().push((*fixture, frame));
            Ok(())
        })
    }
}
