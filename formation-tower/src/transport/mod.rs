//! Transport between the tower and its fixtures.
//!
//! The workflow only needs two things from a transport: a way to publish a
//! frame to a named fixture, and a per-fixture stream of inbound frames.
//!
//! - [`LoopbackTransport`]: in-process, used by tests and simulation
//! - [`UdpTransport`]: datagrams routed by their `fixture` field

mod loopback;
mod simulator;
mod udp;

pub use loopback::LoopbackTransport;
pub use simulator::{FixtureSimulator, SimulatorConfig};
pub use udp::{UdpTransport, UdpTransportConfig};

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::fixture::FixtureId;

/// Inbound frames buffered per fixture before the router starts dropping.
pub const SUBSCRIPTION_CAPACITY: usize = 64;

/// Errors from publishing or routing frames.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("no route to fixture {0}")]
    UnknownFixture(FixtureId),

    #[error("subscription for fixture {0} is closed")]
    Closed(FixtureId),
}

/// Boxed future returned by [`Publisher::publish`].
pub type PublishFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;

/// Outbound half of a transport.
pub trait Publisher: Send + Sync {
    /// Send one frame to a fixture. Delivery is at-most-once.
    fn publish<'a>(&'a self, fixture: &'a FixtureId, frame: Vec<u8>) -> PublishFuture<'a>;
}

/// Inbound frames for one fixture.
#[derive(Debug)]
pub struct Subscription {
    fixture: FixtureId,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl Subscription {
    pub fn new(fixture: FixtureId, rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { fixture, rx }
    }

    /// Create a subscription with its sending half.
    pub fn channel(fixture: FixtureId) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        (tx, Self::new(fixture, rx))
    }

    pub fn fixture(&self) -> FixtureId {
        self.fixture
    }

    /// Next frame, or `None` once the transport side has gone away.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}
