//! UDP transport.
//!
//! Every datagram carries one JSON [`Envelope`](crate::fixture::Envelope).
//! The router reads the envelope's `fixture` field and forwards the raw
//! frame to that fixture's subscription; decoding the payload is left to the
//! feed listener.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{PublishFuture, Publisher, Subscription, TransportError};
use crate::fixture::FixtureId;

/// Largest datagram accepted.
const MAX_FRAME_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct UdpTransportConfig {
    /// Address inbound fixture telemetry arrives on
    pub listen_addr: SocketAddr,
    /// Address outbound commands are sent to (the field-bus gateway)
    pub publish_addr: SocketAddr,
    /// Receive timeout used to poll for cancellation
    pub recv_timeout: Duration,
}

impl Default for UdpTransportConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 13170)),
            publish_addr: SocketAddr::from(([127, 0, 0, 1], 13171)),
            recv_timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Deserialize)]
struct Route {
    #[serde(default)]
    fixture: String,
}

/// Transport over a single UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    config: UdpTransportConfig,
    routes: HashMap<FixtureId, mpsc::Sender<Vec<u8>>>,
}

impl UdpTransport {
    /// Bind the listen address and create one subscription per fixture.
    pub async fn bind(
        config: UdpTransportConfig,
        fixtures: impl IntoIterator<Item = FixtureId>,
    ) -> Result<(Self, Vec<Subscription>), TransportError> {
        let socket = UdpSocket::bind(config.listen_addr)
            .await
            .map_err(|e| TransportError::Bind {
                addr: config.listen_addr.to_string(),
                source: e,
            })?;

        info!(
            listen_addr = %config.listen_addr,
            publish_addr = %config.publish_addr,
            "UDP transport bound"
        );

        let mut routes = HashMap::new();
        let mut subscriptions = Vec::new();
        for id in fixtures {
            let (tx, sub) = Subscription::channel(id);
            routes.insert(id, tx);
            subscriptions.push(sub);
        }

        let transport = Self {
            socket: Arc::new(socket),
            config,
            routes,
        };
        Ok((transport, subscriptions))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Start routing inbound datagrams until cancelled.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(cancel).await })
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut buffer = vec![0u8; MAX_FRAME_SIZE];
        let mut frames_routed: u64 = 0;
        let mut frames_dropped: u64 = 0;

        loop {
            let recv = tokio::select! {
                _ = cancel.cancelled() => break,
                r = tokio::time::timeout(
                    self.config.recv_timeout,
                    self.socket.recv_from(&mut buffer),
                ) => r,
            };

            match recv {
                Ok(Ok((len, from))) => {
                    if self.route(&buffer[..len]) {
                        frames_routed += 1;
                    } else {
                        frames_dropped += 1;
                        debug!(from = %from, len, "dropped unroutable frame");
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "UDP receive error");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(_) => trace!("no fixture traffic (timeout)"),
            }
        }

        info!(frames_routed, frames_dropped, "UDP transport stopped");
    }

    /// Forward one frame. Never waits on a slow subscriber.
    fn route(&self, frame: &[u8]) -> bool {
        let Ok(route) = serde_json::from_slice::<Route>(frame) else {
            return false;
        };
        let Ok(id) = route.fixture.parse::<FixtureId>() else {
            return false;
        };
        let Some(tx) = self.routes.get(&id) else {
            return false;
        };
        match tx.try_send(frame.to_vec()) {
            Ok(()) => true,
            Err(e) => {
                warn!(fixture = %id, error = %e, "subscription backlog, frame dropped");
                false
            }
        }
    }
}

impl Publisher for UdpTransport {
    fn publish<'a>(&'a self, fixture: &'a FixtureId, frame: Vec<u8>) -> PublishFuture<'a> {
        Box::pin(async move {
            if !self.routes.contains_key(fixture) {
                return Err(TransportError::UnknownFixture(*fixture));
            }
            self.socket.send_to(&frame, self.config.publish_addr).await?;
            trace!(fixture = %fixture, len = frame.len(), "frame published");
            Ok(())
        })
    }
}
