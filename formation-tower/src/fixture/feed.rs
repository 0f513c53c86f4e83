//! Feed listener: transport subscription into the telemetry cache.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::telemetry::TelemetryCache;
use crate::transport::Subscription;

/// Per-fixture loop feeding decoded frames into a [`TelemetryCache`].
///
/// A bad frame is logged and dropped; the loop only ends on cancellation or
/// when the transport drops the subscription.
pub struct FeedListener {
    cache: Arc<TelemetryCache>,
    subscription: Subscription,
}

impl FeedListener {
    pub fn new(cache: Arc<TelemetryCache>, subscription: Subscription) -> Self {
        Self {
            cache,
            subscription,
        }
    }

    /// Spawn the listener.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(mut self, cancel: CancellationToken) {
        let fixture = self.subscription.fixture();
        let mut frames: u64 = 0;
        let mut rejected: u64 = 0;

        debug!(fixture = %fixture, "feed listener started");

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break,
                frame = self.subscription.recv() => frame,
            };

            let Some(frame) = frame else {
                warn!(fixture = %fixture, "subscription closed, feed listener stopping");
                break;
            };

            frames += 1;
            match self.cache.ingest(&frame) {
                Ok(kind) => trace!(fixture = %fixture, kind = %kind, "telemetry updated"),
                Err(e) => {
                    rejected += 1;
                    warn!(fixture = %fixture, error = %e, "dropped telemetry frame");
                }
            }
        }

        info!(fixture = %fixture, frames, rejected, "feed listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{FixtureId, FixtureStatus};
    use std::time::Duration;

    #[tokio::test]
    async fn test_feed_updates_cache_and_survives_bad_frames() {
        let id: FixtureId = "01-01".parse().unwrap();
        let (tx, sub) = Subscription::channel(id);
        let cache = Arc::new(TelemetryCache::default());
        let cancel = CancellationToken::new();
        let handle = FeedListener::new(Arc::clone(&cache), sub).start(cancel.clone());

        tx.send(b"garbage".to_vec()).await.unwrap();
        tx.send(br#"{"fixture":"01-01","kind":"bogus"}"#.to_vec())
            .await
            .unwrap();
        tx.send(br#"{"fixture":"01-01","kind":"operational","payload":{"status":"READY"}}"#.to_vec())
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if let Ok(op) = cache.operational() {
                assert_eq!(op.status, FixtureStatus::Ready);
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "cache never updated");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_feed_stops_when_subscription_closes() {
        let id: FixtureId = "01-01".parse().unwrap();
        let (tx, sub) = Subscription::channel(id);
        let handle = FeedListener::new(Arc::new(TelemetryCache::default()), sub)
            .start(CancellationToken::new());
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
