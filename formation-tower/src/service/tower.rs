//! Tower service implementation.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::error::ServiceError;
use crate::barcode::TrayBarcode;
use crate::cellapi::{CellApi, HttpCellApi, MockCellApi};
use crate::config::{CellApiSettings, SharedConfig};
use crate::fixture::{FeedListener, FixtureId, FixtureRegistry};
use crate::statemachine::{Job, KeyedScheduler};
use crate::transport::{Publisher, Subscription};
use crate::workflow::{FaultLedger, WorkContext, Workflow, WorkflowDeps};

/// Build the Cell API client the settings ask for.
pub fn cell_api_from_config(settings: &CellApiSettings) -> Result<Arc<dyn CellApi>, ServiceError> {
    if settings.mock {
        warn!("Cell API mocked, results will not be reported");
        return Ok(Arc::new(MockCellApi::default()));
    }
    let client = HttpCellApi::new(
        settings.base_url.clone(),
        settings.endpoints.clone(),
        settings.timeout,
    )?;
    Ok(Arc::new(client))
}

/// A running tower: one feed and one workflow worker per fixture.
pub struct TowerService {
    config: SharedConfig,
    registry: Arc<FixtureRegistry>,
    scheduler: KeyedScheduler<FixtureId, Workflow>,
    faults: Arc<FaultLedger>,
    cancel: CancellationToken,
    feeds: Vec<JoinHandle<()>>,
}

impl TowerService {
    /// Build the registry, start the telemetry feeds and register a workflow
    /// per fixture. No job runs until one is scheduled.
    ///
    /// Subscriptions for fixtures the configuration does not name are dropped.
    pub fn start(
        config: SharedConfig,
        cell_api: Arc<dyn CellApi>,
        publisher: Arc<dyn Publisher>,
        subscriptions: Vec<Subscription>,
        cancel: CancellationToken,
    ) -> Result<Self, ServiceError> {
        let snapshot = config.snapshot();
        if snapshot.tower.fixtures.is_empty() {
            return Err(ServiceError::Config("no fixtures configured".to_string()));
        }

        let registry = Arc::new(FixtureRegistry::new(
            snapshot.tower.fixtures.iter().copied(),
            snapshot.telemetry.expiry(),
            snapshot.workflow.mailbox_timeout,
        ));

        let mut feeds = Vec::new();
        for subscription in subscriptions {
            match registry.get(&subscription.fixture()) {
                Some(entry) => {
                    let listener = FeedListener::new(entry.telemetry().clone(), subscription);
                    feeds.push(listener.start(cancel.clone()));
                }
                None => warn!(
                    fixture = %subscription.fixture(),
                    "Subscription for unconfigured fixture dropped"
                ),
            }
        }

        let faults = Arc::new(FaultLedger::new());
        let scheduler: KeyedScheduler<FixtureId, Workflow> =
            KeyedScheduler::new(snapshot.workflow.queue_depth);
        for entry in registry.entries() {
            let deps = WorkflowDeps::new(
                entry.clone(),
                config.clone(),
                cell_api.clone(),
                publisher.clone(),
                faults.clone(),
                cancel.clone(),
            );
            scheduler.register(entry.id(), Workflow::new(deps))?;
        }

        info!(
            fixtures = registry.len(),
            feeds = feeds.len(),
            line = %snapshot.tower.line,
            aisle = %snapshot.tower.aisle,
            "Tower started"
        );

        Ok(Self {
            config,
            registry,
            scheduler,
            faults,
            cancel,
            feeds,
        })
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Admission control and telemetry reads.
    pub fn registry(&self) -> &Arc<FixtureRegistry> {
        &self.registry
    }

    pub fn faults(&self) -> &Arc<FaultLedger> {
        &self.faults
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Start the long-running idle cycle on every allowed fixture.
    pub async fn schedule_idle(&self) -> Result<usize, ServiceError> {
        let config = self.config.snapshot();
        let mut scheduled = 0;
        for id in self.registry.ids() {
            if !config.tower.is_allowed(&id) {
                info!(fixture = %id, "Fixture not allowed, left out of service");
                continue;
            }
            self.schedule(id, WorkContext::default()).await?;
            scheduled += 1;
        }
        Ok(scheduled)
    }

    /// Queue a single-shot job for a tray on a fixture.
    ///
    /// `fixture` may be a full barcode or a `CC-LL` id.
    pub async fn submit_manual(
        &self,
        tray: &str,
        fixture: &str,
        mock: bool,
    ) -> Result<FixtureId, ServiceError> {
        let config = self.config.snapshot();
        let tray = TrayBarcode::parse(tray)?;
        let id = self.registry.resolve(fixture)?;
        let barcode = config.tower.fixture_barcode(id)?;

        info!(fixture = %id, tray = %tray, mock, "Manual job submitted");
        self.schedule(id, WorkContext::manual(tray, barcode).with_mock(mock))
            .await?;
        Ok(id)
    }

    /// Queue a job for one fixture behind any earlier job.
    pub async fn schedule(&self, id: FixtureId, context: WorkContext) -> Result<(), ServiceError> {
        self.scheduler.schedule(Job::new(id, context)).await?;
        Ok(())
    }

    /// Cancel every workflow and feed and wait for them to finish.
    pub async fn shutdown(self) {
        info!("Tower shutting down");
        self.cancel.cancel();
        self.scheduler.shutdown().await;
        for feed in self.feeds {
            if let Err(e) = feed.await {
                warn!(error = %e, "Feed listener ended abnormally");
            }
        }
        info!("Tower stopped");
    }
}
