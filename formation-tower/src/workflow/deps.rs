//! Collaborators shared by every state of a fixture's workflow.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::faults::FaultLedger;
use crate::cellapi::{CellApi, MockCellApi};
use crate::config::SharedConfig;
use crate::fixture::FixtureEntry;
use crate::transport::Publisher;

/// Handles a workflow needs beyond its [`WorkContext`](super::WorkContext).
///
/// Cloning is cheap; every field is reference counted.
#[derive(Clone)]
pub struct WorkflowDeps {
    pub entry: Arc<FixtureEntry>,
    pub config: SharedConfig,
    pub cell_api: Arc<dyn CellApi>,
    /// Stands in for the Cell API on cycles flagged as mock
    pub mock_cell_api: Arc<MockCellApi>,
    pub publisher: Arc<dyn Publisher>,
    pub faults: Arc<FaultLedger>,
    pub cancel: CancellationToken,
}

impl WorkflowDeps {
    pub fn new(
        entry: Arc<FixtureEntry>,
        config: SharedConfig,
        cell_api: Arc<dyn CellApi>,
        publisher: Arc<dyn Publisher>,
        faults: Arc<FaultLedger>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            entry,
            config,
            cell_api,
            mock_cell_api: Arc::new(MockCellApi::default()),
            publisher,
            faults,
            cancel,
        }
    }

    pub fn with_mock_cell_api(mut self, mock: Arc<MockCellApi>) -> Self {
        self.mock_cell_api = mock;
        self
    }

    /// Cell API for a cycle.
    pub fn cell_api(&self, mock: bool) -> &dyn CellApi {
        if mock {
            self.mock_cell_api.as_ref()
        } else {
            self.cell_api.as_ref()
        }
    }
}

impl std::fmt::Debug for WorkflowDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowDeps")
            .field("fixture", &self.entry.id())
            .field("config_version", &self.config.version())
            .finish_non_exhaustive()
    }
}
