//! Run command - serve every allowed fixture until interrupted.

use std::path::Path;

use tracing::info;

use super::common::RunningTower;
use crate::error::CliError;

/// Run the run command.
pub async fn run(config_path: &Path, simulate: bool) -> Result<(), CliError> {
    let tower = RunningTower::start(config_path, simulate, true).await?;

    let scheduled = match tower.service.schedule_idle().await {
        Ok(n) => n,
        Err(e) => {
            tower.shutdown().await;
            return Err(e.into());
        }
    };
    info!(fixtures = scheduled, "Tower running, press Ctrl+C to stop");

    let signal = tokio::signal::ctrl_c().await;
    info!("Shutting down");
    tower.shutdown().await;
    signal.map_err(CliError::Signal)
}
