//! EndProcess: report results to the Cell API and record the cycle.
//!
//! Every Cell API call here is best effort. A failure is logged and the
//! fixture still moves on to Unloading.

use chrono::Utc;
use tracing::{info, warn};

use super::{Next, WorkContext, WorkflowDeps, WorkflowState};
use crate::cellapi::{CellApi, CellResult, CellStatusRequest, CellVerdict, TrayStatus};
use crate::config::TowerConfig;
use crate::fixture::{CellStatus, CycleReport};

pub(super) async fn run(deps: &WorkflowDeps, ctx: &mut WorkContext) -> Next {
    let config = deps.config.snapshot();
    let id = deps.entry.id();
    let api = deps.cell_api(ctx.mock);
    let tray = ctx.tray_serial().to_string();

    // Recovered cycles never fetched the tray's cells
    if ctx.cells.is_empty() && !ctx.skip_close && !ctx.readings.is_empty() {
        match api.cell_map(&tray).await {
            Ok(cells) => ctx.cells = cells,
            Err(e) => warn!(fixture = %id, tray = %tray, error = %e, "Failed to get cell map"),
        }
    }

    let results = cell_results(&config, ctx);
    report(api, &config, ctx, &results).await;

    if ctx.fixture_fault {
        record_fault(deps, &config, &tray, ctx.mock).await;
    }

    let passed = results
        .iter()
        .filter(|r| r.status == CellVerdict::Pass)
        .count();
    let failed = results.len() - passed;
    let summary = CycleReport {
        tray: ctx.tray_raw().to_string(),
        fixture: ctx.fixture_raw().to_string(),
        recipe_name: ctx.process_step.clone(),
        recipe_version: ctx.recipe_version,
        transaction_id: ctx.transaction_id.clone(),
        fixture_fault: ctx.fixture_fault,
        passed,
        failed,
        finished_at: Utc::now(),
    };
    if summary.fixture_fault {
        warn!(
            fixture = %id,
            tray = %summary.tray,
            passed,
            failed,
            "Fixture faulted, tray complete"
        );
    } else {
        info!(fixture = %id, tray = %summary.tray, passed, failed, "Tray complete");
    }
    deps.entry.record_report(summary);

    Next::To(WorkflowState::Unloading)
}

/// Pass/fail per cell present in the tray.
///
/// Channel `i` reads the cell at position `i` of the orientation's map. A
/// present cell passes only if its channel reported `COMPLETE`.
fn cell_results(config: &TowerConfig, ctx: &WorkContext) -> Vec<CellResult> {
    let Some(tray) = &ctx.tray else {
        return Vec::new();
    };
    let Some(positions) = config.cell_positions(tray.orientation()) else {
        return Vec::new();
    };

    positions
        .iter()
        .enumerate()
        .filter_map(|(channel, position)| {
            let cell = ctx.cells.get(position).filter(|c| !c.is_empty)?;
            let complete = ctx
                .readings
                .get(channel)
                .is_some_and(|r| r.status == CellStatus::Complete);
            Some(CellResult {
                serial: cell.serial.clone(),
                status: if complete {
                    CellVerdict::Pass
                } else {
                    CellVerdict::Fail
                },
            })
        })
        .collect()
}

async fn report(
    api: &dyn CellApi,
    config: &TowerConfig,
    ctx: &WorkContext,
    results: &[CellResult],
) {
    let tray = ctx.tray_serial();

    if ctx.cells.is_empty() && ctx.skip_close {
        info!(tray = %tray, "Nothing ran, skipping Cell API report");
        return;
    }

    if let Err(e) = api
        .update_process_status(tray, ctx.fixture_raw(), TrayStatus::End)
        .await
    {
        warn!(tray = %tray, error = %e, "Failed to report process end");
    }

    if !results.is_empty() {
        let request = CellStatusRequest {
            equipment_name: equipment_name(config, ctx),
            recipe_name: ctx.process_step.clone(),
            recipe_version: ctx.recipe_version,
            cells: results.to_vec(),
        };
        if let Err(e) = api.set_cell_statuses(tray, &request, !ctx.skip_close).await {
            warn!(tray = %tray, error = %e, "Failed to report cell statuses");
        }
    } else if !ctx.skip_close {
        if let Err(e) = api
            .close_process_step(tray, &ctx.process_step, ctx.recipe_version)
            .await
        {
            warn!(tray = %tray, error = %e, "Failed to close process step");
        }
    }
}

fn equipment_name(config: &TowerConfig, ctx: &WorkContext) -> String {
    match &ctx.fixture {
        Some(fixture) => fixture.raw().to_string(),
        None => format!("{}-{}{}", config.tower.line, config.tower.process, config.tower.aisle),
    }
}

/// Note the fault and hold the tray once it has faulted on too many fixtures.
async fn record_fault(deps: &WorkflowDeps, config: &TowerConfig, tray: &str, mock: bool) {
    let limit = config.workflow.max_fixture_faults;
    let count = deps.faults.record(tray, deps.entry.id());
    if limit == 0 || count <= limit {
        return;
    }

    warn!(tray = %tray, fixtures = count, limit, "Tray faulted on too many fixtures, holding");
    match deps.cell_api(mock).hold_tray(tray).await {
        Ok(()) => deps.faults.clear(tray),
        Err(e) => warn!(tray = %tray, error = %e, "Failed to hold tray"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barcode::TrayBarcode;
    use crate::cellapi::CellData;
    use crate::fixture::CellReading;

    fn ctx_with(cells: &[&str], readings: &[CellStatus]) -> WorkContext {
        WorkContext {
            tray: Some(TrayBarcode::parse("11223344A").unwrap()),
            cells: cells
                .iter()
                .map(|p| {
                    (
                        p.to_string(),
                        CellData {
                            position: p.to_string(),
                            serial: format!("{p}-SN"),
                            ..Default::default()
                        },
                    )
                })
                .collect(),
            readings: readings
                .iter()
                .map(|s| CellReading {
                    status: *s,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_results_follow_channel_order() {
        let config = TowerConfig::default();
        let ctx = ctx_with(
            &["A01", "A03"],
            &[CellStatus::Complete, CellStatus::None, CellStatus::Failed],
        );

        let results = cell_results(&config, &ctx);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].serial, "A01-SN");
        assert_eq!(results[0].status, CellVerdict::Pass);
        assert_eq!(results[1].serial, "A03-SN");
        assert_eq!(results[1].status, CellVerdict::Fail);
    }

    #[test]
    fn test_missing_readings_fail() {
        let config = TowerConfig::default();
        let ctx = ctx_with(&["A01", "B01"], &[CellStatus::Complete]);

        let results = cell_results(&config, &ctx);
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].status, CellVerdict::Fail);
    }

    #[test]
    fn test_empty_positions_skipped() {
        let config = TowerConfig::default();
        let mut ctx = ctx_with(&["A01", "A02"], &[CellStatus::Complete, CellStatus::Complete]);
        if let Some(cell) = ctx.cells.get_mut("A02") {
            cell.is_empty = true;
        }

        assert_eq!(cell_results(&config, &ctx).len(), 1);
    }
}
