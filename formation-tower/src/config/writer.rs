//! INI serialization logic for converting `TowerConfig` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `tower.ini`.

use std::fmt::Write;
use std::path::Path;

use super::settings::TowerConfig;
use crate::fixture::FixtureId;

/// Convert a `TowerConfig` to a commented INI string for saving.
pub(super) fn to_config_string(config: &TowerConfig) -> String {
    let endpoints = &config.cell_api.endpoints;

    let mut out = format!(
        r#"[tower]
; Location of this tower, combined into fixture barcodes as
; {{line}}-{{process}}{{aisle}}-{{column}}-{{level}}
line = {}
process = {}
aisle = {}
; Fixtures in this tower (column-level)
fixtures = {}
; Fixtures allowed to take trays (empty = all)
allowed_fixtures = {}

[cell_api]
; Base URL of the Cell API service
base_url = {}
; Serve canned responses instead of calling the service
mock = {}
timeout_secs = {}
; Endpoint paths; {{tray}}, {{fixture}} and {{status}} are substituted
next_process_step_path = {}
cell_map_path = {}
process_status_path = {}
cell_status_path = {}
close_process_path = {}
hold_tray_path = {}

[recipes]
; Recipe source:
;   cell_api - step configuration returned by the Cell API
;   local    - recipe_file and ingredients_file below
source = {}
recipe_file = {}
ingredients_file = {}
; Only process steps of this type run on this tower
allowed_step_type = {}

[telemetry]
; Operational and diagnostic data older than this is stale
operational_expiry_ms = {}
diagnostic_expiry_ms = {}

[workflow]
poll_interval_ms = {}
; Budget for the recipe handshake
readiness_timeout_secs = {}
; How long admission waits for a fixture's mailbox slot
mailbox_timeout_ms = {}
queue_depth = {}
; Distinct fixtures a tray may fault before it is held (0 = never hold)
max_fixture_faults = {}
; Resume recipes the fixture reports as running when the engine starts
recover_in_progress = {}

[transport]
listen_addr = {}
publish_addr = {}

[logging]
directory = {}
file = {}

[cell_map]
; Cell positions in channel order, one line per tray orientation
"#,
        config.tower.line,
        config.tower.process,
        config.tower.aisle,
        fixture_list(&config.tower.fixtures),
        fixture_list(&config.tower.allowed_fixtures),
        config.cell_api.base_url,
        config.cell_api.mock,
        config.cell_api.timeout.as_secs(),
        endpoints.next_process_step,
        endpoints.cell_map,
        endpoints.process_status,
        endpoints.cell_status,
        endpoints.close_process,
        endpoints.hold_tray,
        config.recipes.source.as_str(),
        path_to_string(&config.recipes.recipe_file),
        path_to_string(&config.recipes.ingredients_file),
        config.recipes.allowed_step_type,
        config.telemetry.operational_expiry.as_millis(),
        config.telemetry.diagnostic_expiry.as_millis(),
        config.workflow.poll_interval.as_millis(),
        config.workflow.readiness_timeout.as_secs(),
        config.workflow.mailbox_timeout.as_millis(),
        config.workflow.queue_depth,
        config.workflow.max_fixture_faults,
        config.workflow.recover_in_progress,
        config.transport.listen_addr,
        config.transport.publish_addr,
        path_to_string(&config.logging.directory),
        config.logging.file,
    );

    for (orientation, positions) in &config.cell_map {
        let _ = writeln!(out, "{} = {}", orientation.letter(), positions.join(", "));
    }
    out
}

fn fixture_list(fixtures: &[FixtureId]) -> String {
    fixtures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
