//! Default values and constants for all configuration settings.
//!
//! Contains all `DEFAULT_*` constants and the `TowerConfig::default()`
//! implementation.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use super::settings::*;
use crate::barcode::Orientation;
use crate::cellapi::{CellApiEndpoints, ALLOWED_STEP_TYPE};
use crate::fixture::{FixtureId, DEFAULT_MAILBOX_TIMEOUT, DEFAULT_TELEMETRY_EXPIRY};
use crate::statemachine::DEFAULT_QUEUE_DEPTH;

pub const DEFAULT_LINE: &str = "CM2";
pub const DEFAULT_PROCESS: &str = "63";
pub const DEFAULT_AISLE: &str = "010";

/// Columns and levels in the default tower layout.
pub const DEFAULT_COLUMNS: u8 = 1;
pub const DEFAULT_LEVELS: u8 = 4;

pub const DEFAULT_CELL_API_URL: &str = "http://localhost:8080/api/v1";
pub const DEFAULT_CELL_API_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_RECIPE_FILE: &str = "/etc/formation-tower/recipes.ini";
pub const DEFAULT_INGREDIENTS_FILE: &str = "/etc/formation-tower/ingredients.ini";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_FIXTURE_FAULTS: usize = 1;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:13170";
pub const DEFAULT_PUBLISH_ADDR: &str = "127.0.0.1:13171";

pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "formation-tower.log";

/// Rows and columns of cell positions on a tray.
pub const TRAY_ROWS: u8 = 8;
pub const TRAY_COLUMNS: u8 = 16;

/// Default fixture list: every column/level of the default layout.
pub fn default_fixtures() -> Vec<FixtureId> {
    (1..=DEFAULT_COLUMNS)
        .flat_map(|c| (1..=DEFAULT_LEVELS).filter_map(move |l| FixtureId::new(c, l).ok()))
        .collect()
}

/// Row-major tray positions `A01` .. `H16`.
pub fn default_cell_positions() -> Vec<String> {
    (0..TRAY_ROWS)
        .flat_map(|r| {
            let row = (b'A' + r) as char;
            (1..=TRAY_COLUMNS).map(move |c| format!("{}{:02}", row, c))
        })
        .collect()
}

impl Default for TowerConfig {
    fn default() -> Self {
        let positions = default_cell_positions();
        let cell_map: BTreeMap<Orientation, Vec<String>> = Orientation::ALL
            .iter()
            .map(|o| (*o, positions.clone()))
            .collect();

        Self {
            tower: TowerSettings {
                line: DEFAULT_LINE.to_string(),
                process: DEFAULT_PROCESS.to_string(),
                aisle: DEFAULT_AISLE.to_string(),
                fixtures: default_fixtures(),
                allowed_fixtures: Vec::new(),
            },
            cell_api: CellApiSettings {
                base_url: DEFAULT_CELL_API_URL.to_string(),
                mock: false,
                timeout: Duration::from_secs(DEFAULT_CELL_API_TIMEOUT_SECS),
                endpoints: CellApiEndpoints::default(),
            },
            recipes: RecipeSettings {
                source: RecipeSource::CellApi,
                recipe_file: PathBuf::from(DEFAULT_RECIPE_FILE),
                ingredients_file: PathBuf::from(DEFAULT_INGREDIENTS_FILE),
                allowed_step_type: ALLOWED_STEP_TYPE.to_string(),
            },
            telemetry: TelemetrySettings {
                operational_expiry: DEFAULT_TELEMETRY_EXPIRY,
                diagnostic_expiry: DEFAULT_TELEMETRY_EXPIRY,
            },
            workflow: WorkflowSettings {
                poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
                readiness_timeout: Duration::from_secs(DEFAULT_READINESS_TIMEOUT_SECS),
                mailbox_timeout: DEFAULT_MAILBOX_TIMEOUT,
                queue_depth: DEFAULT_QUEUE_DEPTH,
                max_fixture_faults: DEFAULT_MAX_FIXTURE_FAULTS,
                recover_in_progress: true,
            },
            cell_map,
            transport: TransportSettings {
                listen_addr: parse_addr(DEFAULT_LISTEN_ADDR),
                publish_addr: parse_addr(DEFAULT_PUBLISH_ADDR),
            },
            logging: LoggingSettings {
                directory: PathBuf::from(DEFAULT_LOG_DIR),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}

fn parse_addr(addr: &str) -> SocketAddr {
    addr.parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fixtures() {
        let ids: Vec<String> = default_fixtures().iter().map(|f| f.to_string()).collect();
        assert_eq!(ids, ["01-01", "01-02", "01-03", "01-04"]);
    }

    #[test]
    fn test_default_cell_positions() {
        let positions = default_cell_positions();
        assert_eq!(positions.len(), 128);
        assert_eq!(positions[0], "A01");
        assert_eq!(positions[16], "B01");
        assert_eq!(positions[127], "H16");
    }

    #[test]
    fn test_default_addresses_parse() {
        let config = TowerConfig::default();
        assert_eq!(config.transport.listen_addr.port(), 13170);
        assert_eq!(config.transport.publish_addr.port(), 13171);
    }
}
