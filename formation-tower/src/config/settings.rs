//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::barcode::{BarcodeError, FixtureBarcode, Orientation};
use crate::cellapi::CellApiEndpoints;
use crate::fixture::{FixtureId, TelemetryExpiry};

/// Complete tower configuration loaded from tower.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct TowerConfig {
    /// Tower location and fixture list
    pub tower: TowerSettings,
    /// Cell API connection
    pub cell_api: CellApiSettings,
    /// Where recipes come from
    pub recipes: RecipeSettings,
    /// Telemetry expiry
    pub telemetry: TelemetrySettings,
    /// Workflow timing and policy
    pub workflow: WorkflowSettings,
    /// Channel-to-cell-position map per tray orientation
    pub cell_map: BTreeMap<Orientation, Vec<String>>,
    /// Fixture transport addresses
    pub transport: TransportSettings,
    /// Log output
    pub logging: LoggingSettings,
}

impl TowerConfig {
    /// Cell positions in channel order for a tray orientation.
    pub fn cell_positions(&self, orientation: Orientation) -> Option<&[String]> {
        self.cell_map.get(&orientation).map(Vec::as_slice)
    }
}

/// Physical location of this tower and the fixtures it drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TowerSettings {
    /// Production line (`CM2`)
    pub line: String,
    /// Process code (`63`)
    pub process: String,
    /// Aisle within the process (`010`)
    pub aisle: String,
    /// Every fixture in the tower
    pub fixtures: Vec<FixtureId>,
    /// Fixtures allowed to take trays; empty means all
    pub allowed_fixtures: Vec<FixtureId>,
}

impl TowerSettings {
    /// Full barcode of a fixture in this tower (`CM2-63010-01-01`).
    pub fn fixture_barcode(&self, id: FixtureId) -> Result<FixtureBarcode, BarcodeError> {
        FixtureBarcode::parse(&format!(
            "{}-{}{}-{:02}-{:02}",
            self.line,
            self.process,
            self.aisle,
            id.column(),
            id.level()
        ))
    }

    pub fn is_allowed(&self, id: &FixtureId) -> bool {
        self.allowed_fixtures.is_empty() || self.allowed_fixtures.contains(id)
    }
}

/// Cell API connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellApiSettings {
    pub base_url: String,
    /// Serve canned answers instead of calling the service
    pub mock: bool,
    pub timeout: Duration,
    pub endpoints: CellApiEndpoints,
}

/// Source of recipe step lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeSource {
    /// Step configuration from the Cell API
    CellApi,
    /// Local recipe and ingredients files
    Local,
}

impl RecipeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipeSource::CellApi => "cell_api",
            RecipeSource::Local => "local",
        }
    }
}

impl std::str::FromStr for RecipeSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cell_api" | "cellapi" => Ok(RecipeSource::CellApi),
            "local" => Ok(RecipeSource::Local),
            other => Err(format!("unknown recipe source '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeSettings {
    pub source: RecipeSource,
    pub recipe_file: PathBuf,
    pub ingredients_file: PathBuf,
    /// Only steps of this type run on this tower
    pub allowed_step_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetrySettings {
    pub operational_expiry: Duration,
    pub diagnostic_expiry: Duration,
}

impl TelemetrySettings {
    pub fn expiry(&self) -> TelemetryExpiry {
        TelemetryExpiry {
            operational: self.operational_expiry,
            diagnostic: self.diagnostic_expiry,
        }
    }
}

/// Workflow timing and policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Delay between telemetry polls
    pub poll_interval: Duration,
    /// Budget for the recipe handshake
    pub readiness_timeout: Duration,
    /// How long a submitter waits for a mailbox slot
    pub mailbox_timeout: Duration,
    /// Jobs queued per fixture before submitters wait
    pub queue_depth: usize,
    /// Distinct fixtures a tray may fault before it is held; 0 disables
    pub max_fixture_faults: usize,
    /// Resume a recipe the fixture reports as already running
    pub recover_in_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    pub listen_addr: SocketAddr,
    pub publish_addr: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}
