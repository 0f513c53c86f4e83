//! Tower configuration.
//!
//! Configuration lives in an INI file (default `~/.formation-tower/tower.ini`)
//! with one section per concern. Missing keys keep their defaults.
//!
//! # Example
//!
//! ```
//! use formation_tower::config::TowerConfig;
//!
//! let config = TowerConfig::from_ini_str("[workflow]\npoll_interval_ms = 250\n").unwrap();
//! assert_eq!(config.workflow.poll_interval.as_millis(), 250);
//! assert_eq!(config.tower.fixtures.len(), 4);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod shared;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    CellApiSettings, LoggingSettings, RecipeSettings, RecipeSource, TelemetrySettings,
    TowerConfig, TowerSettings, TransportSettings, WorkflowSettings,
};
pub use shared::{ConfigWatcher, SharedConfig, WatchError};
