//! Formation Tower - per-fixture orchestration for battery formation towers
//!
//! A tower holds a grid of fixtures. Each fixture runs its own workflow:
//! wait for a tray to be reserved and loaded, fetch the formation recipe,
//! hand it to the fixture controller, follow the run through telemetry and
//! report the cell results back to the Cell API.
//!
//! # High-Level API
//!
//! The [`service`] module wires everything from a [`config::TowerConfig`]:
//!
//! ```ignore
//! use formation_tower::config::{SharedConfig, TowerConfig};
//! use formation_tower::service::{cell_api_from_config, TowerService};
//!
//! let config = SharedConfig::new(TowerConfig::load()?);
//! let cell_api = cell_api_from_config(&config.snapshot().cell_api)?;
//! let service = TowerService::start(config, cell_api, publisher, subscriptions, cancel)?;
//! service.schedule_idle().await?;
//! ```

pub mod barcode;
pub mod cellapi;
pub mod config;
pub mod fixture;
pub mod logging;
pub mod recipe;
pub mod service;
pub mod statemachine;
pub mod transport;
pub mod workflow;

/// Version of the Formation Tower library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
