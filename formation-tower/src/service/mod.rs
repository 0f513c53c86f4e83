//! High-level facade for running a tower.
//!
//! [`TowerService`] wires the fixture registry, telemetry feeds, workflows
//! and keyed scheduler together from a [`TowerConfig`](crate::config::TowerConfig).
//! Callers supply the transport and Cell API so the same wiring serves the
//! daemon, the manual operator loop and tests.
//!
//! # Example
//!
//! ```ignore
//! use formation_tower::config::{SharedConfig, TowerConfig};
//! use formation_tower::service::{cell_api_from_config, TowerService};
//! use formation_tower::transport::LoopbackTransport;
//!
//! let config = SharedConfig::new(TowerConfig::default());
//! let snapshot = config.snapshot();
//! let (transport, subscriptions) = LoopbackTransport::new(snapshot.tower.fixtures.clone());
//! let cell_api = cell_api_from_config(&snapshot.cell_api)?;
//!
//! let publisher = Arc::new(transport);
//! let service = TowerService::start(config, cell_api, publisher, subscriptions, cancel)?;
//! service.schedule_idle().await?;
//! ```

mod error;
mod tower;

pub use error::ServiceError;
pub use tower::{cell_api_from_config, TowerService};
