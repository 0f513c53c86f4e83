//! Tower assembly shared by the long-running commands.
//!
//! Loads configuration, initializes logging, opens the transport and starts
//! the service, then tears it all down in reverse.

use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use formation_tower::config::{ConfigWatcher, SharedConfig, TowerConfig};
use formation_tower::logging::{init_logging, LoggingGuard};
use formation_tower::service::{cell_api_from_config, TowerService};
use formation_tower::transport::{
    FixtureSimulator, LoopbackTransport, Publisher, SimulatorConfig, Subscription, UdpTransport,
    UdpTransportConfig,
};

use crate::error::CliError;

/// Publisher, subscriptions and the tasks feeding them.
struct Transport {
    publisher: Arc<dyn Publisher>,
    subscriptions: Vec<Subscription>,
    task: JoinHandle<()>,
}

async fn open_transport(
    config: &TowerConfig,
    simulate: bool,
    cancel: &CancellationToken,
) -> Result<Transport, CliError> {
    let fixtures = config.tower.fixtures.clone();

    if simulate {
        let (transport, subscriptions) = LoopbackTransport::new(fixtures.iter().copied());
        let transport = Arc::new(transport);
        let simulator = Arc::new(FixtureSimulator::new(
            transport.clone(),
            fixtures,
            SimulatorConfig::default(),
        ));
        let task = simulator.start(cancel.clone());
        info!("Using simulated fixtures");
        return Ok(Transport {
            publisher: transport,
            subscriptions,
            task,
        });
    }

    let udp = UdpTransportConfig {
        listen_addr: config.transport.listen_addr,
        publish_addr: config.transport.publish_addr,
        ..Default::default()
    };
    let (transport, subscriptions) = UdpTransport::bind(udp, fixtures).await?;
    let transport = Arc::new(transport);
    let task = transport.start(cancel.clone());
    Ok(Transport {
        publisher: transport,
        subscriptions,
        task,
    })
}

/// A started tower with everything it needs kept alive.
pub struct RunningTower {
    pub service: TowerService,
    tasks: Vec<JoinHandle<()>>,
    logging: LoggingGuard,
}

impl RunningTower {
    /// Load `config_path`, start logging and bring the tower up.
    ///
    /// With `console` false, logs go to the file only so prompts stay clean.
    pub async fn start(
        config_path: &Path,
        simulate: bool,
        console: bool,
    ) -> Result<Self, CliError> {
        let config = TowerConfig::load_from(config_path)?;
        let logging = init_logging(&config.logging, console)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        info!("Formation Tower v{}", formation_tower::VERSION);
        info!(config = %config_path.display(), log = %logging.path().display(), "Starting");

        let cancel = CancellationToken::new();
        let shared = SharedConfig::new(config.clone());
        let mut tasks = Vec::new();

        if config_path.exists() {
            let watcher = ConfigWatcher::new(config_path, shared.clone())?;
            tasks.push(watcher.start(cancel.clone()));
        } else {
            warn!(
                config = %config_path.display(),
                "No configuration file, running on defaults without reload"
            );
        }

        let cell_api = cell_api_from_config(&config.cell_api)?;
        let transport = open_transport(&config, simulate, &cancel).await?;
        tasks.push(transport.task);

        let service = TowerService::start(
            shared,
            cell_api,
            transport.publisher,
            transport.subscriptions,
            cancel,
        )?;

        Ok(Self {
            service,
            tasks,
            logging,
        })
    }

    pub fn log_path(&self) -> &Path {
        self.logging.path()
    }

    /// Stop the service, then the transport and config watcher.
    pub async fn shutdown(self) {
        let Self {
            service,
            tasks,
            logging,
        } = self;

        // Cancels the shared token the other tasks watch
        service.shutdown().await;
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        drop(logging);
    }
}
