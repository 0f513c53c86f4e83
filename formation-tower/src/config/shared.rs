//! Hot-reloadable configuration.
//!
//! Workflows read a [`SharedConfig`] snapshot at the start of every state so
//! a reload takes effect at the next state boundary. [`ConfigWatcher`]
//! re-parses the config file whenever it changes on disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::file::ConfigFileError;
use super::settings::TowerConfig;

/// Shared, swappable configuration snapshot.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<SharedInner>,
}

#[derive(Debug)]
struct SharedInner {
    current: RwLock<Arc<TowerConfig>>,
    version: AtomicU64,
}

impl SharedConfig {
    pub fn new(config: TowerConfig) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                current: RwLock::new(Arc::new(config)),
                version: AtomicU64::new(0),
            }),
        }
    }

    /// Current configuration. The snapshot never changes once taken.
    pub fn snapshot(&self) -> Arc<TowerConfig> {
        Arc::clone(&self.inner.current.read())
    }

    /// Number of replacements applied since creation.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Swap in a new configuration.
    pub fn replace(&self, config: TowerConfig) {
        *self.inner.current.write() = Arc::new(config);
        self.inner.version.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(TowerConfig::default())
    }
}

/// Errors starting the config watcher.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Config path has no parent directory: {0}")]
    NoParent(PathBuf),

    #[error("Failed to watch config file: {0}")]
    Notify(#[from] notify::Error),
}

/// Watches the config file and reloads [`SharedConfig`] on change.
///
/// The parent directory is watched so editors that replace the file
/// atomically are still seen.
pub struct ConfigWatcher {
    path: PathBuf,
    shared: SharedConfig,
    // Dropping the watcher stops event delivery
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl ConfigWatcher {
    pub fn new(path: &Path, shared: SharedConfig) -> Result<Self, WatchError> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        if !parent.exists() {
            return Err(WatchError::NoParent(path.to_path_buf()));
        }

        let (event_tx, events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |event| {
            if event_tx.send(event).is_err() {
                debug!("config watch event dropped because receiver is closed");
            }
        })?;
        watcher.watch(&parent, RecursiveMode::NonRecursive)?;

        Ok(Self {
            path: path.to_path_buf(),
            shared,
            _watcher: watcher,
            events,
        })
    }

    /// Spawn the reload loop.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(mut self, cancel: CancellationToken) {
        info!(path = %self.path.display(), "Config watcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(Ok(event)) if self.concerns_config(&event) => {
                        if let Err(e) = self.reload() {
                            warn!(error = %e, "Config reload failed, keeping previous settings");
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => warn!(error = %e, "Config watch error"),
                    None => break,
                },
            }
        }
        debug!("Config watcher stopped");
    }

    fn concerns_config(&self, event: &Event) -> bool {
        let name = self.path.file_name();
        (event.kind.is_modify() || event.kind.is_create())
            && event.paths.iter().any(|p| p.file_name() == name)
    }

    fn reload(&self) -> Result<(), ConfigFileError> {
        if !self.path.exists() {
            return Ok(());
        }
        let config = TowerConfig::load_from(&self.path)?;
        if *self.shared.snapshot() == config {
            return Ok(());
        }
        self.shared.replace(config);
        info!(
            path = %self.path.display(),
            version = self.shared.version(),
            "Config reloaded"
        );
        Ok(())
    }
}
