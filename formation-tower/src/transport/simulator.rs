//! Simulated fixtures on top of [`LoopbackTransport`].
//!
//! Each simulated fixture reports `READY` until it receives a recipe, then
//! `ACTIVE` for `run_for`, then `COMPLETE` (or `FAULTED` when a fault was
//! requested) until `unload_after` has passed, then `IDLE` for another
//! `unload_after` before returning to `READY`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::LoopbackTransport;
use crate::fixture::{
    CellReading, CellStatus, Envelope, FixtureId, FixtureInfo, FixtureStatus, Operational,
    TelemetryMessage,
};
use crate::recipe::{FormRequest, RecipeCommand};

/// Timing of simulated fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatorConfig {
    /// Interval between operational reports
    pub heartbeat: Duration,
    /// Time a recipe stays ACTIVE
    pub run_for: Duration,
    /// Time a finished fixture waits before reporting IDLE, and then READY
    pub unload_after: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_millis(500),
            run_for: Duration::from_secs(5),
            unload_after: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Ready,
    Active {
        info: FixtureInfo,
        masks: Vec<u32>,
        since: Instant,
    },
    Finished {
        info: FixtureInfo,
        status: FixtureStatus,
        cells: Vec<CellReading>,
        since: Instant,
    },
    Idle {
        since: Instant,
    },
}

#[derive(Debug)]
struct SimFixture {
    phase: Phase,
    fault_next: bool,
}

/// Drives simulated fixtures for every id on a loopback transport.
pub struct FixtureSimulator {
    transport: Arc<LoopbackTransport>,
    config: SimulatorConfig,
    fixtures: Mutex<HashMap<FixtureId, SimFixture>>,
    silenced: Mutex<HashSet<FixtureId>>,
}

impl FixtureSimulator {
    pub fn new(
        transport: Arc<LoopbackTransport>,
        fixtures: impl IntoIterator<Item = FixtureId>,
        config: SimulatorConfig,
    ) -> Self {
        let fixtures = fixtures
            .into_iter()
            .map(|id| {
                (
                    id,
                    SimFixture {
                        phase: Phase::Ready,
                        fault_next: false,
                    },
                )
            })
            .collect();
        Self {
            transport,
            config,
            fixtures: Mutex::new(fixtures),
            silenced: Mutex::new(HashSet::new()),
        }
    }

    /// Make the next recipe on `fixture` end FAULTED.
    pub fn fault_next(&self, fixture: &FixtureId) {
        if let Some(sim) = self.fixtures.lock().get_mut(fixture) {
            sim.fault_next = true;
        }
    }

    /// Stop or resume heartbeats from `fixture`, simulating a lost link.
    pub fn set_silent(&self, fixture: &FixtureId, silent: bool) {
        let mut silenced = self.silenced.lock();
        if silent {
            silenced.insert(*fixture);
        } else {
            silenced.remove(fixture);
        }
    }

    /// Status the fixture would report right now.
    pub fn status(&self, fixture: &FixtureId) -> Option<FixtureStatus> {
        self.fixtures.lock().get(fixture).map(|sim| match &sim.phase {
            Phase::Ready => FixtureStatus::Ready,
            Phase::Active { .. } => FixtureStatus::Active,
            Phase::Finished { status, .. } => *status,
            Phase::Idle { .. } => FixtureStatus::Idle,
        })
    }

    /// Spawn the simulation loop.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(cancel).await })
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut published = self.transport.tap();
        let mut heartbeat = tokio::time::interval(self.config.heartbeat);
        info!(fixtures = self.fixtures.lock().len(), "Fixture simulator started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = published.recv() => match frame {
                    Some((fixture, bytes)) => {
                        if self.accept_command(&fixture, &bytes) {
                            self.report(&fixture).await;
                        }
                    }
                    None => break,
                },
                _ = heartbeat.tick() => {
                    let ids: Vec<FixtureId> = self.fixtures.lock().keys().copied().collect();
                    for id in ids {
                        self.advance(&id);
                        self.report(&id).await;
                    }
                }
            }
        }
        debug!("Fixture simulator stopped");
    }

    fn accept_command(&self, fixture: &FixtureId, bytes: &[u8]) -> bool {
        let command = match Envelope::decode(bytes)
            .ok()
            .as_ref()
            .and_then(RecipeCommand::from_envelope)
        {
            Some(command) => command,
            None => return false,
        };

        let mut fixtures = self.fixtures.lock();
        let Some(sim) = fixtures.get_mut(fixture) else {
            return false;
        };
        match (command.form_request, &sim.phase) {
            (FormRequest::Start, Phase::Ready) => {
                info!(
                    fixture = %fixture,
                    transaction_id = %command.info.transaction_id,
                    steps = command.steps.len(),
                    "Simulated fixture starting recipe"
                );
                sim.phase = Phase::Active {
                    info: command.info,
                    masks: command.cell_masks,
                    since: Instant::now(),
                };
                true
            }
            (FormRequest::Start, Phase::Active { info, .. })
                if info.transaction_id == command.info.transaction_id =>
            {
                // Repeated start for the running recipe
                true
            }
            (request, _) => {
                warn!(fixture = %fixture, ?request, "Simulated fixture ignored command");
                false
            }
        }
    }

    fn advance(&self, fixture: &FixtureId) {
        let mut fixtures = self.fixtures.lock();
        let Some(sim) = fixtures.get_mut(fixture) else {
            return;
        };
        let next = match &sim.phase {
            Phase::Active { info, masks, since } if since.elapsed() >= self.config.run_for => {
                let faulted = std::mem::take(&mut sim.fault_next);
                let (status, cell_status) = if faulted {
                    (FixtureStatus::Faulted, CellStatus::Failed)
                } else {
                    (FixtureStatus::Complete, CellStatus::Complete)
                };
                Some(Phase::Finished {
                    info: info.clone(),
                    status,
                    cells: readings(masks, cell_status),
                    since: Instant::now(),
                })
            }
            Phase::Finished { since, .. } if since.elapsed() >= self.config.unload_after => {
                Some(Phase::Idle {
                    since: Instant::now(),
                })
            }
            Phase::Idle { since } if since.elapsed() >= self.config.unload_after => {
                Some(Phase::Ready)
            }
            _ => None,
        };
        if let Some(next) = next {
            sim.phase = next;
        }
    }

    async fn report(&self, fixture: &FixtureId) {
        if self.silenced.lock().contains(fixture) {
            return;
        }
        let message = {
            let fixtures = self.fixtures.lock();
            let Some(sim) = fixtures.get(fixture) else {
                return;
            };
            operational(&sim.phase)
        };
        if let Err(e) = self
            .transport
            .inject_message(fixture, &TelemetryMessage::Operational(message))
            .await
        {
            debug!(fixture = %fixture, error = %e, "Simulated report dropped");
        }
    }
}

fn operational(phase: &Phase) -> Operational {
    match phase {
        Phase::Ready => Operational {
            status: FixtureStatus::Ready,
            ..Default::default()
        },
        Phase::Active { info, .. } => Operational {
            status: FixtureStatus::Active,
            info: Some(info.clone()),
            ..Default::default()
        },
        Phase::Finished {
            info,
            status,
            cells,
            ..
        } => Operational {
            status: *status,
            info: Some(info.clone()),
            cells: cells.clone(),
            fire_alarm: false,
        },
        Phase::Idle { .. } => Operational {
            status: FixtureStatus::Idle,
            ..Default::default()
        },
    }
}

/// One reading per channel up to the highest masked channel.
fn readings(masks: &[u32], finished: CellStatus) -> Vec<CellReading> {
    let channels = masks.len() * 32;
    let last = (0..channels)
        .rev()
        .find(|&i| masks[i / 32] & (1 << (i % 32)) != 0);
    let Some(last) = last else {
        return Vec::new();
    };
    (0..=last)
        .map(|i| {
            if masks[i / 32] & (1 << (i % 32)) != 0 {
                CellReading {
                    status: finished,
                    voltage: 4.1,
                    current: 0.0,
                }
            } else {
                CellReading::default()
            }
        })
        .collect()
}
