//! Keyed scheduler: one dedicated worker per key.
//!
//! Each registered key gets a bounded FIFO queue and a worker task. The
//! worker takes one job at a time, seeds a clone of the key's initial state
//! with the job payload and runs it to a terminal state before taking the
//! next job. Submitting to a full queue waits rather than dropping work.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{run_from, State};

/// Default per-key queue depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 1;

/// Scheduler errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The key was never registered
    #[error("key {0} not in registry")]
    UnknownKey(String),

    /// A worker already exists for the key
    #[error("key {0} is already registered")]
    DuplicateKey(String),

    /// The scheduler has been shut down
    #[error("scheduler is shut down")]
    ShutDown,
}

/// Work for one key.
#[derive(Debug, Clone)]
pub struct Job<K, C> {
    pub key: K,
    pub payload: C,
}

impl<K, C> Job<K, C> {
    pub fn new(key: K, payload: C) -> Self {
        Self { key, payload }
    }
}

/// Scheduler guaranteeing at most one in-flight run per key.
pub struct KeyedScheduler<K, S: State> {
    queues: DashMap<K, mpsc::Sender<Job<K, S::Context>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    queue_depth: usize,
    closed: AtomicBool,
}

impl<K, S> KeyedScheduler<K, S>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    S: State + Clone,
{
    pub fn new(queue_depth: usize) -> Self {
        Self {
            queues: DashMap::new(),
            workers: Mutex::new(Vec::new()),
            queue_depth: queue_depth.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Create the queue and worker for `key`.
    pub fn register(&self, key: K, initial: S) -> Result<(), SchedulerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::ShutDown);
        }

        let (tx, rx) = mpsc::channel(self.queue_depth);
        match self.queues.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(SchedulerError::DuplicateKey(key.to_string()));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }

        let handle = tokio::spawn(worker(key.clone(), initial, rx));
        self.workers.lock().push(handle);
        debug!(key = %key, "worker registered");
        Ok(())
    }

    /// Queue a job behind any earlier jobs for the same key.
    pub async fn schedule(&self, job: Job<K, S::Context>) -> Result<(), SchedulerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::ShutDown);
        }

        // clone the sender so no map guard is held while waiting for room
        let tx = self
            .queues
            .get(&job.key)
            .map(|q| q.value().clone())
            .ok_or_else(|| SchedulerError::UnknownKey(job.key.to_string()))?;

        tx.send(job).await.map_err(|_| SchedulerError::ShutDown)
    }

    /// Close every queue and wait for the workers to drain and exit.
    ///
    /// Runs already in progress are not aborted. Calling this again is a no-op.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.queues.clear();

        let handles = std::mem::take(&mut *self.workers.lock());
        if handles.is_empty() {
            return;
        }

        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "scheduler worker ended abnormally");
            }
        }
        info!(workers = count, "scheduler shut down");
    }
}

async fn worker<K, S>(key: K, initial: S, mut rx: mpsc::Receiver<Job<K, S::Context>>)
where
    K: Display,
    S: State + Clone,
{
    let mut jobs: u64 = 0;
    while let Some(job) = rx.recv().await {
        jobs += 1;
        let mut state = initial.clone();
        state.set_context(job.payload);
        let last = run_from(state).await;
        debug!(key = %key, job = jobs, last_state = last.name(), "job finished");
    }
    debug!(key = %key, jobs, "worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Barrier;

    /// Two-step state recording concurrency and completion order.
    #[derive(Clone)]
    struct Probe {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        finished: Arc<Mutex<Vec<u32>>>,
        payload: u32,
        steps: u8,
    }

    impl Probe {
        fn new() -> Self {
            Self {
                active: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
                finished: Arc::new(Mutex::new(Vec::new())),
                payload: 0,
                steps: 0,
            }
        }
    }

    impl State for Probe {
        type Context = u32;

        fn name(&self) -> &'static str {
            "probe"
        }

        fn set_context(&mut self, context: u32) {
            self.payload = context;
        }

        async fn run_actions(&mut self) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            self.steps += 1;
            if self.steps == 2 {
                self.finished.lock().push(self.payload);
            }
        }

        fn next(self) -> Self {
            self
        }

        fn is_terminal(&self) -> bool {
            self.steps >= 2
        }
    }

    /// Waits on a shared barrier; deadlocks unless two keys run at once.
    #[derive(Clone)]
    struct Rendezvous {
        barrier: Arc<Barrier>,
        done: Arc<AtomicUsize>,
    }

    impl State for Rendezvous {
        type Context = ();

        fn name(&self) -> &'static str {
            "rendezvous"
        }

        fn set_context(&mut self, _: ()) {}

        async fn run_actions(&mut self) {
            self.barrier.wait().await;
            self.done.fetch_add(1, Ordering::SeqCst);
        }

        fn next(self) -> Self {
            self
        }

        fn is_terminal(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_burst_runs_one_at_a_time_in_order() {
        let scheduler = Arc::new(KeyedScheduler::new(DEFAULT_QUEUE_DEPTH));
        let probe = Probe::new();
        scheduler.register("01-01".to_string(), probe.clone()).unwrap();

        let mut submitters = Vec::new();
        // sequential submission defines the expected order
        for n in 0..20u32 {
            scheduler
                .schedule(Job::new("01-01".to_string(), n))
                .await
                .unwrap();
        }
        // and a concurrent burst on top
        for n in 20..30u32 {
            let scheduler = Arc::clone(&scheduler);
            submitters.push(tokio::spawn(async move {
                scheduler.schedule(Job::new("01-01".to_string(), n)).await
            }));
        }
        for s in submitters {
            s.await.unwrap().unwrap();
        }

        scheduler.shutdown().await;

        assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
        let finished = probe.finished.lock().clone();
        assert_eq!(finished.len(), 30);
        assert_eq!(&finished[..20], (0..20).collect::<Vec<_>>().as_slice());
    }

    #[tokio::test]
    async fn test_unrelated_keys_run_concurrently() {
        let scheduler = KeyedScheduler::new(1);
        let state = Rendezvous {
            barrier: Arc::new(Barrier::new(2)),
            done: Arc::new(AtomicUsize::new(0)),
        };
        scheduler.register("01-01".to_string(), state.clone()).unwrap();
        scheduler.register("01-02".to_string(), state.clone()).unwrap();

        scheduler.schedule(Job::new("01-01".to_string(), ())).await.unwrap();
        scheduler.schedule(Job::new("01-02".to_string(), ())).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), scheduler.shutdown())
            .await
            .expect("workers should meet at the barrier");
        assert_eq!(state.done.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_key() {
        let scheduler: KeyedScheduler<String, Probe> = KeyedScheduler::new(1);
        let err = scheduler
            .schedule(Job::new("09-09".to_string(), 1))
            .await
            .unwrap_err();
        assert_eq!(err, SchedulerError::UnknownKey("09-09".to_string()));
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let scheduler = KeyedScheduler::new(1);
        scheduler.register("a".to_string(), Probe::new()).unwrap();
        assert_eq!(
            scheduler.register("a".to_string(), Probe::new()),
            Err(SchedulerError::DuplicateKey("a".to_string()))
        );
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_final() {
        let scheduler = KeyedScheduler::new(1);
        let probe = Probe::new();
        scheduler.register("a".to_string(), probe.clone()).unwrap();
        scheduler.schedule(Job::new("a".to_string(), 7)).await.unwrap();

        scheduler.shutdown().await;
        scheduler.shutdown().await;

        // the queued job was drained before the worker exited
        assert_eq!(*probe.finished.lock(), vec![7]);
        assert_eq!(
            scheduler.schedule(Job::new("a".to_string(), 8)).await,
            Err(SchedulerError::ShutDown)
        );
        assert_eq!(
            scheduler.register("b".to_string(), Probe::new()),
            Err(SchedulerError::ShutDown)
        );
    }
}
