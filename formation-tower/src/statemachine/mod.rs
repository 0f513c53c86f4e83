//! Generic state machine substrate.
//!
//! A [`State`] performs its actions, then names its successor. The
//! [`run_from`] runner drives states until one marks itself terminal, and
//! the [`KeyedScheduler`] gives every key its own worker so that at most one
//! run is in flight per key.

mod scheduler;

pub use scheduler::{Job, KeyedScheduler, SchedulerError, DEFAULT_QUEUE_DEPTH};

use std::future::Future;

use tracing::debug;

/// One state of a state machine.
///
/// Implementations are usually an enum of state variants, each variant
/// carrying only the data that must survive into its successor.
pub trait State: Sized + Send + 'static {
    /// Payload a scheduled job hands to the initial state.
    type Context: Send + 'static;

    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Seed the state with a job's payload before the run starts.
    fn set_context(&mut self, context: Self::Context);

    /// Perform this state's work to completion.
    fn run_actions(&mut self) -> impl Future<Output = ()> + Send;

    /// Consume this state and produce its successor.
    fn next(self) -> Self;

    /// Whether the runner should stop after this state's actions.
    fn is_terminal(&self) -> bool;
}

/// Run `state` and its successors until one is terminal, returning it.
pub async fn run_from<S: State>(mut state: S) -> S {
    loop {
        debug!(state = state.name(), "running state");
        state.run_actions().await;
        if state.is_terminal() {
            debug!(state = state.name(), "terminal state reached");
            return state;
        }
        state = state.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts down to zero, then stops.
    struct Countdown {
        remaining: u32,
        visited: Vec<u32>,
    }

    impl State for Countdown {
        type Context = u32;

        fn name(&self) -> &'static str {
            "countdown"
        }

        fn set_context(&mut self, context: u32) {
            self.remaining = context;
        }

        async fn run_actions(&mut self) {
            self.visited.push(self.remaining);
        }

        fn next(self) -> Self {
            Countdown {
                remaining: self.remaining - 1,
                visited: self.visited,
            }
        }

        fn is_terminal(&self) -> bool {
            self.remaining == 0
        }
    }

    #[tokio::test]
    async fn test_run_from_stops_at_terminal() {
        let mut start = Countdown {
            remaining: 0,
            visited: Vec::new(),
        };
        start.set_context(3);

        let end = run_from(start).await;
        assert_eq!(end.visited, vec![3, 2, 1, 0]);
    }

    #[tokio::test]
    async fn test_terminal_initial_state_runs_once() {
        let end = run_from(Countdown {
            remaining: 0,
            visited: Vec::new(),
        })
        .await;
        assert_eq!(end.visited, vec![0]);
    }
}
