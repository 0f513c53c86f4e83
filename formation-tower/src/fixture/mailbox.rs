//! Single-slot handoff channels between admission control and a workflow.
//!
//! Each mailbox holds at most one undelivered value. Senders wait for the
//! slot with a timeout so an absent consumer cannot hang a request. Receive
//! is cancel-safe: a value is never lost when a waiting receive is dropped
//! because another branch of a `select!` completed first.
//!
//! The workflow opens a mailbox for the states that listen on it and closes
//! it when they hand over. Sends to a closed mailbox are refused, so a
//! signal arriving between listening windows never lingers into a later
//! cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// Errors from mailbox operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailboxError {
    /// Slot stayed occupied for the whole send timeout
    #[error("{mailbox} mailbox still full after {after:?}")]
    Timeout {
        mailbox: &'static str,
        after: Duration,
    },

    /// Slot occupied on a non-blocking send
    #[error("{mailbox} mailbox is full")]
    Full { mailbox: &'static str },

    /// No state is listening on this mailbox right now
    #[error("{mailbox} mailbox is not accepting")]
    NotAccepting { mailbox: &'static str },

    #[error("{mailbox} mailbox is closed")]
    Closed { mailbox: &'static str },
}

/// A depth-1 mailbox.
#[derive(Debug)]
pub struct Mailbox<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    accepting: AtomicBool,
}

impl<T> Mailbox<T> {
    /// An open mailbox.
    pub fn new(name: &'static str) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            name,
            tx,
            rx: Mutex::new(rx),
            accepting: AtomicBool::new(true),
        }
    }

    /// A mailbox that refuses sends until opened.
    pub fn closed(name: &'static str) -> Self {
        let mailbox = Self::new(name);
        mailbox.close();
        mailbox
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn open(&self) {
        self.accepting.store(true, Ordering::Release);
    }

    /// Refuse further sends. A value already in the slot stays there.
    pub fn close(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<(), MailboxError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(MailboxError::NotAccepting { mailbox: self.name })
        }
    }

    /// Deliver a value, waiting up to `timeout` for the slot to free up.
    pub async fn send(&self, value: T, timeout: Duration) -> Result<(), MailboxError> {
        self.check_open()?;
        match tokio::time::timeout(timeout, self.tx.send(value)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(MailboxError::Closed { mailbox: self.name }),
            Err(_) => Err(MailboxError::Timeout {
                mailbox: self.name,
                after: timeout,
            }),
        }
    }

    /// Deliver a value only if the slot is free right now.
    pub fn try_send(&self, value: T) -> Result<(), MailboxError> {
        self.check_open()?;
        self.tx.try_send(value).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MailboxError::Full { mailbox: self.name },
            mpsc::error::TrySendError::Closed(_) => MailboxError::Closed { mailbox: self.name },
        })
    }

    /// Wait for the next value.
    pub async fn recv(&self) -> Result<T, MailboxError> {
        let mut rx = self.rx.lock().await;
        rx.recv()
            .await
            .ok_or(MailboxError::Closed { mailbox: self.name })
    }

    /// Discard a value left in the slot, returning how many were dropped.
    ///
    /// Only the consumer calls this, never while its own receive is pending.
    pub fn drain(&self) -> usize {
        let Ok(mut rx) = self.rx.try_lock() else {
            return 0;
        };
        let mut dropped = 0;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    /// Whether a delivered value is waiting to be received.
    pub fn is_pending(&self) -> bool {
        self.tx.capacity() == 0
    }
}
