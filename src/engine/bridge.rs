//! Engine Bridge
//!
//! The UI-side entry point for everything that touches engine state. Edits
//! are queued as closures and run on the engine thread in order. Queries are
//! queued the same way and the caller blocks on a one-shot reply channel
//! until the engine has run everything queued before them.
//!
//! Blocking waits are bounded: a reply that does not arrive within the
//! configured timeout surfaces as [`BridgeError::Timeout`] instead of
//! hanging the UI.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use thiserror::Error;

use super::channels::UiHandle;
use super::commands::{EngineEvent, Mutation};
use super::instance::Instance;

/// How long to sleep between attempts to enqueue into a full ring.
const ENQUEUE_RETRY_INTERVAL: Duration = Duration::from_micros(200);

/// Errors surfaced by the bridge.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The engine did not answer within the reply timeout.
    #[error("engine did not reply within {0:?}")]
    Timeout(Duration),
    /// The engine side of the queue has been dropped.
    #[error("engine is no longer running")]
    EngineGone,
    /// The mutation queue stayed full for the whole enqueue timeout.
    #[error("mutation queue is full")]
    QueueFull,
}

/// Bounds on how long bridge calls may block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Maximum wait for a query reply.
    pub reply_timeout: Duration,
    /// Maximum wait for room in a full mutation queue.
    pub enqueue_timeout: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_millis(2000),
            enqueue_timeout: Duration::from_millis(500),
        }
    }
}

/// Cloneable handle to the engine's mutation queue.
#[derive(Clone)]
pub struct EngineBridge {
    ui: Arc<Mutex<UiHandle>>,
    policy: TimeoutPolicy,
}

impl EngineBridge {
    pub fn new(ui: UiHandle, policy: TimeoutPolicy) -> Self {
        Self {
            ui: Arc::new(Mutex::new(ui)),
            policy,
        }
    }

    pub fn policy(&self) -> TimeoutPolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, UiHandle> {
        self.ui.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues an edit. Returns once the closure is in the queue, not once it
    /// has run.
    ///
    /// If the engine is gone the closure is dropped without running.
    pub fn enqueue<F>(&self, edit: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut Instance) + Send + 'static,
    {
        let mut mutation: Mutation = Box::new(edit);
        let deadline = Instant::now() + self.policy.enqueue_timeout;

        loop {
            {
                let mut ui = self.lock();
                if ui.is_engine_gone() {
                    return Err(BridgeError::EngineGone);
                }
                match ui.send_mutation(mutation) {
                    Ok(()) => return Ok(()),
                    Err(rejected) => mutation = rejected,
                }
            }

            if Instant::now() >= deadline {
                log::warn!(
                    "mutation queue full for {:?}, dropping edit",
                    self.policy.enqueue_timeout
                );
                return Err(BridgeError::QueueFull);
            }
            thread::sleep(ENQUEUE_RETRY_INTERVAL);
        }
    }

    /// Runs a query on the engine thread and waits for its result.
    ///
    /// The query observes every mutation queued before it.
    pub fn call<R, F>(&self, query: F) -> Result<R, BridgeError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Instance) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.enqueue(move |instance| {
            // The caller may have timed out and dropped the receiver
            let _ = reply_tx.send(query(instance));
        })?;

        match reply_rx.recv_timeout(self.policy.reply_timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => {
                log::error!("engine reply timed out after {:?}", self.policy.reply_timeout);
                Err(BridgeError::Timeout(self.policy.reply_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(BridgeError::EngineGone),
        }
    }

    /// Blocks until every mutation queued so far has been applied.
    pub fn wait_for_state_update(&self) -> Result<(), BridgeError> {
        self.call(|_| ())
    }

    /// Takes all events the engine has published since the last drain.
    pub fn drain_events(&self) -> Vec<EngineEvent> {
        self.lock().drain_events().collect()
    }

    /// True once the engine side has been dropped.
    pub fn is_engine_gone(&self) -> bool {
        self.lock().is_engine_gone()
    }
}
