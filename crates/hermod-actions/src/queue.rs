//! Per-session serialized send queue.
//!
//! Every backend call the interpreter makes is routed through the owning
//! session's queue: a single worker task draining an unbounded channel. That
//! makes the queue the sole serialization point for one session's backend
//! traffic — `parallel` action branches run concurrently at the interpreter
//! level, but their sends still reach the backend strictly one at a time,
//! in enqueue order.

use std::{collections::HashMap, future::Future, pin::Pin};

use hermod_core::models::SessionId;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::debug;

use crate::error::{ActionError, Result};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handle to one session's single-worker send queue.
///
/// Cloning shares the same worker; the worker stops when every handle is
/// dropped and queued work has drained.
#[derive(Debug, Clone)]
pub struct SessionQueue {
    session: SessionId,
    tx: mpsc::UnboundedSender<Job>,
}

impl SessionQueue {
    /// Spawns the worker task and returns its handle.
    pub fn spawn(session: SessionId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let worker_session = session.clone();
        tokio::spawn(async move {
            debug!(session = %worker_session, "session send queue started");
            while let Some(job) = rx.recv().await {
                job.await;
            }
            debug!(session = %worker_session, "session send queue stopped");
        });
        Self { session, tx }
    }

    /// Enqueues one unit of work and awaits its result.
    ///
    /// Work enqueued while earlier work is still running waits its turn;
    /// completion order equals enqueue order.
    pub async fn run<T, F>(&self, work: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = done_tx.send(work.await);
        });

        self.tx
            .send(job)
            .map_err(|_| ActionError::queue_closed(self.session.as_str()))?;
        done_rx.await.map_err(|_| ActionError::queue_closed(self.session.as_str()))
    }
}

/// Lazily-created registry of per-session queues.
#[derive(Debug, Default)]
pub struct SessionQueues {
    queues: Mutex<HashMap<SessionId, SessionQueue>>,
}

impl SessionQueues {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session's queue, spawning its worker on first use.
    pub async fn queue_for(&self, session: &SessionId) -> SessionQueue {
        let mut queues = self.queues.lock().await;
        queues
            .entry(session.clone())
            .or_insert_with(|| SessionQueue::spawn(session.clone()))
            .clone()
    }
}
