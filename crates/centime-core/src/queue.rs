//! FIFO serialization of a session's asynchronous work.
//!
//! Each allocation session owns one queue. Tasks enqueue at submission
//! time and a single worker awaits them strictly in order, so no two
//! tasks of the same session ever have overlapping store calls in
//! flight. A task's failure travels only through its own completion
//! handle; the worker keeps draining regardless.

use std::future::Future;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// The queue worker has shut down before the task could complete.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("exclusive queue closed")]
pub struct QueueClosed;

pub struct ExclusiveQueue {
    tx: mpsc::UnboundedSender<BoxFuture<'static, ()>>,
}

impl ExclusiveQueue {
    /// Spawns the worker loop. Requires a running tokio runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<BoxFuture<'static, ()>>();
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                task.await;
            }
        });
        Self { tx }
    }

    /// Enqueues `task` and returns a future resolving to its output once
    /// every previously submitted task has settled. Tasks convey failure
    /// through their output value (typically a `Result`); the queue never
    /// interprets it.
    pub fn submit<T, F>(&self, task: F) -> impl Future<Output = Result<T, QueueClosed>>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let wrapped: BoxFuture<'static, ()> = Box::pin(async move {
            let _ = done_tx.send(task.await);
        });
        let enqueued = self.tx.send(wrapped).is_ok();
        async move {
            if !enqueued {
                return Err(QueueClosed);
            }
            done_rx.await.map_err(|_| QueueClosed)
        }
    }
}

impl Default for ExclusiveQueue {
    fn default() -> Self {
        Self::new()
    }
}
