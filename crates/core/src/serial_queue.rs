//! A single-worker task queue: every submitted task runs to completion, strictly in submission
//! order, before the next one starts. Modeled on the node executor's mpsc-plus-oneshot-reply
//! handle pattern, generalized from a fixed set of typed commands to an arbitrary boxed future
//! per submission, since this system only ever has one kind of work to serialize.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

type Task = BoxFuture<'static, ()>;

#[derive(thiserror::Error, Debug)]
#[error("serial queue worker has shut down")]
pub struct SerialQueueClosed;

/// Runs submitted tasks one at a time. Spawn [`SerialQueue::run`] as its own task and keep a
/// [`SerialQueueHandle`] around to submit work to it.
pub struct SerialQueue {
    receiver: mpsc::Receiver<Task>,
}

impl SerialQueue {
    pub fn new() -> (Self, SerialQueueHandle) {
        let (sender, receiver) = mpsc::channel(32);
        (
            Self { receiver },
            SerialQueueHandle {
                sender,
                closed: Arc::new(AtomicBool::new(false)),
            },
        )
    }

    /// Drains submitted tasks until every handle is dropped. A panicking or error-returning task
    /// does not stop the loop; the next task in line still runs.
    pub async fn run(mut self) {
        while let Some(task) = self.receiver.recv().await {
            task.await;
        }
        tracing::trace!("serial queue handle dropped; stopping worker");
    }
}

#[derive(Clone)]
pub struct SerialQueueHandle {
    sender: mpsc::Sender<Task>,
    closed: Arc<AtomicBool>,
}

impl SerialQueueHandle {
    /// Submits `fut` and waits for it to run to completion, in turn, after every task submitted
    /// before it. Fails without enqueuing if [`SerialQueueHandle::end`] has already been called.
    pub async fn submit<F, T>(&self, fut: F) -> Result<T, SerialQueueClosed>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SerialQueueClosed);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        let task: Task = Box::pin(async move {
            let result = fut.await;
            // Receiver may have been dropped if the submitter stopped waiting; nothing to do.
            let _ = reply_tx.send(result);
        });
        self.sender.send(task).await.map_err(|_| SerialQueueClosed)?;
        reply_rx.await.map_err(|_| SerialQueueClosed)
    }

    /// Refuses all future submissions, then waits for every task already queued to finish.
    /// Implemented as a barrier task appended after the closed flag is raised: since the queue
    /// is strictly FIFO, the barrier only completes once everything queued before `end()` has
    /// run, which is exactly "drain".
    pub async fn end(&self) -> Result<(), SerialQueueClosed> {
        self.closed.store(true, Ordering::SeqCst);
        let (reply_tx, reply_rx) = oneshot::channel();
        let task: Task = Box::pin(async move {
            let _ = reply_tx.send(());
        });
        self.sender.send(task).await.map_err(|_| SerialQueueClosed)?;
        reply_rx.await.map_err(|_| SerialQueueClosed)
    }
}
