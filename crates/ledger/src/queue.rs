//! FIFO single-flight queue for ledger operations.
//!
//! The settlement client keeps a local persistent store that tolerates only
//! one in-flight transaction: overlapping operations corrupt its pending
//! state. Every ledger-touching step in the engine funnels through this
//! queue, which drains strictly in submission order, one operation at a
//! time, with a short settle delay after each completion so the client's
//! storage transaction commits before the next operation starts.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::LedgerError;

/// Submission backlog bound. Hitting this applies backpressure to
/// submitters rather than dropping work.
const QUEUE_CAPACITY: usize = 256;

type QueueJob = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Serializes operations against the ledger client.
///
/// No priorities, no coalescing, no cancellation: a submitted operation
/// runs to completion and resolves its caller's future with the result.
/// A failing operation rejects only its own caller; the queue keeps
/// draining.
pub struct SerialQueue {
    tx: mpsc::Sender<QueueJob>,
    depth: Arc<AtomicUsize>,
}

impl SerialQueue {
    /// Create the queue and spawn its worker task.
    ///
    /// `settle_delay` is inserted after every completed operation, success
    /// or failure, before the next one starts.
    pub fn new(settle_delay: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<QueueJob>(QUEUE_CAPACITY);
        let depth = Arc::new(AtomicUsize::new(0));

        let worker_depth = depth.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job().await;
                worker_depth.fetch_sub(1, Ordering::Relaxed);
                tokio::time::sleep(settle_delay).await;
            }
            debug!("serialization queue worker stopped");
        });

        Self { tx, depth }
    }

    /// Enqueue an operation and wait for its result.
    ///
    /// The operation's body does not start until every previously submitted
    /// operation has completed and the settle delay has elapsed.
    pub async fn submit<T, F, Fut>(&self, op: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, LedgerError>> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel::<Result<T, LedgerError>>();

        let job: QueueJob = Box::new(move || {
            Box::pin(async move {
                let result = op().await;
                // The submitter may have gone away; the operation itself
                // already ran to completion either way.
                if done_tx.send(result).is_err() {
                    warn!("queued ledger operation finished but caller was dropped");
                }
            })
        });

        self.depth.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(job).await.is_err() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            return Err(LedgerError::QueueClosed);
        }

        done_rx.await.map_err(|_| LedgerError::QueueClosed)?
    }

    /// Number of operations submitted but not yet completed.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}
