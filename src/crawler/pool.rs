//! Bounded worker pool for concurrent crawl sessions
//!
//! Sessions are queued on a bounded channel and picked up by a fixed set of
//! tokio tasks. A full queue either blocks the submitter or rejects the
//! submission, depending on [`OverflowPolicy`]. Sessions that share a cursor
//! key never run at the same time.

use crate::config::{OverflowPolicy, PoolConfig};
use crate::crawler::blueprint::CrawlBlueprint;
use crate::crawler::context::CrawlContext;
use crate::crawler::controller::SessionController;
use crate::crawler::session::CrawlOutcome;
use crate::ingest::IngestionCursorKey;
use crate::CrawlError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

struct QueuedSession {
    blueprint: Arc<CrawlBlueprint>,
    context: CrawlContext,
    reply: oneshot::Sender<crate::Result<CrawlOutcome>>,
}

type KeyLocks = Arc<StdMutex<HashMap<IngestionCursorKey, Arc<Mutex<()>>>>>;

/// Receiver side of a submitted session
pub struct SessionHandle {
    receiver: oneshot::Receiver<crate::Result<CrawlOutcome>>,
}

impl SessionHandle {
    /// Waits for the session to finish
    pub async fn outcome(self) -> crate::Result<CrawlOutcome> {
        self.receiver.await.map_err(|_| CrawlError::PoolClosed)?
    }
}

pub struct WorkerPool {
    sender: Option<mpsc::Sender<QueuedSession>>,
    workers: Vec<JoinHandle<()>>,
    overflow: OverflowPolicy,
    capacity: usize,
}

impl WorkerPool {
    /// Spawns `config.workers` tasks sharing one bounded queue
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(controller: Arc<SessionController>, config: &PoolConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel::<QueuedSession>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let locks: KeyLocks = Arc::new(StdMutex::new(HashMap::new()));

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                let receiver = receiver.clone();
                let controller = controller.clone();
                let locks = locks.clone();
                tokio::spawn(async move {
                    loop {
                        let next = {
                            let mut receiver = receiver.lock().await;
                            receiver.recv().await
                        };
                        let Some(queued) = next else {
                            break;
                        };

                        let key = queued.context.cursor_key();
                        let key_lock = lock_for(&locks, key.clone());
                        let outcome = {
                            let _guard = key_lock.lock().await;
                            tracing::debug!(worker, blueprint = %queued.blueprint.code, "Worker picked up session");
                            controller.run(queued.blueprint, queued.context).await
                        };
                        release_lock(&locks, &key, key_lock);
                        // The submitter may have dropped its handle
                        let _ = queued.reply.send(outcome);
                    }
                    tracing::trace!(worker, "Worker exiting");
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            overflow: config.overflow,
            capacity,
        }
    }

    /// Queues a session
    ///
    /// # Returns
    ///
    /// * `Ok(SessionHandle)` - The session was queued
    /// * `Err(CrawlError::QueueFull)` - The queue is full under the reject policy
    /// * `Err(CrawlError::PoolClosed)` - The pool has been shut down
    pub async fn submit(&self, blueprint: Arc<CrawlBlueprint>, context: CrawlContext) -> crate::Result<SessionHandle> {
        let sender = self.sender.as_ref().ok_or(CrawlError::PoolClosed)?;
        let (reply, receiver) = oneshot::channel();
        let queued = QueuedSession {
            blueprint,
            context,
            reply,
        };

        match self.overflow {
            OverflowPolicy::Block => sender.send(queued).await.map_err(|_| CrawlError::PoolClosed)?,
            OverflowPolicy::Reject => sender.try_send(queued).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => CrawlError::QueueFull {
                    capacity: self.capacity,
                },
                mpsc::error::TrySendError::Closed(_) => CrawlError::PoolClosed,
            })?,
        }

        Ok(SessionHandle { receiver })
    }

    /// Stops accepting sessions and waits for queued ones to finish
    pub async fn shutdown(mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                tracing::error!("Crawl worker panicked: {}", e);
            }
        }
    }
}

fn lock_for(locks: &KeyLocks, key: IngestionCursorKey) -> Arc<Mutex<()>> {
    let mut locks = locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(key).or_default().clone()
}

/// Drops a worker's handle on a key lock and forgets the key once no other
/// session holds or waits on it
fn release_lock(locks: &KeyLocks, key: &IngestionCursorKey, key_lock: Arc<Mutex<()>>) {
    let mut locks = locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    drop(key_lock);
    if locks.get(key).map_or(false, |lock| Arc::strong_count(lock) == 1) {
        locks.remove(key);
    }
}
