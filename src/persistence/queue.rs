//! Write-behind persistence queue (§4.9).
//!
//! Grounded on `original_source/channels/core/storageInsert.go`: a bounded
//! channel feeding N worker tasks, with two selectable drain policies.
//! `Start()` (the active Go code path) writes one event per receive --
//! `single_insert_mode = true` here. The commented-out `Startx()` batches
//! up to `CacheLimit` events or flushes every `CacheTimeout`, whichever
//! comes first -- the default here, since it is the mode the config
//! exposes tuning knobs for.

use crate::config::PersistenceConfig;
use crate::persistence::{EventRecord, EventRepository};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

/// Handle for submitting events to the write-behind queue. Cloning is
/// cheap; every clone shares the same bounded channel.
#[derive(Clone)]
pub struct PersistenceQueue {
    sender: mpsc::Sender<EventRecord>,
}

impl PersistenceQueue {
    /// Spawn the worker pool and return a handle for enqueuing events.
    ///
    /// Workers run until every [`PersistenceQueue`] clone (and thus every
    /// sender) is dropped, at which point each worker flushes whatever it
    /// is holding and exits.
    pub fn spawn<R>(repository: Arc<R>, config: PersistenceConfig) -> Self
    where
        R: EventRepository + 'static,
    {
        let (sender, receiver) = mpsc::channel(config.cache_queue_size);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        for worker_id in 0..config.resolved_db_workers() {
            let repository = repository.clone();
            let receiver = receiver.clone();
            let config = config.clone();
            tokio::spawn(async move {
                if config.single_insert_mode {
                    run_single_insert_worker(worker_id, repository, receiver).await;
                } else {
                    run_batching_worker(worker_id, repository, receiver, &config).await;
                }
            });
        }

        Self { sender }
    }

    /// Enqueue an event for eventual persistence. Backpressures the caller
    /// if the queue is full; drops the event with a logged warning if every
    /// worker has already shut down.
    pub async fn enqueue(&self, record: EventRecord) {
        crate::metrics::PERSISTENCE_QUEUE_DEPTH.inc();
        if self.sender.send(record).await.is_err() {
            tracing::warn!("persistence queue closed, dropping event");
        }
    }

    /// Non-blocking enqueue; returns `false` if the queue is full or closed.
    pub fn try_enqueue(&self, record: EventRecord) -> bool {
        match self.sender.try_send(record) {
            Ok(()) => {
                crate::metrics::PERSISTENCE_QUEUE_DEPTH.inc();
                true
            }
            Err(_) => false,
        }
    }
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<EventRecord>>>;

async fn run_single_insert_worker<R>(worker_id: usize, repository: Arc<R>, receiver: SharedReceiver)
where
    R: EventRepository + 'static,
{
    loop {
        let record = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(record) = record else {
            tracing::debug!(worker_id, "persistence worker shutting down");
            return;
        };

        crate::metrics::PERSISTENCE_QUEUE_DEPTH.dec();
        if let Err(err) = repository.insert_event(&record).await {
            tracing::error!(worker_id, error = %err, "failed to persist event");
        }
    }
}

async fn run_batching_worker<R>(
    worker_id: usize,
    repository: Arc<R>,
    receiver: SharedReceiver,
    config: &PersistenceConfig,
) where
    R: EventRepository + 'static,
{
    let mut batch = Vec::with_capacity(config.insert_cache_limit);
    let timeout = config.insert_cache_timeout();

    loop {
        let deadline = Instant::now() + timeout;
        let mut receiver = receiver.lock().await;

        loop {
            match tokio::time::timeout_at(deadline, receiver.recv()).await {
                Ok(Some(record)) => {
                    crate::metrics::PERSISTENCE_QUEUE_DEPTH.dec();
                    batch.push(record);
                    if batch.len() >= config.insert_cache_limit {
                        break;
                    }
                }
                Ok(None) => {
                    drop(receiver);
                    flush(worker_id, &repository, &mut batch).await;
                    tracing::debug!(worker_id, "persistence worker shutting down");
                    return;
                }
                Err(_) => break,
            }
        }
        drop(receiver);

        flush(worker_id, &repository, &mut batch).await;
    }
}

async fn flush<R>(worker_id: usize, repository: &Arc<R>, batch: &mut Vec<EventRecord>)
where
    R: EventRepository + 'static,
{
    if batch.is_empty() {
        return;
    }
    let flushed = batch.len();
    if let Err(err) = repository.insert_events(batch).await {
        tracing::error!(worker_id, error = %err, count = flushed, "failed to persist batch");
    } else {
        let trigger = if flushed >= batch.capacity() { "size" } else { "timeout" };
        crate::metrics::PERSISTENCE_BATCHES_FLUSHED
            .with_label_values(&[trigger])
            .inc();
        tracing::debug!(worker_id, count = flushed, "flushed batch");
    }
    batch.clear();
}
