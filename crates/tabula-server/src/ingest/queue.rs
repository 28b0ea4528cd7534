//! Ingestion job queue
//!
//! Uploads enqueue a file id and return at once. A dispatcher task drains the
//! channel and runs each job on its own task, bounded by a semaphore of
//! `worker_concurrency` permits. A file id can be queued or running at most
//! once at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::IngestConfig;
use super::pipeline::{IngestOutcome, IngestionPipeline};
use crate::storage::Storage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Ingestion for file {0} is already queued or running")]
    AlreadyRunning(i64),

    #[error("Ingestion queue is full")]
    Full,

    #[error("Ingestion queue is closed")]
    Closed,
}

type InFlight = Arc<Mutex<HashSet<i64>>>;

/// Holds a file id in the in-flight set until dropped
struct InFlightGuard {
    file_id: i64,
    in_flight: InFlight,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.file_id);
    }
}

struct IngestionJob {
    file_id: i64,
    guard: InFlightGuard,
    reply: oneshot::Sender<IngestOutcome>,
}

/// Handle to a submitted job
#[derive(Debug)]
pub struct IngestionTicket {
    file_id: i64,
    receiver: oneshot::Receiver<IngestOutcome>,
}

impl IngestionTicket {
    pub fn file_id(&self) -> i64 {
        self.file_id
    }

    /// Wait for the job to finish
    pub async fn wait(self) -> IngestOutcome {
        self.receiver.await.unwrap_or_else(|_| IngestOutcome::Failed {
            processed_rows: 0,
            error: "ingestion worker stopped before reporting".to_string(),
        })
    }
}

/// Cloneable producer side of the queue
#[derive(Clone)]
pub struct IngestionQueue {
    sender: mpsc::Sender<IngestionJob>,
    in_flight: InFlight,
}

impl IngestionQueue {
    /// Spawn the dispatcher and return the queue handle with its join handle
    ///
    /// The dispatcher stops once every `IngestionQueue` clone is dropped, after
    /// letting running jobs finish.
    pub fn start(db: SqlitePool, storage: Storage, config: IngestConfig) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let workers = config.worker_concurrency.max(1);
        let pipeline = IngestionPipeline::new(db, storage, config);

        let handle = tokio::spawn(dispatch(receiver, pipeline, workers));

        info!(workers, "Ingestion queue started");

        let queue = Self {
            sender,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        };
        (queue, handle)
    }

    /// Enqueue ingestion of `file_id` without waiting for it to run
    pub fn submit(&self, file_id: i64) -> Result<IngestionTicket, QueueError> {
        let guard = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if !in_flight.insert(file_id) {
                return Err(QueueError::AlreadyRunning(file_id));
            }
            InFlightGuard {
                file_id,
                in_flight: Arc::clone(&self.in_flight),
            }
        };

        let (reply, receiver) = oneshot::channel();
        let job = IngestionJob { file_id, guard, reply };

        // A rejected job drops its guard, freeing the file id again
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;

        debug!(file_id, "Ingestion job queued");

        Ok(IngestionTicket { file_id, receiver })
    }

    pub fn is_in_flight(&self, file_id: i64) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&file_id)
    }
}

async fn dispatch(mut receiver: mpsc::Receiver<IngestionJob>, pipeline: IngestionPipeline, workers: usize) {
    let permits = Arc::new(Semaphore::new(workers));

    while let Some(job) = receiver.recv().await {
        let permit = match Arc::clone(&permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let pipeline = pipeline.clone();

        tokio::spawn(async move {
            let IngestionJob { file_id, guard, reply } = job;
            let outcome = pipeline.run(file_id).await;

            // Release the file id before anyone waiting on the ticket resumes
            drop(guard);
            drop(permit);

            if reply.send(outcome).is_err() {
                debug!(file_id, "Ingestion ticket dropped before completion");
            }
        });
    }

    // Wait for running jobs by taking every permit back
    match permits.acquire_many(workers as u32).await {
        Ok(_) => info!("Ingestion queue drained"),
        Err(e) => warn!(error = %e, "Ingestion queue stopped without draining"),
    };
}
