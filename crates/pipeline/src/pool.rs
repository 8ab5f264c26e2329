//! Worker pool: N independent loops pulling units from the work queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::queue::WorkQueue;
use crate::worker::ConversionWorker;

/// Pause after a queue or reporting error before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct WorkerPool {
    worker: Arc<ConversionWorker>,
    queue: Arc<dyn WorkQueue>,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(worker: Arc<ConversionWorker>, queue: Arc<dyn WorkQueue>, concurrency: usize) -> Self {
        Self {
            worker,
            queue,
            concurrency: concurrency.max(1),
        }
    }

    /// Run until `cancel` fires. A unit in hand is finished before its loop
    /// exits.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(concurrency = self.concurrency, "Worker pool started");

        let mut loops = JoinSet::new();
        for slot in 0..self.concurrency {
            loops.spawn(worker_loop(
                slot,
                Arc::clone(&self.worker),
                Arc::clone(&self.queue),
                cancel.clone(),
            ));
        }

        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker loop panicked");
            }
        }

        tracing::info!("Worker pool stopped");
    }
}

async fn worker_loop(
    slot: usize,
    worker: Arc<ConversionWorker>,
    queue: Arc<dyn WorkQueue>,
    cancel: CancellationToken,
) {
    loop {
        let delivery = match queue.next(&cancel).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(slot, error = %e, "Failed to fetch next unit");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(ERROR_BACKOFF) => continue,
                }
            }
        };

        let unit = &delivery.unit;
        tracing::debug!(
            slot,
            job_id = %unit.job_id,
            filename = %unit.filename,
            attempt = delivery.attempt,
            "Processing unit",
        );

        // Not raced against `cancel`: conversions are never abandoned midway.
        match worker.process(unit).await {
            Ok(_) => {
                if let Err(e) = queue.ack(&delivery).await {
                    tracing::error!(slot, job_id = %unit.job_id, filename = %unit.filename, error = %e, "Failed to ack unit");
                }
            }
            Err(e) => {
                tracing::error!(
                    slot,
                    job_id = %unit.job_id,
                    filename = %unit.filename,
                    error = %e,
                    "Unit could not be reported, requeueing",
                );
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                }
                if let Err(e) = queue.requeue(&delivery).await {
                    tracing::error!(slot, job_id = %unit.job_id, filename = %unit.filename, error = %e, "Failed to requeue unit");
                }
            }
        }
    }
}
