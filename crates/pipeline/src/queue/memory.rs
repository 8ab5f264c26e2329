use async_trait::async_trait;
use docconv_core::types::DbId;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::{ConversionUnit, Delivery, WorkQueue};
use crate::error::PipelineError;

/// In-process [`WorkQueue`] over an unbounded channel.
///
/// Workers share the receiver; whichever worker holds the lock takes the
/// next unit. Units do not survive a restart.
pub struct MemoryQueue {
    tx: mpsc::UnboundedSender<(ConversionUnit, u32)>,
    rx: Mutex<mpsc::UnboundedReceiver<(ConversionUnit, u32)>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    fn send(&self, unit: ConversionUnit, attempt: u32) -> Result<(), PipelineError> {
        self.tx
            .send((unit, attempt))
            .map_err(|_| PipelineError::Queue("work queue is closed".into()))
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn enqueue(&self, unit: ConversionUnit) -> Result<(), PipelineError> {
        self.send(unit, 1)
    }

    async fn next(&self, cancel: &CancellationToken) -> Result<Option<Delivery>, PipelineError> {
        tokio::select! {
            _ = cancel.cancelled() => Ok(None),
            next = async { self.rx.lock().await.recv().await } => Ok(next.map(|(unit, attempt)| Delivery {
                unit,
                attempt,
                ticket: None,
            })),
        }
    }

    async fn ack(&self, _delivery: &Delivery) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn requeue(&self, delivery: &Delivery) -> Result<(), PipelineError> {
        self.send(delivery.unit.clone(), delivery.attempt.saturating_add(1))
    }

    async fn purge_job(&self, _job_id: DbId) -> Result<(), PipelineError> {
        // An idle worker parks inside `recv` holding the receiver, so the
        // channel cannot be filtered. Workers skip units of missing jobs.
        Ok(())
    }
}
