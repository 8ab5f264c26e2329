//! Work queue carrying conversion units from the dispatcher to workers.
//!
//! Delivery is at-least-once: a unit is removed only by [`WorkQueue::ack`],
//! a unit that could not be reported goes back through [`WorkQueue::requeue`],
//! and the database backend re-delivers units whose claim expired. Workers
//! are idempotent per unit, so a re-delivery is harmless.

use async_trait::async_trait;
use docconv_core::types::DbId;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

mod memory;
mod postgres;

pub use memory::MemoryQueue;
pub use postgres::PgQueue;

/// One file of one job: the unit of fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionUnit {
    pub job_id: DbId,
    pub filename: String,
}

impl ConversionUnit {
    pub fn new(job_id: DbId, filename: impl Into<String>) -> Self {
        Self {
            job_id,
            filename: filename.into(),
        }
    }
}

/// A unit handed to a worker.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub unit: ConversionUnit,
    /// Delivery attempt, starting at 1.
    pub attempt: u32,
    /// Backend handle used by `ack`.
    pub(crate) ticket: Option<i64>,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, unit: ConversionUnit) -> Result<(), PipelineError>;

    /// Wait for the next unit. Returns `None` once `cancel` fires or the
    /// queue is closed.
    async fn next(&self, cancel: &CancellationToken) -> Result<Option<Delivery>, PipelineError>;

    /// Mark a delivered unit as finished.
    async fn ack(&self, delivery: &Delivery) -> Result<(), PipelineError>;

    /// Hand a delivered unit back for another attempt.
    async fn requeue(&self, delivery: &Delivery) -> Result<(), PipelineError>;

    /// Drop every pending unit of a job.
    async fn purge_job(&self, job_id: DbId) -> Result<(), PipelineError>;
}
