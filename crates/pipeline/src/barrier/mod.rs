//! Fan-in barrier: the join point of a job's conversion units.
//!
//! A barrier is armed once per job with the number of dispatched units.
//! Every unit reports exactly one [`UnitOutcome`] keyed by its filename; the
//! report that completes the set receives [`Release::Released`] with all
//! outcomes, and no other report ever does.

use async_trait::async_trait;
use docconv_core::types::DbId;

use crate::error::PipelineError;
use crate::outcome::UnitOutcome;

mod memory;
mod postgres;

pub use memory::MemoryBarrier;
pub use postgres::PgBarrier;

/// Result of reporting one outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    /// Recorded; the barrier is still waiting for other units.
    Pending { reported: usize, expected: usize },
    /// This report completed the set. Outcomes are ordered by filename.
    Released(Vec<UnitOutcome>),
    /// The barrier had already released; the report was dropped.
    AlreadyReleased,
    /// No barrier is armed for the job; the report was dropped.
    Unknown,
}

#[async_trait]
pub trait FanInBarrier: Send + Sync {
    /// Arm the barrier for `job_id` expecting `expected` distinct reports.
    ///
    /// `expected` must be positive. Arming the same job twice is a conflict.
    async fn arm(&self, job_id: DbId, expected: usize) -> Result<(), PipelineError>;

    /// Record one unit's outcome. A repeat report for the same filename
    /// before release replaces the earlier one and is counted once.
    async fn report(&self, job_id: DbId, outcome: UnitOutcome) -> Result<Release, PipelineError>;

    /// Drop all barrier state for a job.
    async fn forget(&self, job_id: DbId) -> Result<(), PipelineError>;
}
