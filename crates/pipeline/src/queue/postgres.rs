use std::time::Duration;

use async_trait::async_trait;
use docconv_core::types::DbId;
use docconv_db::repositories::UnitRepo;
use docconv_db::DbPool;
use tokio_util::sync::CancellationToken;

use super::{ConversionUnit, Delivery, WorkQueue};
use crate::error::PipelineError;

/// How often an idle worker polls for new units.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long a claim stays exclusive before the unit is re-deliverable.
pub const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(600);

/// [`WorkQueue`] over the `conversion_units` table, shared by every worker
/// process connected to the same database.
#[derive(Clone)]
pub struct PgQueue {
    pool: DbPool,
}

impl PgQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn ticket(delivery: &Delivery) -> Result<i64, PipelineError> {
        delivery.ticket.ok_or_else(|| {
            PipelineError::Queue("delivery was not issued by the database queue".into())
        })
    }
}

#[async_trait]
impl WorkQueue for PgQueue {
    async fn enqueue(&self, unit: ConversionUnit) -> Result<(), PipelineError> {
        UnitRepo::enqueue(&self.pool, unit.job_id, &unit.filename).await?;
        Ok(())
    }

    async fn next(&self, cancel: &CancellationToken) -> Result<Option<Delivery>, PipelineError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            if let Some(row) = UnitRepo::claim_next(&self.pool, VISIBILITY_TIMEOUT).await? {
                if row.attempts > 1 {
                    tracing::warn!(
                        job_id = %row.job_id,
                        filename = %row.filename,
                        attempt = row.attempts,
                        "Re-delivering conversion unit after expired claim",
                    );
                }
                return Ok(Some(Delivery {
                    unit: ConversionUnit::new(row.job_id, row.filename),
                    attempt: u32::try_from(row.attempts).unwrap_or(1),
                    ticket: Some(row.id),
                }));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), PipelineError> {
        UnitRepo::ack(&self.pool, Self::ticket(delivery)?).await?;
        Ok(())
    }

    async fn requeue(&self, delivery: &Delivery) -> Result<(), PipelineError> {
        UnitRepo::unclaim(&self.pool, Self::ticket(delivery)?).await?;
        Ok(())
    }

    async fn purge_job(&self, job_id: DbId) -> Result<(), PipelineError> {
        let removed = UnitRepo::purge_job(&self.pool, job_id).await?;
        if removed > 0 {
            tracing::debug!(job_id = %job_id, removed, "Purged queued conversion units");
        }
        Ok(())
    }
}
