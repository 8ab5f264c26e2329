use async_trait::async_trait;
use docconv_core::error::CoreError;
use docconv_core::types::DbId;
use docconv_db::models::barrier::{NewReport, ReportRow};
use docconv_db::repositories::BarrierRepo;
use docconv_db::DbPool;

use super::{FanInBarrier, Release};
use crate::error::PipelineError;
use crate::outcome::{FailureKind, UnitOutcome};

/// [`FanInBarrier`] backed by `fan_in_barriers` / `fan_in_reports`.
///
/// Reports are upserted per unit key while the barrier is open; release is a
/// conditional update won by exactly one reporter, so workers in separate
/// processes join correctly.
#[derive(Clone)]
pub struct PgBarrier {
    pool: DbPool,
}

impl PgBarrier {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn outcome_from_row(row: ReportRow) -> UnitOutcome {
    if row.succeeded {
        return UnitOutcome::success(row.unit_key);
    }
    let kind = row
        .failure_kind
        .as_deref()
        .and_then(FailureKind::from_label)
        .unwrap_or(FailureKind::Converter);
    UnitOutcome::failure(row.unit_key, kind, row.detail.unwrap_or_default())
}

#[async_trait]
impl FanInBarrier for PgBarrier {
    async fn arm(&self, job_id: DbId, expected: usize) -> Result<(), PipelineError> {
        let expected = i32::try_from(expected)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                CoreError::Validation(format!("Invalid barrier size: {expected}"))
            })?;
        if !BarrierRepo::arm(&self.pool, job_id, expected).await? {
            return Err(CoreError::Conflict(format!("Barrier already armed for job {job_id}")).into());
        }
        Ok(())
    }

    async fn report(&self, job_id: DbId, outcome: UnitOutcome) -> Result<Release, PipelineError> {
        let report = match &outcome {
            UnitOutcome::Success { filename } => NewReport {
                unit_key: filename,
                succeeded: true,
                failure_kind: None,
                detail: None,
            },
            UnitOutcome::Failure {
                filename,
                kind,
                detail,
            } => NewReport {
                unit_key: filename,
                succeeded: false,
                failure_kind: Some(kind.as_str()),
                detail: Some(detail.as_str()),
            },
        };

        if !BarrierRepo::record(&self.pool, job_id, &report).await? {
            return Ok(match BarrierRepo::find(&self.pool, job_id).await? {
                Some(_) => Release::AlreadyReleased,
                None => Release::Unknown,
            });
        }

        if BarrierRepo::try_release(&self.pool, job_id).await? {
            let rows = BarrierRepo::reports(&self.pool, job_id).await?;
            return Ok(Release::Released(rows.into_iter().map(outcome_from_row).collect()));
        }

        let reported = BarrierRepo::report_count(&self.pool, job_id).await?;
        let expected = BarrierRepo::find(&self.pool, job_id)
            .await?
            .map(|b| b.expected_count)
            .unwrap_or_default();
        Ok(Release::Pending {
            reported: usize::try_from(reported).unwrap_or_default(),
            expected: usize::try_from(expected).unwrap_or_default(),
        })
    }

    async fn forget(&self, job_id: DbId) -> Result<(), PipelineError> {
        BarrierRepo::forget(&self.pool, job_id).await?;
        Ok(())
    }
}
