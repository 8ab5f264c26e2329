//! Repository for the fan-in barrier tables.
//!
//! A barrier row carries the expected report count; reports are upserted
//! per unit key. [`BarrierRepo::try_release`] is a conditional update that
//! succeeds for exactly one caller once every unit has reported.

use docconv_core::types::DbId;
use sqlx::PgPool;

use crate::models::barrier::{BarrierRow, NewReport, ReportRow};

/// Provides barrier operations over `fan_in_barriers` / `fan_in_reports`.
pub struct BarrierRepo;

impl BarrierRepo {
    /// Create the barrier for a job. Returns `false` if it already existed.
    pub async fn arm(pool: &PgPool, job_id: DbId, expected: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO fan_in_barriers (job_id, expected_count) VALUES ($1, $2) \
             ON CONFLICT (job_id) DO NOTHING",
        )
        .bind(job_id)
        .bind(expected)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Load a barrier's expected count and release time.
    pub async fn find(pool: &PgPool, job_id: DbId) -> Result<Option<BarrierRow>, sqlx::Error> {
        sqlx::query_as::<_, BarrierRow>(
            "SELECT expected_count, released_at FROM fan_in_barriers WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(pool)
        .await
    }

    /// Record (or replace) one unit's report while the barrier is open.
    ///
    /// Returns `false` if the barrier does not exist or was already released.
    pub async fn record(
        pool: &PgPool,
        job_id: DbId,
        report: &NewReport<'_>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO fan_in_reports (job_id, unit_key, succeeded, failure_kind, detail) \
             SELECT $1, $2, $3, $4, $5 \
             WHERE EXISTS ( \
                 SELECT 1 FROM fan_in_barriers \
                 WHERE job_id = $1 AND released_at IS NULL \
             ) \
             ON CONFLICT (job_id, unit_key) DO UPDATE \
             SET succeeded = EXCLUDED.succeeded, \
                 failure_kind = EXCLUDED.failure_kind, \
                 detail = EXCLUDED.detail, \
                 reported_at = NOW()",
        )
        .bind(job_id)
        .bind(report.unit_key)
        .bind(report.succeeded)
        .bind(report.failure_kind)
        .bind(report.detail)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count the distinct units that have reported.
    pub async fn report_count(pool: &PgPool, job_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM fan_in_reports WHERE job_id = $1")
            .bind(job_id)
            .fetch_one(pool)
            .await
    }

    /// Release the barrier if every expected unit has reported and nobody
    /// released it before. Returns `true` for the single winning caller.
    ///
    /// Concurrent callers serialize on the barrier row; the loser re-checks
    /// `released_at IS NULL` against the committed row and matches nothing.
    pub async fn try_release(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE fan_in_barriers b SET released_at = NOW() \
             WHERE b.job_id = $1 \
               AND b.released_at IS NULL \
               AND ( \
                   SELECT COUNT(*) FROM fan_in_reports r WHERE r.job_id = $1 \
               ) >= b.expected_count",
        )
        .bind(job_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All reports of a job, ordered by unit key.
    pub async fn reports(pool: &PgPool, job_id: DbId) -> Result<Vec<ReportRow>, sqlx::Error> {
        sqlx::query_as::<_, ReportRow>(
            "SELECT unit_key, succeeded, failure_kind, detail \
             FROM fan_in_reports WHERE job_id = $1 ORDER BY unit_key",
        )
        .bind(job_id)
        .fetch_all(pool)
        .await
    }

    /// Delete a barrier and its reports.
    pub async fn forget(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM fan_in_barriers WHERE job_id = $1")
            .bind(job_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
