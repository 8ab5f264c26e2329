//! Repository for the `conversion_units` work queue.
//!
//! Uses `SELECT FOR UPDATE SKIP LOCKED` in [`UnitRepo::claim_next`] so
//! concurrent workers never receive the same unit.

use std::time::Duration;

use docconv_core::types::DbId;
use sqlx::PgPool;

use crate::models::unit::UnitRow;

/// Provides queue operations over `conversion_units`.
pub struct UnitRepo;

impl UnitRepo {
    /// Append a unit to the queue. Returns its queue id.
    pub async fn enqueue(pool: &PgPool, job_id: DbId, filename: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO conversion_units (job_id, filename) VALUES ($1, $2) RETURNING id",
        )
        .bind(job_id)
        .bind(filename)
        .fetch_one(pool)
        .await
    }

    /// Atomically claim the oldest unit that is unclaimed or whose claim is
    /// older than `visibility_timeout`.
    pub async fn claim_next(
        pool: &PgPool,
        visibility_timeout: Duration,
    ) -> Result<Option<UnitRow>, sqlx::Error> {
        sqlx::query_as::<_, UnitRow>(
            "UPDATE conversion_units \
             SET claimed_at = NOW(), attempts = attempts + 1 \
             WHERE id = ( \
                 SELECT id FROM conversion_units \
                 WHERE claimed_at IS NULL \
                    OR claimed_at < NOW() - make_interval(secs => $1) \
                 ORDER BY id \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING id, job_id, filename, attempts",
        )
        .bind(visibility_timeout.as_secs_f64())
        .fetch_optional(pool)
        .await
    }

    /// Remove a finished unit from the queue.
    pub async fn ack(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM conversion_units WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clear a claim so the unit is handed out again on the next poll.
    pub async fn unclaim(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE conversion_units SET claimed_at = NULL WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop every queued unit of a job. Returns the number removed.
    pub async fn purge_job(pool: &PgPool, job_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM conversion_units WHERE job_id = $1")
            .bind(job_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
