//! Repository for the `jobs` table.
//!
//! Status changes go through [`JobRepo::transition`], which only applies a
//! move the [`JobStatus`] state machine allows.

use docconv_core::types::{new_id, DbId};
use sqlx::PgPool;

use crate::models::job::Job;
use crate::models::status::{JobStatus, StatusId};

/// Column list for `jobs` queries.
const COLUMNS: &str = "id, status_id, created_at, updated_at";

/// Provides CRUD operations for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job in `PENDING` status.
    pub async fn create(pool: &PgPool) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (id, status_id) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(new_id())
            .bind(JobStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All jobs currently in `status`, oldest first.
    pub async fn list_by_status(pool: &PgPool, status: JobStatus) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE status_id = $1 ORDER BY created_at, id"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(status.id())
            .fetch_all(pool)
            .await
    }

    /// Move a job to `to` if its current status is a legal predecessor.
    ///
    /// Returns `false` when the job does not exist or the move is not
    /// allowed (including any move out of a terminal status).
    pub async fn transition(pool: &PgPool, id: DbId, to: JobStatus) -> Result<bool, sqlx::Error> {
        let from: Vec<StatusId> = to.predecessors().iter().map(|s| s.id()).collect();
        let result = sqlx::query(
            "UPDATE jobs SET status_id = $2, updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($3)",
        )
        .bind(id)
        .bind(to.id())
        .bind(&from)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a job; its files go with it (`ON DELETE CASCADE`).
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
