//! Blob columns embedded in the `files` and `jobs` rows.
//!
//! Backs the database flavour of the blob store: original and converted
//! bytes live on the file row, the archive on the job row.

use docconv_core::types::DbId;
use sqlx::PgPool;

/// Which blob column of a `files` row to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileBlob {
    Original,
    Converted,
}

impl FileBlob {
    fn column(self) -> &'static str {
        match self {
            FileBlob::Original => "original_data",
            FileBlob::Converted => "converted_data",
        }
    }
}

/// Reads and writes embedded blob columns.
pub struct BlobRepo;

impl BlobRepo {
    /// Set (or clear, with `None`) a file blob. Returns `false` when the
    /// file row does not exist.
    pub async fn put_file_blob(
        pool: &PgPool,
        job_id: DbId,
        filename: &str,
        kind: FileBlob,
        data: Option<&[u8]>,
    ) -> Result<bool, sqlx::Error> {
        let query = format!(
            "UPDATE files SET {} = $3, updated_at = NOW() \
             WHERE job_id = $1 AND original_filename = $2",
            kind.column()
        );
        let result = sqlx::query(&query)
            .bind(job_id)
            .bind(filename)
            .bind(data)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fetch a file blob; `None` when the row or the blob is absent.
    pub async fn get_file_blob(
        pool: &PgPool,
        job_id: DbId,
        filename: &str,
        kind: FileBlob,
    ) -> Result<Option<Vec<u8>>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM files WHERE job_id = $1 AND original_filename = $2",
            kind.column()
        );
        let row: Option<Option<Vec<u8>>> = sqlx::query_scalar(&query)
            .bind(job_id)
            .bind(filename)
            .fetch_optional(pool)
            .await?;
        Ok(row.flatten())
    }

    /// Set (or clear, with `None`) a job's archive.
    pub async fn put_archive(
        pool: &PgPool,
        job_id: DbId,
        data: Option<&[u8]>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE jobs SET archive = $2, updated_at = NOW() WHERE id = $1")
            .bind(job_id)
            .bind(data)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fetch a job's archive; `None` when the job or the archive is absent.
    pub async fn get_archive(pool: &PgPool, job_id: DbId) -> Result<Option<Vec<u8>>, sqlx::Error> {
        let row: Option<Option<Vec<u8>>> =
            sqlx::query_scalar("SELECT archive FROM jobs WHERE id = $1")
                .bind(job_id)
                .fetch_optional(pool)
                .await?;
        Ok(row.flatten())
    }
}
