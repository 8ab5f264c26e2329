//! Wiring of store, blob, barrier and queue backends from configuration.

use std::sync::Arc;
use std::time::Duration;

use docconv_core::types::DbId;
use docconv_db::models::status::JobStatus;
use docconv_db::DbPool;

use crate::archive::ArchiveBuilder;
use crate::barrier::{FanInBarrier, MemoryBarrier, PgBarrier};
use crate::blob::{BlobStore, DbBlobStore, FsBlobStore};
use crate::config::{BlobBackend, PipelineConfig, QueueBackend, ResultBackend};
use crate::converter::Converter;
use crate::dispatcher::Dispatcher;
use crate::error::PipelineError;
use crate::queue::{MemoryQueue, PgQueue, WorkQueue};
use crate::store::{JobStore, PgJobStore};
use crate::tracker::StatusTracker;
use crate::worker::ConversionWorker;

/// Recorded on files whose conversion was lost with the previous process.
pub const INTERRUPTED_MESSAGE: &str = "Conversion was interrupted by a service restart";

/// Explicit handles to every backend, injected into each component.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn JobStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub barrier: Arc<dyn FanInBarrier>,
    pub queue: Arc<dyn WorkQueue>,
}

impl Backends {
    /// Connect to the job store and build the configured backends.
    ///
    /// Runs migrations on every distinct database it connects to.
    pub async fn connect(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let pool = connect_pool(&config.database_url).await?;
        tracing::info!("Job store connected");

        let blobs: Arc<dyn BlobStore> = match config.blob_backend {
            BlobBackend::Database => Arc::new(DbBlobStore::new(pool.clone())),
            BlobBackend::Filesystem => {
                tokio::fs::create_dir_all(&config.blob_dir).await?;
                Arc::new(FsBlobStore::new(&config.blob_dir))
            }
        };

        let barrier: Arc<dyn FanInBarrier> = match &config.results {
            ResultBackend::Memory => Arc::new(MemoryBarrier::new()),
            ResultBackend::Postgres(url) => {
                Arc::new(PgBarrier::new(reuse_or_connect(&pool, &config.database_url, url).await?))
            }
        };

        let queue: Arc<dyn WorkQueue> = match &config.queue {
            QueueBackend::Memory => Arc::new(MemoryQueue::new()),
            QueueBackend::Postgres(url) => {
                Arc::new(PgQueue::new(reuse_or_connect(&pool, &config.database_url, url).await?))
            }
        };

        tracing::info!(
            queue = config.queue.kind(),
            results = config.results.kind(),
            blobs = ?config.blob_backend,
            "Pipeline backends ready",
        );

        Ok(Self {
            store: Arc::new(PgJobStore::new(pool)),
            blobs,
            barrier,
            queue,
        })
    }

    pub fn tracker(&self) -> StatusTracker {
        StatusTracker::new(Arc::clone(&self.store))
    }

    pub fn archiver(&self) -> ArchiveBuilder {
        ArchiveBuilder::new(Arc::clone(&self.blobs), self.tracker())
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&self.store),
            Arc::clone(&self.blobs),
            Arc::clone(&self.barrier),
            Arc::clone(&self.queue),
            self.tracker(),
            self.archiver(),
        )
    }

    pub fn worker(&self, converter: Arc<dyn Converter>, timeout: Duration) -> ConversionWorker {
        ConversionWorker::new(
            Arc::clone(&self.store),
            Arc::clone(&self.blobs),
            Arc::clone(&self.barrier),
            converter,
            self.archiver(),
            timeout,
        )
    }

    /// Fail every job a previous process left `PENDING` or `IN_PROGRESS`,
    /// together with its unfinished files. Returns the number of jobs failed.
    ///
    /// Only sound while units live in process memory: at startup nothing
    /// that is not terminal can still be reported.
    pub async fn fail_interrupted_jobs(&self) -> Result<usize, PipelineError> {
        let tracker = self.tracker();
        let mut failed = 0;

        for status in [JobStatus::Pending, JobStatus::InProgress] {
            for job in self.store.list_jobs(status).await? {
                for file in self.store.list_files(job.id).await? {
                    if !file.status.is_terminal() {
                        self.store
                            .mark_file_failed(job.id, &file.original_filename, INTERRUPTED_MESSAGE)
                            .await?;
                    }
                }
                self.barrier.forget(job.id).await?;
                if tracker.mark_failed(job.id, "interrupted by restart").await? {
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            tracing::warn!(jobs = failed, "Failed jobs interrupted by a restart");
        }
        Ok(failed)
    }

    /// Remove a job with its files, blobs, barrier state and queued units.
    /// Returns `false` if the job did not exist.
    pub async fn discard_job(&self, job_id: DbId) -> Result<bool, PipelineError> {
        self.queue.purge_job(job_id).await?;
        self.barrier.forget(job_id).await?;
        self.blobs.purge_job(job_id).await?;
        let deleted = self.store.delete_job(job_id).await?;
        if deleted {
            tracing::info!(job_id = %job_id, "Job deleted");
        }
        Ok(deleted)
    }
}

impl QueueBackend {
    fn kind(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres(_) => "postgres",
        }
    }
}

impl ResultBackend {
    fn kind(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres(_) => "postgres",
        }
    }
}

async fn connect_pool(url: &str) -> Result<DbPool, PipelineError> {
    let pool = docconv_db::create_pool(url).await?;
    docconv_db::health_check(&pool).await?;
    docconv_db::run_migrations(&pool).await?;
    Ok(pool)
}

async fn reuse_or_connect(
    main: &DbPool,
    main_url: &str,
    url: &str,
) -> Result<DbPool, PipelineError> {
    if url == main_url {
        Ok(main.clone())
    } else {
        connect_pool(url).await
    }
}
