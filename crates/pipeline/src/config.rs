//! Engine configuration: which backends to use and how many workers to run.

use std::path::PathBuf;

use crate::error::PipelineError;

/// Where conversion units are queued (`BROKER_URL`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueBackend {
    /// In-process channel; workers must run in the same process.
    Memory,
    /// `conversion_units` table in the given database.
    Postgres(String),
}

/// Where fan-in reports are collected (`RESULT_BACKEND_URL`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultBackend {
    Memory,
    Postgres(String),
}

/// Where blobs are stored (`BLOB_BACKEND`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBackend {
    /// Embedded in the job and file rows.
    Database,
    /// Under [`PipelineConfig::blob_dir`].
    Filesystem,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Job store connection string.
    pub database_url: String,
    pub queue: QueueBackend,
    pub results: ResultBackend,
    pub blob_backend: BlobBackend,
    /// Root of the filesystem blob store.
    pub blob_dir: PathBuf,
    /// Concurrent conversions per worker pool (default: `4`).
    pub worker_concurrency: usize,
    /// Converter executable (default: `libreoffice`).
    pub converter_bin: PathBuf,
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default        |
    /// |----------------------|----------------|
    /// | `DATABASE_URL`       | (required)     |
    /// | `BROKER_URL`         | `memory://`    |
    /// | `RESULT_BACKEND_URL` | `memory://`    |
    /// | `BLOB_BACKEND`       | `database`     |
    /// | `BLOB_DIR`           | `/app/data`    |
    /// | `WORKER_CONCURRENCY` | `4`            |
    /// | `CONVERTER_BIN`      | `libreoffice`  |
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let database_url = lookup("DATABASE_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| PipelineError::Config("DATABASE_URL must be set".into()))?;

        let queue = match parse_backend_url("BROKER_URL", &var("BROKER_URL", "memory://"))? {
            None => QueueBackend::Memory,
            Some(url) => QueueBackend::Postgres(url),
        };
        let results = match parse_backend_url(
            "RESULT_BACKEND_URL",
            &var("RESULT_BACKEND_URL", "memory://"),
        )? {
            None => ResultBackend::Memory,
            Some(url) => ResultBackend::Postgres(url),
        };

        let blob_backend = match var("BLOB_BACKEND", "database").trim().to_ascii_lowercase().as_str() {
            "database" | "db" => BlobBackend::Database,
            "filesystem" | "fs" => BlobBackend::Filesystem,
            other => {
                return Err(PipelineError::Config(format!(
                    "BLOB_BACKEND must be 'database' or 'filesystem', got '{other}'"
                )))
            }
        };

        let worker_concurrency: usize = var("WORKER_CONCURRENCY", "4")
            .trim()
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                PipelineError::Config("WORKER_CONCURRENCY must be a positive integer".into())
            })?;

        let config = Self {
            database_url,
            queue,
            results,
            blob_backend,
            blob_dir: PathBuf::from(var("BLOB_DIR", "/app/data")),
            worker_concurrency,
            converter_bin: PathBuf::from(var("CONVERTER_BIN", "libreoffice")),
        };
        config.validate()?;
        Ok(config)
    }

    /// Workers in another process cannot reach an in-process barrier.
    fn validate(&self) -> Result<(), PipelineError> {
        if matches!(self.queue, QueueBackend::Postgres(_))
            && matches!(self.results, ResultBackend::Memory)
        {
            return Err(PipelineError::Config(
                "a postgres BROKER_URL requires a postgres RESULT_BACKEND_URL".into(),
            ));
        }
        Ok(())
    }

    /// Whether the API process must run its own worker pool.
    pub fn embedded_workers(&self) -> bool {
        self.queue == QueueBackend::Memory
    }
}

/// `memory://` -> `None`; `postgres://…` / `postgresql://…` -> `Some(url)`.
fn parse_backend_url(key: &str, url: &str) -> Result<Option<String>, PipelineError> {
    let url = url.trim();
    let scheme = url.split_once("://").map(|(scheme, _)| scheme);
    match scheme {
        Some("memory") => Ok(None),
        Some("postgres" | "postgresql") => Ok(Some(url.to_string())),
        _ => Err(PipelineError::Config(format!(
            "{key} must be memory:// or postgres://..., got '{url}'"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
