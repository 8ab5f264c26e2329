//! Error types for the orchestration engine.

use std::time::Duration;

use docconv_core::error::CoreError;

use crate::outcome::FailureKind;

/// Errors raised by the engine's own operations (dispatch, storage, queue,
/// barrier, archive). Conversion failures are [`ConversionError`] and never
/// escape a worker.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A domain-level error (validation, not found, conflict).
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A row the operation depends on does not exist.
    #[error("{entity} not found: {key}")]
    MissingRecord { entity: &'static str, key: String },

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A background task panicked or was aborted.
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Why a single conversion unit failed.
///
/// Captured into the file's `error_message` and the barrier report; never
/// surfaced to the submitting client.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Input file not found: {0}")]
    MissingInput(String),

    #[error("Failed to start converter: {0}")]
    Spawn(std::io::Error),

    #[error("Converter failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Converter produced no output")]
    NoOutput,

    #[error("Conversion timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading the input or persisting the result failed.
    #[error("Storage error: {0}")]
    Storage(#[from] PipelineError),
}

impl ConversionError {
    /// Classify the error for the barrier report.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::MissingInput(_) => FailureKind::MissingInput,
            Self::Spawn(_) | Self::ExecutionFailed { .. } | Self::NoOutput => FailureKind::Converter,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Io(_) => FailureKind::Io,
            Self::Storage(_) => FailureKind::Storage,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
