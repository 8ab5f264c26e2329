//! Conversion worker pool launcher.
//!
//! Used by the standalone `docconv-worker` binary and by the API when it
//! runs with the in-process queue.

use std::sync::Arc;

use docconv_pipeline::backends::Backends;
use docconv_pipeline::config::PipelineConfig;
use docconv_pipeline::converter::LibreOfficeConverter;
use docconv_pipeline::pool::WorkerPool;
use docconv_pipeline::worker::CONVERSION_TIMEOUT;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Start a worker pool converting with the configured LibreOffice binary.
///
/// The pool stops once `cancel` fires and every unit in hand is finished;
/// await the returned handle to wait for that.
pub fn spawn_workers(
    backends: &Backends,
    config: &PipelineConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let converter = Arc::new(LibreOfficeConverter::new(&config.converter_bin));
    let worker = Arc::new(backends.worker(converter, CONVERSION_TIMEOUT));
    let pool = WorkerPool::new(worker, Arc::clone(&backends.queue), config.worker_concurrency);

    tracing::info!(
        converter = %config.converter_bin.display(),
        concurrency = config.worker_concurrency,
        timeout_secs = CONVERSION_TIMEOUT.as_secs(),
        "Spawning conversion workers",
    );
    tokio::spawn(pool.run(cancel))
}
