//! End-to-end fan-out / fan-in runs over the in-process backends.

use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use docconv_core::error::CoreError;
use docconv_core::types::DbId;
use docconv_db::models::file::JobFile;
use docconv_db::models::job::Job;
use docconv_db::models::status::{FileStatus, JobStatus};
use docconv_pipeline::backends::{Backends, INTERRUPTED_MESSAGE};
use docconv_pipeline::barrier::{FanInBarrier, MemoryBarrier, Release};
use docconv_pipeline::blob::{BlobKey, BlobStore, FsBlobStore};
use docconv_pipeline::converter::Converter;
use docconv_pipeline::dispatcher::UploadedFile;
use docconv_pipeline::error::{ConversionError, PipelineError};
use docconv_pipeline::outcome::UnitOutcome;
use docconv_pipeline::pool::WorkerPool;
use docconv_pipeline::queue::{ConversionUnit, Delivery, MemoryQueue, WorkQueue};
use docconv_pipeline::store::{JobStore, MemoryJobStore};
use docconv_pipeline::worker::UnitDisposition;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Prefixes the input with `%PDF:`; fails on `fail`, hangs on `slow`.
#[derive(Default)]
struct StubConverter {
    calls: AtomicUsize,
}

#[async_trait]
impl Converter for StubConverter {
    async fn convert(&self, input: &[u8]) -> Result<Vec<u8>, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match input {
            b"fail" => Err(ConversionError::ExecutionFailed {
                exit_code: Some(1),
                stderr: "Error: source file could not be loaded".into(),
            }),
            b"slow" => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(b"%PDF:late".to_vec())
            }
            other => Ok([b"%PDF:".as_slice(), other].concat()),
        }
    }
}

struct Harness {
    backends: Backends,
    converter: Arc<StubConverter>,
    blob_dir: TempDir,
}

fn harness() -> Harness {
    let blob_dir = tempfile::tempdir().unwrap();
    let backends = Backends {
        store: Arc::new(MemoryJobStore::new()),
        blobs: Arc::new(FsBlobStore::new(blob_dir.path())),
        barrier: Arc::new(MemoryBarrier::new()),
        queue: Arc::new(MemoryQueue::new()),
    };
    Harness {
        backends,
        converter: Arc::new(StubConverter::default()),
        blob_dir,
    }
}

impl Harness {
    fn start_pool(&self, concurrency: usize) -> CancellationToken {
        let worker = self
            .backends
            .worker(self.converter.clone(), Duration::from_millis(200));
        let pool = WorkerPool::new(Arc::new(worker), self.backends.queue.clone(), concurrency);
        let cancel = CancellationToken::new();
        tokio::spawn(pool.run(cancel.clone()));
        cancel
    }

    async fn wait_terminal(&self, job_id: DbId) -> JobStatus {
        wait_terminal_in(self.backends.store.as_ref(), job_id).await
    }

    async fn archive_entries(&self, job_id: DbId) -> Vec<(String, Vec<u8>)> {
        let archive = self
            .backends
            .blobs
            .get(BlobKey::archive(job_id))
            .await
            .unwrap()
            .expect("archive stored");
        let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            entries.push((file.name().to_string(), data));
        }
        entries.sort();
        entries
    }
}

async fn wait_terminal_in(store: &dyn JobStore, job_id: DbId) -> JobStatus {
    for _ in 0..200 {
        let job = store.find_job(job_id).await.unwrap().unwrap();
        if job.status.is_terminal() {
            return job.status;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {job_id} did not reach a terminal status");
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_success_completes_with_successful_entries_only() {
    let h = harness();
    let dispatcher = h.backends.dispatcher();

    let submission = dispatcher
        .submit(vec![
            UploadedFile::new("a.docx", b"alpha".to_vec()),
            UploadedFile::new("b.docx", b"slow".to_vec()),
            UploadedFile::new("c.txt", b"ignored".to_vec()),
        ])
        .await
        .unwrap();
    assert_eq!(submission.accepted_file_count, 2);

    let files = h.backends.store.list_files(submission.job_id).await.unwrap();
    assert_eq!(files.len(), 2);
    let job = h.backends.store.find_job(submission.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::InProgress);

    let cancel = h.start_pool(2);
    let status = h.wait_terminal(submission.job_id).await;
    cancel.cancel();

    assert_eq!(status, JobStatus::Completed);
    assert_eq!(
        h.archive_entries(submission.job_id).await,
        vec![("a.pdf".to_string(), b"%PDF:alpha".to_vec())]
    );

    let b = h
        .backends
        .store
        .find_file(submission.job_id, "b.docx")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(b.status, FileStatus::Failed);
    assert!(b.error_message.as_deref().is_some_and(|m| !m.is_empty()));
    assert!(h
        .backends
        .blobs
        .get(BlobKey::converted(submission.job_id, "b.docx"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn every_file_failing_fails_job_without_archive() {
    let h = harness();
    let submission = h
        .backends
        .dispatcher()
        .submit(vec![
            UploadedFile::new("a.docx", b"fail".to_vec()),
            UploadedFile::new("b.docx", b"fail".to_vec()),
        ])
        .await
        .unwrap();

    let cancel = h.start_pool(4);
    let status = h.wait_terminal(submission.job_id).await;
    cancel.cancel();

    assert_eq!(status, JobStatus::Failed);
    assert!(h
        .backends
        .blobs
        .get(BlobKey::archive(submission.job_id))
        .await
        .unwrap()
        .is_none());

    for file in h.backends.store.list_files(submission.job_id).await.unwrap() {
        assert_eq!(file.status, FileStatus::Failed);
        assert!(file
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("source file could not be loaded")));
    }
}

#[tokio::test]
async fn many_files_all_packaged() {
    let h = harness();
    let uploads: Vec<_> = (0..12)
        .map(|i| UploadedFile::new(format!("doc{i:02}.DOCX"), format!("body {i}").into_bytes()))
        .collect();
    let submission = h.backends.dispatcher().submit(uploads).await.unwrap();
    assert_eq!(submission.accepted_file_count, 12);

    let cancel = h.start_pool(4);
    let status = h.wait_terminal(submission.job_id).await;
    cancel.cancel();

    assert_eq!(status, JobStatus::Completed);
    let entries = h.archive_entries(submission.job_id).await;
    assert_eq!(entries.len(), 12);
    assert_eq!(entries[0].0, "doc00.pdf");
    assert_eq!(h.converter.calls.load(Ordering::SeqCst), 12);
}

#[tokio::test]
async fn nothing_accepted_leaves_failed_job() {
    let h = harness();
    let err = h
        .backends
        .dispatcher()
        .submit(vec![UploadedFile::new("c.txt", b"text".to_vec())])
        .await
        .unwrap_err();
    assert_matches!(
        err,
        PipelineError::Core(CoreError::Validation(msg)) if msg == "No valid .docx files were uploaded."
    );

    let failed = h.backends.store.list_jobs(JobStatus::Failed).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert!(h.backends.store.list_files(failed[0].id).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_submission_creates_no_job() {
    let h = harness();
    let err = h.backends.dispatcher().submit(Vec::new()).await.unwrap_err();
    assert_matches!(
        err,
        PipelineError::Core(CoreError::Validation(msg)) if msg == "No files were provided."
    );

    for status in JobStatus::ALL {
        assert!(h.backends.store.list_jobs(*status).await.unwrap().is_empty());
    }
}

// ---------------------------------------------------------------------------
// Worker contract
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reprocessing_a_unit_after_release_is_skipped() {
    let h = harness();
    let submission = h
        .backends
        .dispatcher()
        .submit(vec![UploadedFile::new("a.docx", b"alpha".to_vec())])
        .await
        .unwrap();

    let worker = h
        .backends
        .worker(h.converter.clone(), Duration::from_secs(5));
    let unit = ConversionUnit::new(submission.job_id, "a.docx");

    let first = worker.process(&unit).await.unwrap();
    assert_matches!(
        first,
        UnitDisposition::Reported(Release::Released(_))
    );
    let job = h.backends.store.find_job(submission.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    // The job is terminal now: a redelivery is neither converted nor reported.
    let again = worker.process(&unit).await.unwrap();
    assert_eq!(again, UnitDisposition::Skipped);
    assert_eq!(h.converter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_input_is_reported_as_failure() {
    let h = harness();
    let submission = h
        .backends
        .dispatcher()
        .submit(vec![UploadedFile::new("a.docx", b"alpha".to_vec())])
        .await
        .unwrap();
    h.backends
        .blobs
        .remove(BlobKey::original(submission.job_id, "a.docx"))
        .await
        .unwrap();

    let worker = h
        .backends
        .worker(h.converter.clone(), Duration::from_secs(5));
    worker
        .process(&ConversionUnit::new(submission.job_id, "a.docx"))
        .await
        .unwrap();

    let file = h
        .backends
        .store
        .find_file(submission.job_id, "a.docx")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.status, FileStatus::Failed);
    assert_eq!(
        file.error_message.as_deref(),
        Some("Input file not found: a.docx")
    );
    let job = h.backends.store.find_job(submission.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn discard_removes_job_and_blobs() {
    let h = harness();
    let submission = h
        .backends
        .dispatcher()
        .submit(vec![UploadedFile::new("a.docx", b"alpha".to_vec())])
        .await
        .unwrap();
    let cancel = h.start_pool(1);
    h.wait_terminal(submission.job_id).await;
    cancel.cancel();

    assert!(h.backends.discard_job(submission.job_id).await.unwrap());
    assert!(h.backends.store.find_job(submission.job_id).await.unwrap().is_none());
    assert!(h
        .backends
        .blobs
        .get(BlobKey::archive(submission.job_id))
        .await
        .unwrap()
        .is_none());
    assert!(!h.backends.discard_job(submission.job_id).await.unwrap());
}

// ---------------------------------------------------------------------------
// Dispatch failures
// ---------------------------------------------------------------------------

/// Accepts the first `ok` units, then refuses.
struct FlakyQueue {
    inner: MemoryQueue,
    ok: AtomicUsize,
}

#[async_trait]
impl WorkQueue for FlakyQueue {
    async fn enqueue(&self, unit: ConversionUnit) -> Result<(), PipelineError> {
        let remaining = self.ok.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(PipelineError::Queue("broker unavailable".into()));
        }
        self.ok.store(remaining - 1, Ordering::SeqCst);
        self.inner.enqueue(unit).await
    }

    async fn next(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Delivery>, PipelineError> {
        self.inner.next(cancel).await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), PipelineError> {
        self.inner.ack(delivery).await
    }

    async fn requeue(&self, delivery: &Delivery) -> Result<(), PipelineError> {
        self.inner.requeue(delivery).await
    }

    async fn purge_job(&self, job_id: DbId) -> Result<(), PipelineError> {
        self.inner.purge_job(job_id).await
    }
}

#[tokio::test]
async fn enqueue_failure_still_completes_the_join() {
    let mut h = harness();
    h.backends.queue = Arc::new(FlakyQueue {
        inner: MemoryQueue::new(),
        ok: AtomicUsize::new(1),
    });

    let submission = h
        .backends
        .dispatcher()
        .submit(vec![
            UploadedFile::new("a.docx", b"alpha".to_vec()),
            UploadedFile::new("b.docx", b"beta".to_vec()),
        ])
        .await
        .unwrap();
    assert_eq!(submission.accepted_file_count, 2);

    let b = h
        .backends
        .store
        .find_file(submission.job_id, "b.docx")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(b.status, FileStatus::Failed);

    let cancel = h.start_pool(1);
    let status = h.wait_terminal(submission.job_id).await;
    cancel.cancel();

    assert_eq!(status, JobStatus::Completed);
    let names: Vec<_> = h
        .archive_entries(submission.job_id)
        .await
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, ["a.pdf"]);
}

/// Refuses to store the original of `refused`.
struct RefusingBlobs {
    inner: FsBlobStore,
    refused: &'static str,
}

#[async_trait]
impl BlobStore for RefusingBlobs {
    async fn put(&self, key: BlobKey<'_>, data: &[u8]) -> Result<(), PipelineError> {
        if matches!(key, BlobKey::Original { filename, .. } if filename == self.refused) {
            return Err(PipelineError::Io(std::io::Error::other("disk full")));
        }
        self.inner.put(key, data).await
    }

    async fn get(&self, key: BlobKey<'_>) -> Result<Option<Vec<u8>>, PipelineError> {
        self.inner.get(key).await
    }

    async fn remove(&self, key: BlobKey<'_>) -> Result<(), PipelineError> {
        self.inner.remove(key).await
    }

    async fn purge_job(&self, job_id: DbId) -> Result<(), PipelineError> {
        self.inner.purge_job(job_id).await
    }
}

#[tokio::test]
async fn storage_failure_during_dispatch_fails_job_and_registered_files() {
    let mut h = harness();
    h.backends.blobs = Arc::new(RefusingBlobs {
        inner: FsBlobStore::new(h.blob_dir.path()),
        refused: "b.docx",
    });

    let err = h
        .backends
        .dispatcher()
        .submit(vec![
            UploadedFile::new("a.docx", b"alpha".to_vec()),
            UploadedFile::new("b.docx", b"beta".to_vec()),
            UploadedFile::new("c.docx", b"gamma".to_vec()),
        ])
        .await
        .unwrap_err();
    assert_matches!(err, PipelineError::Io(_));

    let failed = h.backends.store.list_jobs(JobStatus::Failed).await.unwrap();
    assert_eq!(failed.len(), 1);
    let files = h.backends.store.list_files(failed[0].id).await.unwrap();
    let names: Vec<_> = files.iter().map(|f| f.original_filename.as_str()).collect();
    assert_eq!(names, ["a.docx", "b.docx"]);
    assert!(files.iter().all(|f| f.status == FileStatus::Failed));
    assert!(files
        .iter()
        .all(|f| f.error_message.as_deref().is_some_and(|m| !m.is_empty())));
}

// ---------------------------------------------------------------------------
// Transient backend errors
// ---------------------------------------------------------------------------

/// Delegates to a [`MemoryJobStore`]; `find_job` fails once when armed.
struct BlinkingStore {
    inner: Arc<MemoryJobStore>,
    fail_next_find: AtomicBool,
}

#[async_trait]
impl JobStore for BlinkingStore {
    async fn create_job(&self) -> Result<Job, PipelineError> {
        self.inner.create_job().await
    }

    async fn find_job(&self, job_id: DbId) -> Result<Option<Job>, PipelineError> {
        if self.fail_next_find.swap(false, Ordering::SeqCst) {
            return Err(PipelineError::Io(std::io::Error::other("connection reset")));
        }
        self.inner.find_job(job_id).await
    }

    async fn list_jobs(&self, status: JobStatus) -> Result<Vec<Job>, PipelineError> {
        self.inner.list_jobs(status).await
    }

    async fn transition_job(&self, job_id: DbId, to: JobStatus) -> Result<bool, PipelineError> {
        self.inner.transition_job(job_id, to).await
    }

    async fn delete_job(&self, job_id: DbId) -> Result<bool, PipelineError> {
        self.inner.delete_job(job_id).await
    }

    async fn add_file(&self, job_id: DbId, filename: &str) -> Result<JobFile, PipelineError> {
        self.inner.add_file(job_id, filename).await
    }

    async fn find_file(
        &self,
        job_id: DbId,
        filename: &str,
    ) -> Result<Option<JobFile>, PipelineError> {
        self.inner.find_file(job_id, filename).await
    }

    async fn list_files(&self, job_id: DbId) -> Result<Vec<JobFile>, PipelineError> {
        self.inner.list_files(job_id).await
    }

    async fn mark_file_completed(
        &self,
        job_id: DbId,
        filename: &str,
    ) -> Result<bool, PipelineError> {
        self.inner.mark_file_completed(job_id, filename).await
    }

    async fn mark_file_failed(
        &self,
        job_id: DbId,
        filename: &str,
        error: &str,
    ) -> Result<bool, PipelineError> {
        self.inner.mark_file_failed(job_id, filename, error).await
    }

    async fn health_check(&self) -> Result<(), PipelineError> {
        self.inner.health_check().await
    }
}

#[tokio::test]
async fn job_lookup_error_fails_the_unit_instead_of_dropping_it() {
    let mut h = harness();
    let inner = Arc::new(MemoryJobStore::new());
    let store = Arc::new(BlinkingStore {
        inner: inner.clone(),
        fail_next_find: AtomicBool::new(false),
    });
    h.backends.store = store.clone();

    let submission = h
        .backends
        .dispatcher()
        .submit(vec![
            UploadedFile::new("a.docx", b"alpha".to_vec()),
            UploadedFile::new("b.docx", b"beta".to_vec()),
        ])
        .await
        .unwrap();
    store.fail_next_find.store(true, Ordering::SeqCst);

    // One loop: `a.docx` is taken first and meets the failing lookup.
    let cancel = h.start_pool(1);
    let status = wait_terminal_in(inner.as_ref(), submission.job_id).await;
    cancel.cancel();

    assert_eq!(status, JobStatus::Completed);
    let a = inner.find_file(submission.job_id, "a.docx").await.unwrap().unwrap();
    assert_eq!(a.status, FileStatus::Failed);
    assert!(a
        .error_message
        .as_deref()
        .is_some_and(|m| m.starts_with("Could not load job")));
    let names: Vec<_> = h
        .archive_entries(submission.job_id)
        .await
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, ["b.pdf"]);
}

/// Delegates to a [`MemoryBarrier`]; the first report fails.
struct StutteringBarrier {
    inner: MemoryBarrier,
    failed_once: AtomicBool,
}

#[async_trait]
impl FanInBarrier for StutteringBarrier {
    async fn arm(&self, job_id: DbId, expected: usize) -> Result<(), PipelineError> {
        self.inner.arm(job_id, expected).await
    }

    async fn report(&self, job_id: DbId, outcome: UnitOutcome) -> Result<Release, PipelineError> {
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::Queue("result backend unavailable".into()));
        }
        self.inner.report(job_id, outcome).await
    }

    async fn forget(&self, job_id: DbId) -> Result<(), PipelineError> {
        self.inner.forget(job_id).await
    }
}

#[tokio::test]
async fn unreported_unit_is_requeued_and_retried() {
    let mut h = harness();
    h.backends.barrier = Arc::new(StutteringBarrier {
        inner: MemoryBarrier::new(),
        failed_once: AtomicBool::new(false),
    });

    let submission = h
        .backends
        .dispatcher()
        .submit(vec![UploadedFile::new("a.docx", b"alpha".to_vec())])
        .await
        .unwrap();

    let cancel = h.start_pool(1);
    let status = h.wait_terminal(submission.job_id).await;
    cancel.cancel();

    assert_eq!(status, JobStatus::Completed);
    assert_eq!(h.converter.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        h.archive_entries(submission.job_id).await,
        vec![("a.pdf".to_string(), b"%PDF:alpha".to_vec())]
    );
}

// ---------------------------------------------------------------------------
// Restart recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn interrupted_jobs_are_failed_on_startup() {
    let h = harness();
    let store = &h.backends.store;

    let running = store.create_job().await.unwrap();
    store.add_file(running.id, "a.docx").await.unwrap();
    store.add_file(running.id, "b.docx").await.unwrap();
    store.transition_job(running.id, JobStatus::InProgress).await.unwrap();
    store.mark_file_completed(running.id, "a.docx").await.unwrap();

    let pending = store.create_job().await.unwrap();
    store.add_file(pending.id, "c.docx").await.unwrap();

    let done = store.create_job().await.unwrap();
    store.transition_job(done.id, JobStatus::InProgress).await.unwrap();
    store.transition_job(done.id, JobStatus::Completed).await.unwrap();

    assert_eq!(h.backends.fail_interrupted_jobs().await.unwrap(), 2);

    for job_id in [running.id, pending.id] {
        let job = store.find_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }
    let done = store.find_job(done.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let a = store.find_file(running.id, "a.docx").await.unwrap().unwrap();
    assert_eq!(a.status, FileStatus::Completed);
    let b = store.find_file(running.id, "b.docx").await.unwrap().unwrap();
    assert_eq!(b.status, FileStatus::Failed);
    assert_eq!(b.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
    let c = store.find_file(pending.id, "c.docx").await.unwrap().unwrap();
    assert_eq!(c.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));

    assert_eq!(h.backends.fail_interrupted_jobs().await.unwrap(), 0);
}
