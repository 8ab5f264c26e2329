#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use docconv_core::types::DbId;
use docconv_db::models::status::JobStatus;
use docconv_pipeline::backends::Backends;
use docconv_pipeline::barrier::MemoryBarrier;
use docconv_pipeline::blob::FsBlobStore;
use docconv_pipeline::converter::Converter;
use docconv_pipeline::error::ConversionError;
use docconv_pipeline::pool::WorkerPool;
use docconv_pipeline::queue::MemoryQueue;
use docconv_pipeline::store::MemoryJobStore;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use docconv_api::config::ServerConfig;
use docconv_api::router::build_app_router;
use docconv_api::state::AppState;

pub const BOUNDARY: &str = "docconv-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_upload_mb: 10,
        base_url: "http://testserver".to_string(),
    }
}

/// Wraps the input in a fake PDF header; fails on `fail`, hangs on `slow`.
pub struct StubConverter;

#[async_trait]
impl Converter for StubConverter {
    async fn convert(&self, input: &[u8]) -> Result<Vec<u8>, ConversionError> {
        match input {
            b"fail" => Err(ConversionError::ExecutionFailed {
                exit_code: Some(1),
                stderr: "conversion failed".into(),
            }),
            b"slow" => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(b"%PDF-late".to_vec())
            }
            other => Ok([b"%PDF-".as_slice(), other].concat()),
        }
    }
}

/// A running application over in-process backends.
pub struct TestApp {
    pub router: Router,
    pub backends: Backends,
    cancel: Option<CancellationToken>,
    _blob_dir: TempDir,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }
}

fn memory_backends(blob_dir: &TempDir) -> Backends {
    Backends {
        store: Arc::new(MemoryJobStore::new()),
        blobs: Arc::new(FsBlobStore::new(blob_dir.path())),
        barrier: Arc::new(MemoryBarrier::new()),
        queue: Arc::new(MemoryQueue::new()),
    }
}

/// Application with a running worker pool (stub converter, 200 ms timeout).
pub fn spawn_app() -> TestApp {
    let blob_dir = tempfile::tempdir().unwrap();
    let backends = memory_backends(&blob_dir);

    let worker = backends.worker(Arc::new(StubConverter), Duration::from_millis(200));
    let pool = WorkerPool::new(Arc::new(worker), Arc::clone(&backends.queue), 2);
    let cancel = CancellationToken::new();
    tokio::spawn(pool.run(cancel.clone()));

    build(backends, Some(cancel), blob_dir)
}

/// Application without workers: submitted jobs stay `IN_PROGRESS`.
pub fn spawn_idle_app() -> TestApp {
    let blob_dir = tempfile::tempdir().unwrap();
    let backends = memory_backends(&blob_dir);
    build(backends, None, blob_dir)
}

fn build(backends: Backends, cancel: Option<CancellationToken>, blob_dir: TempDir) -> TestApp {
    let config = test_config();
    let state = AppState::new(config.clone(), backends.clone());
    TestApp {
        router: build_app_router(state, &config),
        backends,
        cancel,
        _blob_dir: blob_dir,
    }
}

impl TestApp {
    /// Poll the job store until the job is terminal.
    pub async fn wait_terminal(&self, job_id: DbId) -> JobStatus {
        for _ in 0..200 {
            let job = self.backends.store.find_job(job_id).await.unwrap().unwrap();
            if job.status.is_terminal() {
                return job.status;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {job_id} did not reach a terminal status");
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &TestApp, request: Request<Body>) -> Response<Body> {
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn delete(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// POST `(filename, contents)` pairs as `files` fields of a multipart form.
pub async fn post_files(app: &TestApp, uri: &str, files: &[(&str, &str)]) -> Response<Body> {
    let mut body = Vec::new();
    for (name, data) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
