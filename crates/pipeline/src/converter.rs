//! The converter capability: `.docx` bytes in, `.pdf` bytes out.
//!
//! [`LibreOfficeConverter`] shells out to a headless LibreOffice. The child
//! is spawned with `kill_on_drop(true)`, so dropping the conversion future
//! (e.g. when the caller's timeout fires) kills the process.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use docconv_core::naming::{ACCEPTED_EXTENSION, OUTPUT_EXTENSION};

use crate::error::ConversionError;

/// Maximum stderr length kept in an error description.
const MAX_STDERR_CHARS: usize = 2000;

#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, input: &[u8]) -> Result<Vec<u8>, ConversionError>;
}

/// Runs `{binary} --headless --convert-to pdf` in a scratch directory.
#[derive(Debug, Clone)]
pub struct LibreOfficeConverter {
    binary: PathBuf,
}

impl LibreOfficeConverter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Converter for LibreOfficeConverter {
    async fn convert(&self, input: &[u8]) -> Result<Vec<u8>, ConversionError> {
        // Each conversion gets its own profile directory; concurrent
        // instances sharing one profile block on its lock file.
        let scratch = tempfile::tempdir()?;
        let input_path = scratch.path().join(format!("input.{ACCEPTED_EXTENSION}"));
        let out_dir = scratch.path().join("out");
        let profile = scratch.path().join("profile");
        tokio::fs::write(&input_path, input).await?;
        tokio::fs::create_dir(&out_dir).await?;

        let output = tokio::process::Command::new(&self.binary)
            .arg("--headless")
            .arg("--norestore")
            .arg(format!("-env:UserInstallation=file://{}", profile.display()))
            .args(["--convert-to", OUTPUT_EXTENSION, "--outdir"])
            .arg(&out_dir)
            .arg(&input_path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(ConversionError::Spawn)?;

        if !output.status.success() {
            return Err(ConversionError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: truncate(String::from_utf8_lossy(&output.stderr).trim()),
            });
        }

        let produced = out_dir.join(format!("input.{OUTPUT_EXTENSION}"));
        match tokio::fs::read(&produced).await {
            Ok(pdf) => Ok(pdf),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConversionError::NoOutput),
            Err(e) => Err(e.into()),
        }
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_STDERR_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
