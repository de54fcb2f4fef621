//! Stirling-PDF HTTP client: OCR re-rendering and embedded-metadata rewrite.
//!
//! Two multipart endpoints are used: `/api/v1/misc/ocr-pdf` and
//! `/api/v1/misc/update-metadata`. The service cannot strip all metadata and
//! apply new fields in one call, so a delete-all rewrite is two sequential
//! requests with an intermediate cleaned file (removed in all outcomes).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use reqwest::blocking::multipart::Form;
use thiserror::Error;

/// Request timeout for Stirling calls. OCR of a large PDF is slow.
pub const STIRLING_TIMEOUT_SECS: u64 = 600;

#[derive(Error, Debug)]
pub enum StirlingError {
    #[error("Stirling-PDF is not running at {0}")]
    Connection(String),

    #[error("Stirling-PDF returned error (status {status}): {body}")]
    Service { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// New embedded metadata for a PDF. `None` fields are left out of the call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfMetadataPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
}

/// Re-renders a PDF through OCR, returning the full rewritten file.
pub trait OcrEngine {
    fn ocr_pdf(&self, path: &Path, languages: &[String]) -> Result<Vec<u8>, StirlingError>;
}

/// Rewrites a PDF's embedded metadata, returning the rewritten file.
pub trait MetadataRewriter {
    fn rewrite_metadata(
        &self,
        path: &Path,
        patch: &PdfMetadataPatch,
        delete_all: bool,
    ) -> Result<Vec<u8>, StirlingError>;
}

#[derive(Clone)]
pub struct StirlingClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl StirlingClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        }
    }

    /// Default Stirling-PDF instance at localhost:8080 with 10-minute timeout.
    pub fn default_local() -> Self {
        Self::new("http://localhost:8080", STIRLING_TIMEOUT_SECS)
    }

    fn post_multipart(&self, url: &str, form: Form) -> Result<Vec<u8>, StirlingError> {
        let response = self.client.post(url).multipart(form).send().map_err(|e| {
            if e.is_connect() {
                StirlingError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                StirlingError::HttpClient(format!(
                    "Request timed out after {}s",
                    self.timeout_secs
                ))
            } else {
                StirlingError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StirlingError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .map_err(|e| StirlingError::HttpClient(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn update_metadata_call(
        &self,
        path: &Path,
        patch: Option<&PdfMetadataPatch>,
        delete_all: bool,
    ) -> Result<Vec<u8>, StirlingError> {
        let url = format!("{}/api/v1/misc/update-metadata", self.base_url);
        let mut form = Form::new()
            .file("fileInput", path)?
            .text("deleteAll", if delete_all { "true" } else { "false" });

        if let Some(patch) = patch {
            if let Some(title) = &patch.title {
                form = form.text("title", title.clone());
            }
            if let Some(author) = &patch.author {
                form = form.text("author", author.clone());
            }
            if let Some(subject) = &patch.subject {
                form = form.text("subject", subject.clone());
            }
        }

        self.post_multipart(&url, form)
    }
}

/// Location of the intermediate stripped copy used by a delete-all rewrite.
fn cleaned_copy_path(path: &Path) -> PathBuf {
    path.with_extension("cleaned.pdf")
}

impl OcrEngine for StirlingClient {
    fn ocr_pdf(&self, path: &Path, languages: &[String]) -> Result<Vec<u8>, StirlingError> {
        let url = format!("{}/api/v1/misc/ocr-pdf", self.base_url);

        let mut form = Form::new().file("fileInput", path)?;
        for language in languages {
            form = form.text("languages", language.clone());
        }
        form = form
            .text("ocrType", "Normal")
            .text("ocrRenderType", "sandwich")
            .text("sidecar", "false")
            .text("deskew", "false")
            .text("clean", "false")
            .text("cleanFinal", "false")
            .text("removeImagesAfter", "false");

        self.post_multipart(&url, form)
    }
}

impl MetadataRewriter for StirlingClient {
    fn rewrite_metadata(
        &self,
        path: &Path,
        patch: &PdfMetadataPatch,
        delete_all: bool,
    ) -> Result<Vec<u8>, StirlingError> {
        if !delete_all {
            return self.update_metadata_call(path, Some(patch), false);
        }

        // Strip-all first, then apply the new fields to the stripped copy.
        let cleaned_bytes = self.update_metadata_call(path, None, true)?;
        let cleaned = cleaned_copy_path(path);
        std::fs::write(&cleaned, cleaned_bytes)?;

        let result = self.update_metadata_call(&cleaned, Some(patch), false);

        if let Err(e) = std::fs::remove_file(&cleaned) {
            tracing::warn!(
                path = %cleaned.display(),
                error = %e,
                "Failed to remove intermediate cleaned PDF"
            );
        }

        result
    }
}

/// Mock OCR engine for testing — returns configured bytes or fails.
pub struct MockOcrEngine {
    reply: Result<Vec<u8>, String>,
    calls: Arc<AtomicUsize>,
}

impl MockOcrEngine {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            reply: Ok(bytes),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr_pdf(&self, _path: &Path, _languages: &[String]) -> Result<Vec<u8>, StirlingError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.reply
            .clone()
            .map_err(StirlingError::HttpClient)
    }
}

/// Mock metadata rewriter for testing.
pub struct MockMetadataRewriter {
    reply: Result<Vec<u8>, String>,
    calls: Arc<AtomicUsize>,
}

impl MockMetadataRewriter {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            reply: Ok(bytes),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl MetadataRewriter for MockMetadataRewriter {
    fn rewrite_metadata(
        &self,
        _path: &Path,
        _patch: &PdfMetadataPatch,
        _delete_all: bool,
    ) -> Result<Vec<u8>, StirlingError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.reply
            .clone()
            .map_err(StirlingError::HttpClient)
    }
}
