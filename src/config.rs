//! Run configuration resolved from CLI flags and environment.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Model used when no task-specific model is configured.
pub const DEFAULT_MODEL: &str = "llama3";

/// Holding directory for ingested originals, beneath the input dir.
/// The sweep and watch loop never descend into it.
pub const PROCESSED_DIR_NAME: &str = "processed";

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> &'static str {
    "info"
}

/// One run's complete configuration. Travels inside each document's
/// checkpointed state, so a resumed document finishes under the settings
/// it started with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Inbox directory watched for PDFs and EPUBs.
    pub input_dir: PathBuf,
    /// Output root for categorized PDFs.
    pub pdf_output_dir: PathBuf,
    /// Output root for categorized EPUBs.
    pub ebook_output_dir: PathBuf,
    /// Fallback model for both LLM tasks.
    pub default_model: String,
    /// Override model for metadata inference.
    pub metadata_model: Option<String>,
    /// Override model for classification.
    pub classification_model: Option<String>,
    /// Page budget for PDF text extraction.
    pub max_pages: usize,
    pub ollama_url: String,
    pub stirling_url: String,
    /// SQLite file holding per-document checkpoints.
    pub checkpoint_db: PathBuf,
}

impl RunConfig {
    /// Model for metadata inference, falling back to the default model.
    pub fn metadata_model(&self) -> &str {
        self.metadata_model.as_deref().unwrap_or(&self.default_model)
    }

    /// Model for classification, falling back to the default model.
    pub fn classification_model(&self) -> &str {
        self.classification_model
            .as_deref()
            .unwrap_or(&self.default_model)
    }

    /// Where ingested originals are parked after filing.
    pub fn processed_dir(&self) -> PathBuf {
        self.input_dir.join(PROCESSED_DIR_NAME)
    }
}
