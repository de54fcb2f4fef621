use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::DocumentKind;
use crate::config::RunConfig;

/// Metadata inferred from a document excerpt. Every field is a best guess
/// and may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subtitle: Option<String>,
    pub short_description: Option<String>,
}

/// Category decision for one document. The label is already sanitized and
/// safe to use as a directory name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
    pub reason: String,
}

/// Everything known about one document as it moves through the pipeline.
/// This whole struct is what gets checkpointed after each stage, so a
/// resumed run picks up with identical inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentState {
    pub document_id: Uuid,
    pub source_path: PathBuf,
    pub kind: DocumentKind,
    pub config: RunConfig,
    pub excerpt: Option<String>,
    pub metadata: BookMetadata,
    pub classification: Option<Classification>,
    /// Set once the document has been copied into its category directory.
    pub destination_path: Option<PathBuf>,
    /// Set when an OCR'd copy replaced the original as the file to ship.
    pub working_path: Option<PathBuf>,
    /// Stage failures accumulate here instead of aborting the run.
    pub errors: Vec<String>,
}

impl DocumentState {
    pub fn new(path: &Path, kind: DocumentKind, config: RunConfig) -> Self {
        Self {
            document_id: document_id(path),
            source_path: path.to_path_buf(),
            kind,
            config,
            excerpt: None,
            metadata: BookMetadata::default(),
            classification: None,
            destination_path: None,
            working_path: None,
            errors: Vec::new(),
        }
    }

    /// The file whose bytes ship at finalization: the OCR'd copy when one
    /// substituted for the original.
    pub fn canonical_path(&self) -> &Path {
        self.working_path.as_deref().unwrap_or(&self.source_path)
    }

    /// Output root for this document's kind.
    pub fn output_root(&self) -> &Path {
        match self.kind {
            DocumentKind::Pdf => &self.config.pdf_output_dir,
            DocumentKind::Ebook => &self.config.ebook_output_dir,
        }
    }
}

/// Stable checkpoint identifier for a source path, derived from the file
/// name alone. The same name dropped into the inbox again maps to the same
/// identifier across restarts.
pub fn document_id(path: &Path) -> Uuid {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
}
