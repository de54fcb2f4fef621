//! Extraction stage: produce a bounded text excerpt for one document.
//!
//! PDFs are read directly first; when the text layer is too sparse the file
//! is re-rendered through OCR and re-read, and the OCR'd copy becomes the
//! canonical file for the rest of the pipeline. EPUBs are read from the
//! container directly. Extraction failures degrade to an empty excerpt so
//! later stages still run.

pub mod epub;
pub mod pdf;

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::{DocumentKind, DocumentState};
use crate::services::{OcrEngine, StirlingError};

/// Below this many stripped characters a PDF's text layer is considered
/// too sparse and the OCR fallback runs.
pub const MIN_CHARS_THRESHOLD: usize = 500;

/// Upper bound on the excerpt handed to later stages.
pub const MAX_EXCERPT_CHARS: usize = 15_000;

/// Languages requested from the OCR service.
const OCR_LANGUAGES: &[&str] = &["eng"];

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("PDF parsing error: {0}")]
    PdfParsing(String),

    #[error("EPUB container error: {0}")]
    EpubContainer(String),

    #[error("OCR call failed: {0}")]
    Ocr(#[from] StirlingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the extraction stage. Failures are folded into the state's error
/// list with an empty excerpt; this stage never aborts the pipeline.
pub fn run(mut state: DocumentState, ocr: &dyn OcrEngine) -> DocumentState {
    let max_pages = state.config.max_pages;
    let outcome = match state.kind {
        DocumentKind::Pdf => extract_pdf(&state.source_path, ocr, max_pages),
        DocumentKind::Ebook => {
            epub::extract_text(&state.source_path, MAX_EXCERPT_CHARS).map(|text| (text, None))
        }
    };

    match outcome {
        Ok((text, working_path)) => {
            let excerpt = truncate_excerpt(&text, MAX_EXCERPT_CHARS);
            tracing::info!(
                document_id = %state.document_id,
                chars = excerpt.len(),
                ocr = working_path.is_some(),
                "Extraction complete"
            );
            state.excerpt = Some(excerpt);
            state.working_path = working_path;
        }
        Err(e) => {
            tracing::warn!(
                document_id = %state.document_id,
                error = %e,
                "Extraction failed; continuing with empty excerpt"
            );
            state.errors.push(format!(
                "extraction failed for {}: {e}",
                state.source_path.display()
            ));
            state.excerpt = Some(String::new());
        }
    }
    state
}

/// Direct extraction first; OCR fallback when the text layer is too sparse.
/// Returns the excerpt and, when OCR ran, the persisted OCR'd copy that must
/// be treated as the canonical file from here on.
fn extract_pdf(
    path: &Path,
    ocr: &dyn OcrEngine,
    max_pages: usize,
) -> Result<(String, Option<PathBuf>), ExtractionError> {
    let text = pdf::extract_text(path, max_pages)?;
    if text.trim().len() >= MIN_CHARS_THRESHOLD {
        return Ok((text, None));
    }

    tracing::info!(
        path = %path.display(),
        chars = text.trim().len(),
        "Sparse text layer; running OCR fallback"
    );
    let languages: Vec<String> = OCR_LANGUAGES.iter().map(|s| s.to_string()).collect();
    let ocr_bytes = ocr.ocr_pdf(path, &languages)?;
    let ocr_copy = persist_ocr_copy(&ocr_bytes)?;

    let ocr_text = pdf::extract_text(&ocr_copy, max_pages)?;
    Ok((ocr_text, Some(ocr_copy)))
}

/// Write OCR output to a kept temp file. The copy outlives this stage: it
/// is re-read here and shipped at finalization.
fn persist_ocr_copy(bytes: &[u8]) -> Result<PathBuf, ExtractionError> {
    let mut file = tempfile::Builder::new().suffix(".ocr.pdf").tempfile()?;
    file.write_all(bytes)?;
    let (_, path) = file.keep().map_err(|e| ExtractionError::Io(e.error))?;
    Ok(path)
}

/// Bound an excerpt to `max_chars` characters on a char boundary.
fn truncate_excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}
