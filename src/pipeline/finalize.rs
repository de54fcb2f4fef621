//! Finalization stage: file the document into its category directory,
//! rewrite PDF metadata, and park the original.
//!
//! Only the copy itself is a hard stop; metadata rewriting and the move to
//! the processed directory degrade to accumulated errors.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::models::{DocumentKind, DocumentState};
use crate::pipeline::inference::sanitize::{sanitize_label, FALLBACK_LABEL};
use crate::services::{MetadataRewriter, PdfMetadataPatch, StirlingError};

#[derive(Error, Debug)]
pub enum FinalizeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata rewrite failed: {0}")]
    Rewrite(#[from] StirlingError),
}

/// Run the finalization stage. Without a destination copy nothing else is
/// attempted; after a successful copy every further failure is non-fatal.
pub fn run(mut state: DocumentState, rewriter: &dyn MetadataRewriter) -> DocumentState {
    let label = state
        .classification
        .as_ref()
        .map(|c| sanitize_label(&c.label))
        .unwrap_or_else(|| FALLBACK_LABEL.to_string());

    let file_name = match state.source_path.file_name() {
        Some(name) => name.to_owned(),
        None => {
            state.errors.push(format!(
                "finalize failed for {}: source path has no file name",
                state.source_path.display()
            ));
            return state;
        }
    };
    let destination = state.output_root().join(&label).join(&file_name);

    if let Err(e) = copy_into_library(state.canonical_path(), &destination) {
        tracing::error!(
            document_id = %state.document_id,
            destination = %destination.display(),
            error = %e,
            "Copy into library failed"
        );
        state.errors.push(format!(
            "copy failed for {}: {e}",
            state.source_path.display()
        ));
        return state;
    }
    tracing::info!(
        document_id = %state.document_id,
        destination = %destination.display(),
        "Filed into library"
    );
    state.destination_path = Some(destination.clone());

    if state.kind == DocumentKind::Pdf {
        if let Err(e) = rewrite_pdf_metadata(&state, &destination, rewriter) {
            tracing::warn!(
                document_id = %state.document_id,
                error = %e,
                "Metadata rewrite failed; library copy keeps its original metadata"
            );
            state.errors.push(format!(
                "metadata rewrite failed for {}: {e}",
                destination.display()
            ));
        }
    }

    if let Err(e) = park_original(&state) {
        tracing::warn!(
            document_id = %state.document_id,
            error = %e,
            "Could not move original to the processed directory"
        );
        state.errors.push(format!(
            "failed to move {} to processed: {e}",
            state.source_path.display()
        ));
    }

    state
}

fn copy_into_library(source: &Path, destination: &Path) -> Result<(), FinalizeError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, destination)?;
    // fs::copy carries permissions but not mtime; the filed copy keeps the
    // source's modification time.
    let modified = fs::metadata(source)?.modified()?;
    fs::File::options()
        .write(true)
        .open(destination)?
        .set_times(fs::FileTimes::new().set_modified(modified))?;
    Ok(())
}

/// Replace all metadata on the library copy with the inferred fields.
fn rewrite_pdf_metadata(
    state: &DocumentState,
    destination: &Path,
    rewriter: &dyn MetadataRewriter,
) -> Result<(), FinalizeError> {
    let patch = PdfMetadataPatch {
        title: state.metadata.title.clone(),
        author: state.metadata.author.clone(),
        subject: state.metadata.short_description.clone(),
    };
    let rewritten = rewriter.rewrite_metadata(destination, &patch, true)?;
    fs::write(destination, rewritten)?;
    Ok(())
}

/// Move the original out of the inbox so it is never picked up again.
fn park_original(state: &DocumentState) -> Result<(), FinalizeError> {
    let processed_dir = state.config.processed_dir();
    fs::create_dir_all(&processed_dir)?;
    let file_name = state
        .source_path
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"))?;
    fs::rename(&state.source_path, processed_dir.join(file_name))?;
    Ok(())
}
