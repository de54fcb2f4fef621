//! Inference stage: metadata inference and classification.
//!
//! Two independent model calls. A failed metadata call degrades to empty
//! metadata; a failed classification call files the document under the
//! fallback label. Neither failure stops the pipeline.

pub mod parser;
pub mod prompt;
pub mod sanitize;

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::models::{BookMetadata, Classification, DocumentState};
use crate::services::{LlmClient, LlmError};
use parser::{parse_classification_reply, parse_metadata_reply};
use prompt::{
    build_classification_prompt, build_metadata_prompt, CLASSIFICATION_SYSTEM_PROMPT,
    METADATA_SYSTEM_PROMPT,
};
use sanitize::{sanitize_label, FALLBACK_LABEL};

/// Confidence stored when the model omits one.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("No JSON object found in model reply")]
    NoJsonObject,

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),
}

/// Run the inference stage. Both calls degrade independently; this stage
/// never aborts the pipeline and always leaves a classification behind.
pub fn run(mut state: DocumentState, llm: &dyn LlmClient) -> DocumentState {
    let excerpt = state.excerpt.clone().unwrap_or_default();

    let metadata_model = state.config.metadata_model().to_string();
    match infer_metadata(llm, &metadata_model, &excerpt) {
        Ok(metadata) => {
            tracing::info!(
                document_id = %state.document_id,
                title = ?metadata.title,
                author = ?metadata.author,
                "Metadata inferred"
            );
            state.metadata = metadata;
        }
        Err(e) => {
            tracing::warn!(document_id = %state.document_id, error = %e, "Metadata inference failed");
            state.errors.push(format!(
                "metadata inference failed for {}: {e}",
                state.source_path.display()
            ));
            state.metadata = BookMetadata::default();
        }
    }

    let classification_model = state.config.classification_model().to_string();
    let labels = existing_labels(state.output_root());
    match classify(llm, &classification_model, &excerpt, &state.metadata, &labels) {
        Ok(classification) => {
            tracing::info!(
                document_id = %state.document_id,
                label = %classification.label,
                confidence = classification.confidence,
                "Document classified"
            );
            state.classification = Some(classification);
        }
        Err(e) => {
            tracing::warn!(document_id = %state.document_id, error = %e, "Classification failed");
            state.errors.push(format!(
                "classification failed for {}: {e}",
                state.source_path.display()
            ));
            state.classification = Some(Classification {
                label: FALLBACK_LABEL.to_string(),
                confidence: 0.0,
                reason: "classification failed".to_string(),
            });
        }
    }

    state
}

pub fn infer_metadata(
    llm: &dyn LlmClient,
    model: &str,
    excerpt: &str,
) -> Result<BookMetadata, InferenceError> {
    let reply = llm.chat(model, METADATA_SYSTEM_PROMPT, &build_metadata_prompt(excerpt))?;
    parse_metadata_reply(&reply)
}

pub fn classify(
    llm: &dyn LlmClient,
    model: &str,
    excerpt: &str,
    metadata: &BookMetadata,
    existing_labels: &[String],
) -> Result<Classification, InferenceError> {
    let reply = llm.chat(
        model,
        CLASSIFICATION_SYSTEM_PROMPT,
        &build_classification_prompt(excerpt, metadata, existing_labels),
    )?;
    let raw = parse_classification_reply(&reply)?;
    Ok(Classification {
        label: sanitize_label(raw.label.as_deref().unwrap_or_default()),
        confidence: raw.confidence.unwrap_or(DEFAULT_CONFIDENCE),
        reason: raw.reason.unwrap_or_default(),
    })
}

/// Immediate subdirectory names of the output root, read live. A missing
/// root means no labels exist yet.
pub fn existing_labels(root: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut labels: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    labels.sort_unstable();
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::models::DocumentKind;
    use crate::services::MockLlmClient;
    use std::path::PathBuf;

    fn test_config(dir: &Path) -> RunConfig {
        RunConfig {
            input_dir: dir.join("inbox"),
            pdf_output_dir: dir.join("library/pdf"),
            ebook_output_dir: dir.join("library/ebook"),
            default_model: "llama3".to_string(),
            metadata_model: None,
            classification_model: None,
            max_pages: 10,
            ollama_url: "http://127.0.0.1:1".to_string(),
            stirling_url: "http://127.0.0.1:1".to_string(),
            checkpoint_db: dir.join("checkpoints.sqlite"),
        }
    }

    fn test_state(dir: &Path) -> DocumentState {
        let mut state = DocumentState::new(
            &dir.join("inbox/book.pdf"),
            DocumentKind::Pdf,
            test_config(dir),
        );
        state.excerpt = Some("An excerpt about marketing funnels and campaigns.".to_string());
        state
    }

    const METADATA_REPLY: &str = r#"{
        "title": "Permission Marketing",
        "author": "Seth Godin",
        "subtitle": null,
        "short_description": "Turning strangers into customers."
    }"#;

    #[test]
    fn both_calls_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::with_replies(vec![
            Ok(METADATA_REPLY.to_string()),
            Ok(r#"{"label": "Marketing", "confidence": 0.9, "reason": "sales content"}"#
                .to_string()),
        ]);

        let state = run(test_state(dir.path()), &llm);

        assert_eq!(state.metadata.title.as_deref(), Some("Permission Marketing"));
        let classification = state.classification.unwrap();
        assert_eq!(classification.label, "Marketing");
        assert!((classification.confidence - 0.9).abs() < f32::EPSILON);
        assert!(state.errors.is_empty());
    }

    #[test]
    fn new_label_is_kept_even_when_existing_labels_are_close() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("library/pdf");
        std::fs::create_dir_all(root.join("Programming")).unwrap();
        std::fs::create_dir_all(root.join("Business")).unwrap();

        // The adapter stores what the model decided; existing labels only
        // inform the prompt, they never override the reply.
        let llm = MockLlmClient::with_replies(vec![
            Ok(METADATA_REPLY.to_string()),
            Ok(r#"{"label": "Marketing", "confidence": 0.8, "reason": "not a Business umbrella fit"}"#
                .to_string()),
        ]);

        let state = run(test_state(dir.path()), &llm);
        assert_eq!(state.classification.unwrap().label, "Marketing");
    }

    #[test]
    fn missing_confidence_defaults_to_half() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::with_replies(vec![
            Ok(METADATA_REPLY.to_string()),
            Ok(r#"{"label": "Marketing", "reason": "sales content"}"#.to_string()),
        ]);

        let state = run(test_state(dir.path()), &llm);
        let classification = state.classification.unwrap();
        assert!((classification.confidence - DEFAULT_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn classification_failure_falls_back_but_still_files() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::with_replies(vec![
            Ok(METADATA_REPLY.to_string()),
            Err("connection reset".to_string()),
        ]);

        let state = run(test_state(dir.path()), &llm);

        let classification = state.classification.unwrap();
        assert_eq!(classification.label, FALLBACK_LABEL);
        assert_eq!(classification.confidence, 0.0);
        assert_eq!(classification.reason, "classification failed");
        assert_eq!(state.errors.len(), 1);
        // Metadata from the first call is kept.
        assert_eq!(state.metadata.author.as_deref(), Some("Seth Godin"));
    }

    #[test]
    fn metadata_failure_still_classifies() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::with_replies(vec![
            Err("timeout".to_string()),
            Ok(r#"{"label": "Marketing", "confidence": 0.7, "reason": "sales"}"#.to_string()),
        ]);

        let state = run(test_state(dir.path()), &llm);

        assert_eq!(state.metadata, BookMetadata::default());
        assert_eq!(state.classification.unwrap().label, "Marketing");
        assert_eq!(state.errors.len(), 1);
        assert!(state.errors[0].contains("metadata inference failed"));
    }

    #[test]
    fn unparseable_reply_is_a_classification_failure() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::with_replies(vec![
            Ok(METADATA_REPLY.to_string()),
            Ok("I'd rather not say.".to_string()),
        ]);

        let state = run(test_state(dir.path()), &llm);
        assert_eq!(state.classification.unwrap().label, FALLBACK_LABEL);
        assert_eq!(state.errors.len(), 1);
    }

    #[test]
    fn stored_label_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::with_replies(vec![
            Ok(METADATA_REPLY.to_string()),
            Ok(r#"{"label": "Sci/Fi: Classics!", "confidence": 0.6, "reason": "genre"}"#
                .to_string()),
        ]);

        let state = run(test_state(dir.path()), &llm);
        assert_eq!(state.classification.unwrap().label, "SciFi Classics");
    }

    #[test]
    fn existing_labels_lists_subdirectories_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Programming")).unwrap();
        std::fs::create_dir_all(dir.path().join("Business")).unwrap();
        std::fs::write(dir.path().join("stray-file.pdf"), b"ignored").unwrap();

        assert_eq!(
            existing_labels(dir.path()),
            vec!["Business".to_string(), "Programming".to_string()]
        );
    }

    #[test]
    fn missing_root_yields_no_labels() {
        assert!(existing_labels(&PathBuf::from("/nonexistent/library")).is_empty());
    }
}
