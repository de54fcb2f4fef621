//! Stage orchestration for one document.
//!
//! Stages run in a fixed order and the full document state is checkpointed
//! after each one. A crash between stages costs at most the interrupted
//! stage; a document whose checkpoint already says finalized is skipped
//! outright, so re-sweeping an inbox never double-files anything.

use std::path::Path;

use thiserror::Error;

use crate::config::RunConfig;
use crate::db::{CheckpointStore, DatabaseError};
use crate::models::{document_id, DocumentKind, DocumentState, Stage};
use crate::pipeline::{extraction, finalize, inference};
use crate::services::{
    LlmClient, MetadataRewriter, OcrEngine, OllamaClient, StirlingClient, OLLAMA_TIMEOUT_SECS,
    STIRLING_TIMEOUT_SECS,
};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("checkpoint store error: {0}")]
    Checkpoint(#[from] DatabaseError),
}

/// One document's pipeline: the three stages plus the services they call
/// and the checkpoint store they report to.
pub struct DocumentPipeline {
    llm: Box<dyn LlmClient + Send + Sync>,
    ocr: Box<dyn OcrEngine + Send + Sync>,
    rewriter: Box<dyn MetadataRewriter + Send + Sync>,
    store: CheckpointStore,
    config: RunConfig,
}

impl DocumentPipeline {
    pub fn new(
        llm: Box<dyn LlmClient + Send + Sync>,
        ocr: Box<dyn OcrEngine + Send + Sync>,
        rewriter: Box<dyn MetadataRewriter + Send + Sync>,
        store: CheckpointStore,
        config: RunConfig,
    ) -> Self {
        Self {
            llm,
            ocr,
            rewriter,
            store,
            config,
        }
    }

    /// Wire up the real services from the run configuration.
    pub fn build(config: RunConfig) -> Result<Self, PipelineError> {
        let llm = OllamaClient::new(&config.ollama_url, OLLAMA_TIMEOUT_SECS);
        let stirling = StirlingClient::new(&config.stirling_url, STIRLING_TIMEOUT_SECS);
        let store = CheckpointStore::open(&config.checkpoint_db)?;
        Ok(Self::new(
            Box::new(llm),
            Box::new(stirling.clone()),
            Box::new(stirling),
            store,
            config,
        ))
    }

    /// Process one document end to end, resuming from its checkpoint when
    /// one exists. Stage failures accumulate in the returned state; only
    /// checkpoint persistence itself is a hard error.
    pub fn run(&self, path: &Path, kind: DocumentKind) -> Result<DocumentState, PipelineError> {
        let id = document_id(path);

        let (mut state, completed) = match self.store.load(&id)? {
            Some(record) if record.stage == Stage::Finalize => {
                tracing::info!(
                    document_id = %id,
                    path = %path.display(),
                    "Already finalized; skipping"
                );
                return Ok(record.state);
            }
            Some(record) => {
                tracing::info!(
                    document_id = %id,
                    path = %path.display(),
                    resumed_after = record.stage.as_str(),
                    "Resuming from checkpoint"
                );
                (record.state, Some(record.stage))
            }
            None => (
                DocumentState::new(path, kind, self.config.clone()),
                None,
            ),
        };

        if completed < Some(Stage::Extract) {
            state = extraction::run(state, self.ocr.as_ref());
            self.store.save(&id, Stage::Extract, &state)?;
        }

        if completed < Some(Stage::InferClassify) {
            state = inference::run(state, self.llm.as_ref());
            self.store.save(&id, Stage::InferClassify, &state)?;
        }

        state = finalize::run(state, self.rewriter.as_ref());
        self.store.save(&id, Stage::Finalize, &state)?;

        tracing::info!(
            document_id = %id,
            label = state.classification.as_ref().map(|c| c.label.as_str()).unwrap_or("-"),
            destination = %state
                .destination_path
                .as_deref()
                .unwrap_or_else(|| Path::new("-"))
                .display(),
            error_count = state.errors.len(),
            "Document pipeline finished"
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Classification;
    use crate::services::{MockLlmClient, MockMetadataRewriter, MockOcrEngine};
    use std::fs;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;

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

    fn write_epub(path: &Path, body: &str) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("OEBPS/chapter1.xhtml", options).unwrap();
        zip.write_all(format!("<html><body><p>{body}</p></body></html>").as_bytes())
            .unwrap();
        zip.finish().unwrap();
    }

    fn inbox_epub(dir: &Path, name: &str, body: &str) -> PathBuf {
        let inbox = dir.join("inbox");
        fs::create_dir_all(&inbox).unwrap();
        let path = inbox.join(name);
        write_epub(&path, body);
        path
    }

    const METADATA_REPLY: &str =
        r#"{"title": "Permission Marketing", "author": "Seth Godin", "short_description": "Sales."}"#;
    const CLASSIFY_REPLY: &str =
        r#"{"label": "Marketing", "confidence": 0.9, "reason": "sales content"}"#;

    fn pipeline_with(
        dir: &Path,
        llm: MockLlmClient,
        ocr: MockOcrEngine,
        rewriter: MockMetadataRewriter,
    ) -> DocumentPipeline {
        DocumentPipeline::new(
            Box::new(llm),
            Box::new(ocr),
            Box::new(rewriter),
            CheckpointStore::open_in_memory().unwrap(),
            test_config(dir),
        )
    }

    #[test]
    fn epub_happy_path_files_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let path = inbox_epub(dir.path(), "funnels.epub", "All about marketing funnels.");

        let llm = MockLlmClient::with_replies(vec![
            Ok(METADATA_REPLY.to_string()),
            Ok(CLASSIFY_REPLY.to_string()),
        ]);
        let llm_calls = llm.call_counter();
        let rewriter = MockMetadataRewriter::failing("must not be called");
        let rewrite_calls = rewriter.call_counter();
        let pipeline = pipeline_with(
            dir.path(),
            llm,
            MockOcrEngine::failing("must not be called"),
            rewriter,
        );

        let state = pipeline.run(&path, DocumentKind::Ebook).unwrap();

        assert!(state.errors.is_empty());
        assert_eq!(llm_calls.load(Ordering::Relaxed), 2);
        assert_eq!(rewrite_calls.load(Ordering::Relaxed), 0);
        let destination = dir.path().join("library/ebook/Marketing/funnels.epub");
        assert_eq!(state.destination_path.as_deref(), Some(destination.as_path()));
        assert!(destination.exists());
        assert!(dir.path().join("inbox/processed/funnels.epub").exists());

        let record = pipeline.store.load(&state.document_id).unwrap().unwrap();
        assert_eq!(record.stage, Stage::Finalize);
    }

    #[test]
    fn finalized_checkpoint_short_circuits_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = inbox_epub(dir.path(), "done.epub", "Already handled.");

        let llm = MockLlmClient::failing("must not be called");
        let llm_calls = llm.call_counter();
        let ocr = MockOcrEngine::failing("must not be called");
        let ocr_calls = ocr.call_counter();
        let pipeline = pipeline_with(
            dir.path(),
            llm,
            ocr,
            MockMetadataRewriter::failing("must not be called"),
        );

        let mut finished = DocumentState::new(&path, DocumentKind::Ebook, test_config(dir.path()));
        finished.classification = Some(Classification {
            label: "Fiction".to_string(),
            confidence: 1.0,
            reason: "prior run".to_string(),
        });
        pipeline
            .store
            .save(&finished.document_id, Stage::Finalize, &finished)
            .unwrap();

        let state = pipeline.run(&path, DocumentKind::Ebook).unwrap();

        assert_eq!(llm_calls.load(Ordering::Relaxed), 0);
        assert_eq!(ocr_calls.load(Ordering::Relaxed), 0);
        assert_eq!(state.classification.unwrap().label, "Fiction");
        // The inbox file is untouched.
        assert!(path.exists());
    }

    #[test]
    fn resumes_after_extract_without_re_extracting() {
        let dir = tempfile::tempdir().unwrap();
        // No file on disk: extraction would fail if it ran again.
        let path = dir.path().join("inbox/vanished.epub");
        fs::create_dir_all(dir.path().join("inbox")).unwrap();
        fs::write(&path, b"placeholder to copy at finalize").unwrap();

        let llm = MockLlmClient::with_replies(vec![
            Ok(METADATA_REPLY.to_string()),
            Ok(CLASSIFY_REPLY.to_string()),
        ]);
        let llm_calls = llm.call_counter();
        let ocr = MockOcrEngine::failing("must not be called");
        let ocr_calls = ocr.call_counter();
        let pipeline = pipeline_with(
            dir.path(),
            llm,
            ocr,
            MockMetadataRewriter::failing("must not be called"),
        );

        let mut extracted = DocumentState::new(&path, DocumentKind::Ebook, test_config(dir.path()));
        extracted.excerpt = Some("excerpt saved before the crash".to_string());
        pipeline
            .store
            .save(&extracted.document_id, Stage::Extract, &extracted)
            .unwrap();

        let state = pipeline.run(&path, DocumentKind::Ebook).unwrap();

        assert_eq!(ocr_calls.load(Ordering::Relaxed), 0);
        assert_eq!(llm_calls.load(Ordering::Relaxed), 2);
        assert_eq!(
            state.excerpt.as_deref(),
            Some("excerpt saved before the crash")
        );
        assert_eq!(state.classification.unwrap().label, "Marketing");
    }

    #[test]
    fn resumes_after_inference_without_new_llm_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = inbox_epub(dir.path(), "classified.epub", "Body text.");

        let llm = MockLlmClient::failing("must not be called");
        let llm_calls = llm.call_counter();
        let pipeline = pipeline_with(
            dir.path(),
            llm,
            MockOcrEngine::failing("must not be called"),
            MockMetadataRewriter::failing("must not be called"),
        );

        let mut classified = DocumentState::new(&path, DocumentKind::Ebook, test_config(dir.path()));
        classified.excerpt = Some("Body text.".to_string());
        classified.classification = Some(Classification {
            label: "Fiction".to_string(),
            confidence: 0.8,
            reason: "prior run".to_string(),
        });
        pipeline
            .store
            .save(&classified.document_id, Stage::InferClassify, &classified)
            .unwrap();

        let state = pipeline.run(&path, DocumentKind::Ebook).unwrap();

        assert_eq!(llm_calls.load(Ordering::Relaxed), 0);
        let destination = dir.path().join("library/ebook/Fiction/classified.epub");
        assert_eq!(state.destination_path.as_deref(), Some(destination.as_path()));

        let record = pipeline.store.load(&state.document_id).unwrap().unwrap();
        assert_eq!(record.stage, Stage::Finalize);
    }

    #[test]
    fn stage_failures_accumulate_but_the_run_still_finishes() {
        let dir = tempfile::tempdir().unwrap();
        // Missing file: extraction fails, the copy fails, and the failing
        // LLM mock fails both calls. None of that escapes as Err.
        let path = dir.path().join("inbox/ghost.pdf");

        let pipeline = pipeline_with(
            dir.path(),
            MockLlmClient::failing("no model"),
            MockOcrEngine::failing("no service"),
            MockMetadataRewriter::failing("no service"),
        );

        let state = pipeline.run(&path, DocumentKind::Pdf).unwrap();

        assert!(state.errors.len() >= 3);
        assert!(state.destination_path.is_none());
        let classification = state.classification.unwrap();
        assert_eq!(classification.label, "Uncategorized");
        assert_eq!(classification.confidence, 0.0);

        // The failed run is still checkpointed as finished.
        let record = pipeline.store.load(&document_id(&path)).unwrap().unwrap();
        assert_eq!(record.stage, Stage::Finalize);
    }
}
