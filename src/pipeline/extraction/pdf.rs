//! Page-bounded direct PDF text extraction using the pdf-extract crate.

use std::path::Path;

use super::ExtractionError;

/// Extract text from the first `max_pages` pages, joined with newlines.
/// Scanned PDFs with no text layer yield an empty or near-empty string
/// rather than an error; the caller decides whether to fall back to OCR.
pub fn extract_text(path: &Path, max_pages: usize) -> Result<String, ExtractionError> {
    let bytes = std::fs::read(path)?;
    let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
        .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;

    let excerpt = pages
        .into_iter()
        .take(max_pages)
        .collect::<Vec<_>>()
        .join("\n");
    Ok(excerpt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::pdf_fixtures::make_test_pdf;

    #[test]
    fn extracts_text_from_digital_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.pdf");
        std::fs::write(&path, make_test_pdf(&["Hello World from the inbox"])).unwrap();

        let text = extract_text(&path, 10).unwrap();
        assert!(
            text.contains("Hello") || text.contains("World"),
            "Expected text to contain 'Hello' or 'World', got: {text}"
        );
    }

    #[test]
    fn page_budget_bounds_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.pdf");
        std::fs::write(
            &path,
            make_test_pdf(&["First page text", "Second page text", "Third page text"]),
        )
        .unwrap();

        let text = extract_text(&path, 2).unwrap();
        assert!(text.contains("First"));
        assert!(text.contains("Second"));
        assert!(!text.contains("Third"));
    }

    #[test]
    fn invalid_pdf_is_a_parsing_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let err = extract_text(&path, 10).unwrap_err();
        assert!(matches!(err, ExtractionError::PdfParsing(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = extract_text(Path::new("/nonexistent/book.pdf"), 10).unwrap_err();
        assert!(matches!(err, ExtractionError::Io(_)));
    }
}
