//! EPUB text extraction: ZIP-container traversal with markup stripping.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use scraper::Html;

use super::ExtractionError;

/// Entry suffixes treated as document-bearing parts of the container.
const DOCUMENT_EXTENSIONS: &[&str] = &[".xhtml", ".html", ".htm"];

/// Aggregate text across all document parts in container order, stopping
/// early once `max_chars` is exceeded. Unreadable parts are skipped; only
/// a broken container is an error.
pub fn extract_text(path: &Path, max_chars: usize) -> Result<String, ExtractionError> {
    let file = File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| ExtractionError::EpubContainer(e.to_string()))?;

    let mut parts: Vec<String> = Vec::new();
    let mut total_chars = 0usize;

    for index in 0..archive.len() {
        let text = match read_document_part(&mut archive, index) {
            Ok(Some(text)) => text,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    index,
                    error = %e,
                    "Skipping unreadable EPUB part"
                );
                continue;
            }
        };
        if text.is_empty() {
            continue;
        }
        total_chars += text.len();
        parts.push(text);
        if total_chars > max_chars {
            break;
        }
    }

    Ok(parts.join("\n\n"))
}

fn read_document_part(
    archive: &mut zip::ZipArchive<File>,
    index: usize,
) -> Result<Option<String>, ExtractionError> {
    let mut entry = archive
        .by_index(index)
        .map_err(|e| ExtractionError::EpubContainer(e.to_string()))?;
    if !is_document_part(entry.name()) {
        return Ok(None);
    }

    let mut raw = Vec::new();
    entry.read_to_end(&mut raw)?;
    let html = String::from_utf8_lossy(&raw);
    Ok(Some(strip_markup(&html)))
}

fn is_document_part(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    DOCUMENT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Text content of all nodes, whitespace-joined, markup dropped.
fn strip_markup(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
