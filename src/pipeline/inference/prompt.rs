//! Prompt construction for the two model calls.

use crate::models::BookMetadata;

/// At most this many excerpt characters are embedded in a prompt.
const PROMPT_EXCERPT_CHARS: usize = 8000;

pub const METADATA_SYSTEM_PROMPT: &str = "You are an expert librarian. \
Given an excerpt from a book (PDF or EPUB), you infer clean metadata.\n\
You MUST respond with a single valid JSON object only.\n\
Do not include backticks, markdown, or explanations.\n";

pub const CLASSIFICATION_SYSTEM_PROMPT: &str = "You are a book classifier. \
You decide which high-level category a document belongs to.\n\
You MUST respond with a single valid JSON object only.\n\
Do not include backticks, markdown, or explanations.\n";

pub fn build_metadata_prompt(excerpt: &str) -> String {
    format!(
        r#"You are given an excerpt from a book.

Excerpt (may be first pages, preface, or partial content):
---
{excerpt}
---

Infer the following fields:

- title: the best guess of the book's title.
- author: the best guess of the main author(s).
- subtitle: optional subtitle if you can infer one.
- short_description: 1-3 sentence description of what the book is about.

Return your answer as JSON with this exact schema:

{{
  "title": "string or null",
  "author": "string or null",
  "subtitle": "string or null",
  "short_description": "string or null"
}}
"#,
        excerpt = clip(excerpt, PROMPT_EXCERPT_CHARS)
    )
}

pub fn build_classification_prompt(
    excerpt: &str,
    metadata: &BookMetadata,
    existing_labels: &[String],
) -> String {
    let labels = if existing_labels.is_empty() {
        "[no existing labels yet]".to_string()
    } else {
        let mut sorted: Vec<&str> = existing_labels.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.join(", ")
    };

    format!(
        r#"You are classifying a book (PDF or EPUB).

Existing category labels (folder names) under the user's library are:
{labels}

Book metadata (you may ignore if low quality):
- title: {title:?}
- author: {author:?}
- short_description: {short_description:?}

Excerpt:
---
{excerpt}
---

Hybrid classification rules:

1. If the book clearly fits one of the existing labels, choose that label exactly. Do not stretch a broader existing label to cover a different category.
2. If not, invent a concise new label (e.g., "Software", "Math", "Psychology", "Business", "Marketing"), but avoid very narrow or weird phrases.
3. Keep labels short (1-3 words) and human-friendly (Capitalized).
4. Return:

{{
  "label": "one of the existing labels or a new concise label",
  "confidence": 0.0 to 1.0,
  "reason": "short explanation"
}}

Remember: respond with JSON ONLY.
"#,
        title = metadata.title,
        author = metadata.author,
        short_description = metadata.short_description,
        excerpt = clip(excerpt, PROMPT_EXCERPT_CHARS)
    )
}

fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
