//! Defensive JSON extraction from free-text model replies.
//!
//! Models are told to answer with a bare JSON object but routinely wrap it
//! in prose or markdown fences. The reply is cut down to the substring
//! between the first `{` and the last `}` and parsed from there.

use serde::Deserialize;

use super::InferenceError;
use crate::models::BookMetadata;

/// Classification fields exactly as the model returned them, before
/// sanitization and defaulting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawClassification {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default)]
    short_description: Option<String>,
}

/// Locate the JSON object inside a raw reply, tolerating surrounding text.
pub fn extract_json_object(reply: &str) -> Result<&str, InferenceError> {
    let first = reply.find('{').ok_or(InferenceError::NoJsonObject)?;
    let last = reply.rfind('}').ok_or(InferenceError::NoJsonObject)?;
    if last < first {
        return Err(InferenceError::NoJsonObject);
    }
    Ok(&reply[first..=last])
}

pub fn parse_metadata_reply(reply: &str) -> Result<BookMetadata, InferenceError> {
    let raw: RawMetadata = serde_json::from_str(extract_json_object(reply)?)?;
    Ok(BookMetadata {
        title: raw.title,
        author: raw.author,
        subtitle: raw.subtitle,
        short_description: raw.short_description,
    })
}

pub fn parse_classification_reply(reply: &str) -> Result<RawClassification, InferenceError> {
    Ok(serde_json::from_str(extract_json_object(reply)?)?)
}
