//! Ollama HTTP client for local LLM inference.
//!
//! Both pipeline calls (metadata inference and classification) go through
//! the non-streaming `/api/chat` endpoint: one system message, one user
//! message, free-text reply.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request timeout for chat calls. Local models can be slow to first token.
pub const OLLAMA_TIMEOUT_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Ollama is not running at {0}")]
    Connection(String),

    #[error("Ollama returned error (status {status}): {body}")]
    Service { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),
}

/// One non-streaming chat exchange with the model.
pub trait LlmClient {
    fn chat(&self, model: &str, system: &str, user: &str) -> Result<String, LlmError>;
}

pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        }
    }

    /// Default Ollama instance at localhost:11434 with 5-minute timeout.
    pub fn default_local() -> Self {
        Self::new("http://localhost:11434", OLLAMA_TIMEOUT_SECS)
    }
}

/// Request body for Ollama /api/chat
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body from Ollama /api/chat
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl LlmClient for OllamaClient {
    fn chat(&self, model: &str, system: &str, user: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model,
            stream: false,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                LlmError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                LlmError::HttpClient(format!("Request timed out after {}s", self.timeout_secs))
            } else {
                LlmError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        Ok(parsed.message.content)
    }
}

/// Mock LLM client for testing — replays configured responses in order.
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<Result<String, String>>,
    calls: Arc<AtomicUsize>,
}

impl MockLlmClient {
    /// Every call returns the same reply.
    pub fn new(reply: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(Ok(reply.to_string())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every call fails with the given message.
    pub fn failing(message: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(Err(message.to_string())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Calls consume replies in order; an exhausted queue is an error.
    pub fn with_replies(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter, usable after the mock is boxed away.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl LlmClient for MockLlmClient {
    fn chat(&self, _model: &str, _system: &str, _user: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let queued = self.replies.lock().expect("mock replies lock").pop_front();
        let reply = match queued {
            Some(reply) => reply,
            None => match &self.fallback {
                Some(reply) => reply.clone(),
                None => Err("mock reply queue exhausted".to_string()),
            },
        };
        reply.map_err(LlmError::HttpClient)
    }
}
