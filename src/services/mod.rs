pub mod ollama;
pub mod stirling;

pub use ollama::{LlmClient, LlmError, MockLlmClient, OllamaClient, OLLAMA_TIMEOUT_SECS};
pub use stirling::{
    MetadataRewriter, MockMetadataRewriter, MockOcrEngine, OcrEngine, PdfMetadataPatch,
    StirlingClient, StirlingError, STIRLING_TIMEOUT_SECS,
};
