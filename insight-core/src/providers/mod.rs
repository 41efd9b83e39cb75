//! LLM provider implementations.
//!
//! Provides concrete implementations of the `LlmProvider` trait for:
//! - Google Gemini API (the default)
//! - OpenAI-compatible APIs (OpenAI, Azure, Ollama, vLLM, LM Studio)
//!
//! Use `create_provider()` to instantiate the appropriate provider based on config.

pub mod gemini;
pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;

pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatibleProvider;

/// Reassembles server-sent-event lines from raw response chunks.
///
/// Bytes are decoded only once a whole line has arrived, so a multi-byte
/// character split across two network chunks stays intact.
#[derive(Debug, Default)]
pub(crate) struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// The next complete line, trimmed, or `None` until a newline arrives.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let newline_pos = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=newline_pos).collect();
        Some(decode_line(&line[..newline_pos]))
    }

    /// Whatever is left after the stream ended without a final newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let line = decode_line(&rest);
        (!line.is_empty()).then_some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(line) => line.trim().to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Invalid UTF-8 in stream line");
            String::from_utf8_lossy(bytes).trim().to_string()
        }
    }
}

/// Create an LLM provider based on the configuration.
///
/// Routes to the appropriate provider implementation:
/// - `"gemini"` → `GeminiProvider` (native Gemini API)
/// - Everything else → `OpenAiCompatibleProvider` (OpenAI, Azure, Ollama, local, etc.)
///
/// Returns an error if the provider cannot be initialized, typically because
/// no API key is available.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider: Arc<dyn LlmProvider> = match config.provider.as_str() {
        "gemini" | "google" => Arc::new(GeminiProvider::new(config)?),
        _ => Arc::new(OpenAiCompatibleProvider::new(config)?),
    };
    tracing::debug!(
        provider = %config.provider,
        model = provider.model_name(),
        "LLM provider initialized"
    );
    Ok(provider)
}
