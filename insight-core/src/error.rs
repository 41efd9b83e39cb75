//! Error types for the InsightEngine core.
//!
//! Uses `thiserror` for structured error variants covering the LLM provider,
//! the search provider, page fetching and configuration. Pipeline stages never
//! surface these directly; they convert them into degraded data at the stage
//! boundary.

use std::path::PathBuf;

/// Top-level error type for the InsightEngine core library.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("Research topic must not be empty")]
    EmptyTopic,

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Streaming error: {message}")]
    Streaming { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Model returned no content (finish reason: {reason})")]
    EmptyResponse { reason: String },
}

/// Errors from the web-search provider.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search request for '{query}' failed: {message}")]
    Request { query: String, message: String },

    #[error("Search provider returned HTTP {status} for '{query}'")]
    Status { query: String, status: u16 },

    #[error("Failed to parse search results: {message}")]
    Parse { message: String },
}

/// Errors from fetching a single page.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Unsupported content type '{content_type}' for {url}")]
    UnsupportedContentType { url: String, content_type: String },

    #[error("Failed to read body of {url}: {message}")]
    Body { url: String, message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Convenience type alias for results using `ResearchError`.
pub type Result<T> = std::result::Result<T, ResearchError>;
