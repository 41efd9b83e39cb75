//! Google Gemini API provider implementation.
//!
//! Implements the `LlmProvider` trait for the native Gemini API with both
//! full and streaming completions.
//!
//! Key differences from OpenAI-compatible APIs:
//! - Auth via `?key=API_KEY` query parameter (not header-based)
//! - Roles are `"user"` / `"model"` (not `"assistant"`)
//! - Streaming uses `?alt=sse` query parameter

use super::SseLineBuffer;
use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{
    CompletionRequest, CompletionResponse, Message, Role, StreamEvent, TokenUsage,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// The default Google Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini API provider.
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl GeminiProvider {
    /// Create a new Gemini provider from configuration.
    ///
    /// Uses `config.api_key` when set, otherwise reads the environment variable
    /// named by `config.api_key_env`.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::AuthFailed {
                provider: format!("Gemini (env var '{}' not set)", config.api_key_env),
            })?;
        Self::new_with_key(config, api_key)
    }

    /// Create a new Gemini provider with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Build the JSON request body for the Gemini API.
    fn build_request_body(request: &CompletionRequest) -> Value {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::Assistant => "model",
                    Role::User => "user",
                };
                json!({ "role": role, "parts": [{ "text": msg.content }] })
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": request.temperature,
            },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["generationConfig"]["maxOutputTokens"] = json!(max_tokens);
        }

        body
    }

    /// Parse a Gemini API response JSON into a `CompletionResponse`.
    fn parse_response(body: &Value, fallback_model: &str) -> Result<CompletionResponse, LlmError> {
        let candidate = body["candidates"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing or empty 'candidates' array in response".to_string(),
            })?;

        let finish_reason = candidate["finishReason"].as_str().map(|s| s.to_string());
        let text = Self::candidate_text(candidate);

        if text.is_none() {
            return Err(LlmError::EmptyResponse {
                reason: finish_reason.unwrap_or_else(|| "unknown".to_string()),
            });
        }

        let model = body["modelVersion"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string();

        Ok(CompletionResponse {
            message: Message::assistant(text.unwrap_or_default()),
            usage: Self::parse_usage(&body["usageMetadata"]),
            model,
            finish_reason,
        })
    }

    /// Concatenate the text parts of a candidate. `None` when there are no text parts.
    fn candidate_text(candidate: &Value) -> Option<String> {
        let parts = candidate["content"]["parts"].as_array()?;
        let texts: Vec<&str> = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }

    fn parse_usage(usage_metadata: &Value) -> TokenUsage {
        TokenUsage {
            input_tokens: usage_metadata["promptTokenCount"].as_u64().unwrap_or(0) as usize,
            output_tokens: usage_metadata["candidatesTokenCount"].as_u64().unwrap_or(0) as usize,
        }
    }

    /// Map an HTTP status code to the appropriate `LlmError`.
    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthFailed {
                provider: "Gemini".to_string(),
            },
            429 => LlmError::RateLimited {
                retry_after_secs: 30,
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {} from Gemini API: {}", status, body_text),
            },
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else if e.is_connect() {
            LlmError::Connection {
                message: e.to_string(),
            }
        } else {
            LlmError::ApiRequest {
                message: format!("Request to Gemini API failed: {}", e),
            }
        }
    }

    fn endpoint_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    /// Handle one SSE `data:` payload, forwarding text deltas to the channel.
    async fn process_stream_chunk(
        data: &Value,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Option<TokenUsage> {
        if let Some(candidate) = data["candidates"].as_array().and_then(|c| c.first())
            && let Some(text) = Self::candidate_text(candidate)
            && !text.is_empty()
        {
            let _ = tx.send(StreamEvent::Token(text)).await;
        }

        let usage_metadata = &data["usageMetadata"];
        usage_metadata
            .is_object()
            .then(|| Self::parse_usage(usage_metadata))
    }

    async fn process_sse_line(
        line: &str,
        tx: &mpsc::Sender<StreamEvent>,
        usage: &mut TokenUsage,
    ) {
        let Some(data_str) = line.strip_prefix("data:").map(str::trim) else {
            return;
        };
        match serde_json::from_str::<Value>(data_str) {
            Ok(data_json) => {
                if let Some(u) = Self::process_stream_chunk(&data_json, tx).await {
                    *usage = u;
                }
            }
            Err(e) => {
                let preview: String = data_str.chars().take(200).collect();
                warn!(
                    error = %e,
                    data_preview = preview.as_str(),
                    "Failed to parse Gemini SSE JSON chunk"
                );
            }
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = Self::build_request_body(&request);
        let url = self.endpoint_url(model, "generateContent");

        debug!(model, "Sending Gemini completion request");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json, model)
    }

    /// Uses the `streamGenerateContent` endpoint with `?alt=sse`.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = Self::build_request_body(&request);
        let url = self.endpoint_url(model, "streamGenerateContent");

        debug!(model, "Sending Gemini streaming request");

        let response = self
            .client
            .post(&url)
            .query(&[("alt", "sse"), ("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body_text));
        }

        let mut byte_stream = response.bytes_stream();
        let mut usage = TokenUsage::default();
        let mut lines = SseLineBuffer::default();

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = chunk_result.map_err(|e| LlmError::Streaming {
                message: format!("Failed to read streaming chunk: {}", e),
            })?;
            lines.push(&chunk);

            while let Some(line) = lines.next_line() {
                Self::process_sse_line(&line, &tx, &mut usage).await;
            }
        }

        if let Some(remaining) = lines.finish() {
            Self::process_sse_line(&remaining, &tx, &mut usage).await;
        }

        let _ = tx.send(StreamEvent::Done { usage }).await;
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LlmConfig {
        LlmConfig {
            api_key_env: "INSIGHT_TEST_GEMINI_KEY_THAT_DOES_NOT_EXIST".to_string(),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_new_without_key_fails() {
        let result = GeminiProvider::new(&test_config());
        assert!(matches!(result, Err(LlmError::AuthFailed { .. })));
    }

    #[test]
    fn test_inline_key_is_used() {
        let config = LlmConfig {
            api_key: Some("inline-key".into()),
            ..test_config()
        };
        let provider = GeminiProvider::new(&config).unwrap();
        assert_eq!(provider.model_name(), "gemini-2.5-flash");
    }

    #[test]
    fn test_build_request_body() {
        let request = CompletionRequest {
            messages: vec![Message::user("Topic: Rust"), Message::assistant("Noted.")],
            temperature: 0.0,
            max_tokens: Some(1024),
            model: None,
        };
        let body = GeminiProvider::build_request_body(&request);

        assert_eq!(body["contents"].as_array().unwrap().len(), 2);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Topic: Rust");
        assert_eq!(body["contents"][1]["role"], "model");
        assert!(body.get("system_instruction").is_none());
        assert_eq!(body["generationConfig"]["temperature"], 0.0);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn test_parse_response_joins_text_parts() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hello, " }, { "text": "world" }], "role": "model" },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 3 },
            "modelVersion": "gemini-2.5-flash-001"
        });
        let response = GeminiProvider::parse_response(&body, "gemini-2.5-flash").unwrap();
        assert_eq!(response.text(), "Hello, world");
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.usage.output_tokens, 3);
        assert_eq!(response.model, "gemini-2.5-flash-001");
        assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_parse_response_without_parts_is_empty_response() {
        let body = json!({ "candidates": [{ "finishReason": "SAFETY" }] });
        let err = GeminiProvider::parse_response(&body, "m").unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { reason } if reason == "SAFETY"));
    }

    #[test]
    fn test_parse_response_missing_candidates() {
        let err = GeminiProvider::parse_response(&json!({}), "m").unwrap_err();
        assert!(matches!(err, LlmError::ResponseParse { .. }));
    }

    #[test]
    fn test_map_http_error() {
        assert!(matches!(
            GeminiProvider::map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
            LlmError::RateLimited { .. }
        ));
        assert!(matches!(
            GeminiProvider::map_http_error(reqwest::StatusCode::FORBIDDEN, ""),
            LlmError::AuthFailed { .. }
        ));
        assert!(matches!(
            GeminiProvider::map_http_error(reqwest::StatusCode::BAD_GATEWAY, "oops"),
            LlmError::ApiRequest { .. }
        ));
    }

    #[tokio::test]
    async fn test_process_sse_line_forwards_text() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut usage = TokenUsage::default();
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"chunk"}]}}],"usageMetadata":{"promptTokenCount":4,"candidatesTokenCount":1}}"#;

        GeminiProvider::process_sse_line(line, &tx, &mut usage).await;

        assert_eq!(rx.recv().await, Some(StreamEvent::Token("chunk".into())));
        assert_eq!(usage.input_tokens, 4);
    }

    #[tokio::test]
    async fn test_process_sse_line_ignores_non_data_lines() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut usage = TokenUsage::default();
        GeminiProvider::process_sse_line("event: ping", &tx, &mut usage).await;
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }
}
