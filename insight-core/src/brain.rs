//! Brain module: the LLM provider abstraction.
//!
//! Defines the `LlmProvider` trait implemented by every model backend, the
//! text-level helpers the pipeline stages call, and `MockLlmProvider` for tests.

use crate::error::LlmError;
use crate::types::{
    CompletionOptions, CompletionRequest, CompletionResponse, Message, StreamEvent, TokenUsage,
};
use async_trait::async_trait;
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Trait for LLM providers.
///
/// Implementations are constructed once and shared across runs behind an
/// `Arc`; they carry no per-run state.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Perform a streaming completion, sending events to the channel.
    ///
    /// Implementations send `StreamEvent::Token` for each text delta and
    /// finish with `StreamEvent::Done`.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// A lazy, single-consumption sequence of text chunks.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Run a single-prompt completion and return the response text.
pub async fn complete_text(
    provider: &dyn LlmProvider,
    prompt: &str,
    options: &CompletionOptions,
) -> Result<String, LlmError> {
    let request = CompletionRequest::from_prompt(prompt, options);
    debug!(
        model = provider.model_name(),
        prompt_chars = prompt.len(),
        "Requesting completion"
    );
    let response = provider.complete(request).await?;
    Ok(response.message.content)
}

/// Run a single-prompt streaming completion and expose it as a chunk stream.
///
/// The provider runs on a spawned task. Text deltas arrive in order as
/// `Ok(chunk)`; a provider failure is delivered as a final `Err`. Dropping
/// the stream stops forwarding.
pub fn stream_text(
    provider: Arc<dyn LlmProvider>,
    prompt: String,
    options: CompletionOptions,
) -> TextStream {
    let (chunk_tx, chunk_rx) = mpsc::channel::<Result<String, LlmError>>(64);

    tokio::spawn(async move {
        let (event_tx, mut event_rx) = mpsc::channel::<StreamEvent>(64);
        let request = CompletionRequest::from_prompt(prompt, &options);

        let forward_tx = chunk_tx.clone();
        let forward = async move {
            while let Some(event) = event_rx.recv().await {
                let item = match event {
                    StreamEvent::Token(text) if text.is_empty() => continue,
                    StreamEvent::Token(text) => Ok(text),
                    StreamEvent::Error(message) => Err(LlmError::Streaming { message }),
                    StreamEvent::Done { .. } => continue,
                };
                if forward_tx.send(item).await.is_err() {
                    break;
                }
            }
        };

        let (result, ()) = tokio::join!(provider.complete_streaming(request, event_tx), forward);
        if let Err(e) = result {
            let _ = chunk_tx.send(Err(e)).await;
        }
    });

    Box::pin(ReceiverStream::new(chunk_rx))
}

/// A deterministic LLM provider for tests.
///
/// Responses are served from a FIFO queue; when the queue is empty the
/// sticky default (set via `with_response` or `failing`) is used. Every
/// request is recorded so tests can assert on call counts and prompts.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    default_text: Option<String>,
    failure: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
    chunk_chars: usize,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(VecDeque::new()),
            default_text: None,
            failure: None,
            requests: Mutex::new(Vec::new()),
            chunk_chars: 16,
        }
    }

    /// Create a MockLlmProvider that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        Self {
            default_text: Some(text.to_string()),
            ..Self::new()
        }
    }

    /// Create a MockLlmProvider whose every call fails with a connection error.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new()
        }
    }

    /// Set how many characters each streamed chunk carries.
    pub fn with_chunk_chars(mut self, chars: usize) -> Self {
        self.chunk_chars = chars.max(1);
        self
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.lock_responses().push_back(Ok(response));
    }

    /// Queue a plain-text response.
    pub fn queue_text(&self, text: &str) {
        self.queue_response(Self::text_response(text));
    }

    /// Queue an error for the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.lock_responses().push_back(Err(error));
    }

    /// Number of completion calls made so far (streaming calls included).
    pub fn call_count(&self) -> usize {
        self.lock_requests().len()
    }

    /// All recorded requests, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.lock_requests().clone()
    }

    /// Prompt text of the most recent request.
    pub fn last_prompt(&self) -> Option<String> {
        self.lock_requests().last().map(|r| r.prompt_text())
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    fn lock_responses(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<CompletionResponse, LlmError>>> {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_requests(&self) -> std::sync::MutexGuard<'_, Vec<CompletionRequest>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.lock_requests().push(request);

        let queued = self.lock_responses().pop_front();
        if let Some(queued) = queued {
            return queued;
        }
        if let Some(message) = &self.failure {
            return Err(LlmError::Connection {
                message: message.clone(),
            });
        }
        Ok(Self::text_response(
            self.default_text
                .as_deref()
                .unwrap_or("I'm a mock LLM. No queued responses available."),
        ))
    }

    /// Streams the same text `complete` would return, split into fixed-size
    /// character chunks so the concatenation is exact.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        let response = self.complete(request).await?;
        let chars: Vec<char> = response.message.content.chars().collect();
        for chunk in chars.chunks(self.chunk_chars) {
            let _ = tx.send(StreamEvent::Token(chunk.iter().collect())).await;
        }
        let _ = tx
            .send(StreamEvent::Done {
                usage: response.usage,
            })
            .await;
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_mock_serves_queue_then_default() {
        let provider = MockLlmProvider::with_response("default");
        provider.queue_text("first");

        let options = CompletionOptions::default();
        assert_eq!(
            complete_text(&provider, "a", &options).await.unwrap(),
            "first"
        );
        assert_eq!(
            complete_text(&provider, "b", &options).await.unwrap(),
            "default"
        );
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.last_prompt().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_mock_queued_error() {
        let provider = MockLlmProvider::with_response("ok");
        provider.queue_error(LlmError::RateLimited {
            retry_after_secs: 5,
        });

        let result = complete_text(&provider, "x", &CompletionOptions::default()).await;
        assert!(matches!(result, Err(LlmError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn test_failing_mock_always_errors() {
        let provider = MockLlmProvider::failing("quota exceeded");
        for _ in 0..3 {
            let result = complete_text(&provider, "x", &CompletionOptions::default()).await;
            assert!(matches!(result, Err(LlmError::Connection { .. })));
        }
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_stream_text_concatenates_to_full_text() {
        let text = "# Report\n\nSome streamed content with ünïcödé characters.";
        let provider: Arc<dyn LlmProvider> =
            Arc::new(MockLlmProvider::with_response(text).with_chunk_chars(5));

        let chunks: Vec<String> = stream_text(provider, "p".into(), CompletionOptions::default())
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), text);
    }

    #[tokio::test]
    async fn test_stream_text_surfaces_provider_error() {
        let provider: Arc<dyn LlmProvider> = Arc::new(MockLlmProvider::failing("boom"));
        let items: Vec<Result<String, LlmError>> =
            stream_text(provider, "p".into(), CompletionOptions::default())
                .collect()
                .await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(LlmError::Connection { .. })));
    }
}
