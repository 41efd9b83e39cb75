//! Synthesizer stage: writes the Markdown report from the gathered material.
//!
//! Runs either as a regular stage (one completion call, the whole report
//! lands in `answer`) or as a [`ReportStream`] the presentation layer drains
//! chunk by chunk. Both paths use the same prompt and the same fallbacks.

use super::stage::{Stage, StageKind};
use super::state::{RunState, StateUpdate};
use crate::brain::{LlmProvider, complete_text, stream_text};
use crate::error::LlmError;
use crate::types::CompletionOptions;
use async_trait::async_trait;
use futures::{Stream, StreamExt, future};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{info, warn};

/// Answer used when no page survived scraping.
pub const NO_CONTENT_ANSWER: &str = "Failed to gather any info.";

pub const NO_CONTENT_STATUS: &str = "No content gathered; skipped report generation";
pub const SUCCESS_STATUS: &str = "Report generated successfully";
pub const FAILURE_STATUS: &str = "There was an error generating the response";

/// A finite, single-consumption sequence of report chunks.
pub type ReportStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Answer text substituted for the report when the model call fails.
pub fn failure_answer(error: &impl std::fmt::Display) -> String {
    format!("Analysis failed: {error}")
}

/// Build the report-writing prompt from the topic and rendered material.
pub fn synthesis_prompt(topic: &str, research_material: &str) -> String {
    format!(
        "You are a Senior Technical Writer.\n\
         Topic: {topic}\n\n\
         Research Material:\n\
         {research_material}\n\n\
         Task:\n\
         Write a comprehensive \"Deep Research Report\" in Markdown.\n\
         1. Executive Summary\n\
         2. Detailed Technical Findings (Use bullet points)\n\
         3. Code Examples (if relevant found in text else skip this point)\n\
         4. Citations (Explicitly mention the Source URL for facts)\n"
    )
}

pub struct Synthesizer {
    llm: Arc<dyn LlmProvider>,
    options: CompletionOptions,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmProvider>, options: CompletionOptions) -> Self {
        Self { llm, options }
    }

    /// Write the report in one call. Returns `(answer, status)`.
    pub async fn synthesize(&self, state: &RunState) -> (String, &'static str) {
        if state.raw_content.is_empty() {
            warn!("No content gathered; skipping report generation");
            return (NO_CONTENT_ANSWER.to_string(), NO_CONTENT_STATUS);
        }

        let prompt = synthesis_prompt(&state.query, &state.research_material());
        match complete_text(self.llm.as_ref(), &prompt, &self.options).await {
            Ok(report) if report.is_empty() => {
                let e = empty_report_error();
                warn!(error = %e, "Report generation returned no text");
                (failure_answer(&e), FAILURE_STATUS)
            }
            Ok(report) => {
                info!(chars = report.len(), sources = state.raw_content.len(), "Report generated");
                (report, SUCCESS_STATUS)
            }
            Err(e) => {
                warn!(error = %e, "Report generation failed");
                (failure_answer(&e), FAILURE_STATUS)
            }
        }
    }

    /// Stream the report for an already-gathered state.
    ///
    /// With no content the stream yields the sentinel answer once and makes
    /// no model call. A provider error, or a model that produces no text at
    /// all, ends the stream with an `Analysis failed: ...` chunk.
    pub fn stream(&self, state: &RunState) -> ReportStream {
        if state.raw_content.is_empty() {
            warn!("No content gathered; skipping report generation");
            return Box::pin(futures::stream::once(future::ready(
                NO_CONTENT_ANSWER.to_string(),
            )));
        }

        let prompt = synthesis_prompt(&state.query, &state.research_material());
        let chunks = stream_text(self.llm.clone(), prompt, self.options.clone());

        Box::pin(futures::stream::unfold(
            (chunks, false, false),
            |(mut chunks, produced, finished)| async move {
                if finished {
                    return None;
                }
                match chunks.next().await {
                    Some(Ok(chunk)) => Some((chunk, (chunks, true, false))),
                    Some(Err(e)) => {
                        warn!(error = %e, "Report streaming failed");
                        Some((failure_answer(&e), (chunks, produced, true)))
                    }
                    None if !produced => {
                        let e = empty_report_error();
                        warn!(error = %e, "Report stream ended without text");
                        Some((failure_answer(&e), (chunks, produced, true)))
                    }
                    None => None,
                }
            },
        ))
    }
}

fn empty_report_error() -> LlmError {
    LlmError::EmptyResponse {
        reason: "no report text".to_string(),
    }
}

#[async_trait]
impl Stage for Synthesizer {
    fn name(&self) -> &str {
        "synthesizer"
    }

    fn kind(&self) -> StageKind {
        StageKind::Synthesizer
    }

    async fn run(&self, state: &RunState) -> StateUpdate {
        let (answer, status) = self.synthesize(state).await;
        StateUpdate::default().answer(answer).status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::research::state::ContentBlock;
    use crate::types::{CompletionRequest, CompletionResponse, StreamEvent, TokenUsage};
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    /// Streams a couple of tokens, then breaks off with a stream error.
    struct BrokenStreamProvider;

    #[async_trait]
    impl LlmProvider for BrokenStreamProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::Connection {
                message: "unused".into(),
            })
        }

        async fn complete_streaming(
            &self,
            _request: CompletionRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), LlmError> {
            for event in [
                StreamEvent::Token("# Partial ".into()),
                StreamEvent::Token("report".into()),
                StreamEvent::Error("connection reset".into()),
                StreamEvent::Token("never shown".into()),
                StreamEvent::Done {
                    usage: TokenUsage::default(),
                },
            ] {
                let _ = tx.send(event).await;
            }
            Ok(())
        }

        fn model_name(&self) -> &str {
            "broken-stream"
        }
    }

    fn gathered_state() -> RunState {
        let mut state = RunState::new("rust borrow checker");
        state.raw_content = vec![
            ContentBlock::new("https://a.example", "alpha ".repeat(100)),
            ContentBlock::new("https://b.example", "beta ".repeat(100)),
        ];
        state
    }

    #[test]
    fn test_prompt_sections() {
        let prompt = synthesis_prompt("topic X", "MATERIAL");
        assert!(prompt.starts_with("You are a Senior Technical Writer."));
        assert!(prompt.contains("Topic: topic X"));
        assert!(prompt.contains("Research Material:\nMATERIAL"));
        for section in [
            "1. Executive Summary",
            "2. Detailed Technical Findings",
            "3. Code Examples",
            "4. Citations",
        ] {
            assert!(prompt.contains(section), "missing {section}");
        }
    }

    #[tokio::test]
    async fn test_empty_content_short_circuits() {
        let llm = Arc::new(MockLlmProvider::with_response("unused"));
        let synthesizer = Synthesizer::new(llm.clone(), CompletionOptions::default());

        let update = synthesizer.run(&RunState::new("t")).await;
        assert_eq!(update.answer.as_deref(), Some(NO_CONTENT_ANSWER));
        assert_eq!(update.status.as_deref(), Some(NO_CONTENT_STATUS));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_success_uses_model_text() {
        let llm = Arc::new(MockLlmProvider::with_response("# Report"));
        let synthesizer = Synthesizer::new(llm.clone(), CompletionOptions::default());

        let update = synthesizer.run(&gathered_state()).await;
        assert_eq!(update.answer.as_deref(), Some("# Report"));
        assert_eq!(update.status.as_deref(), Some(SUCCESS_STATUS));

        let prompt = llm.last_prompt().unwrap();
        assert!(prompt.contains("SOURCE: https://a.example"));
        assert!(prompt.contains("SOURCE: https://b.example"));
    }

    #[tokio::test]
    async fn test_failure_becomes_answer() {
        let llm = Arc::new(MockLlmProvider::failing("quota exceeded"));
        let synthesizer = Synthesizer::new(llm, CompletionOptions::default());

        let update = synthesizer.run(&gathered_state()).await;
        let answer = update.answer.unwrap();
        assert!(answer.starts_with("Analysis failed: "));
        assert!(answer.contains("quota exceeded"));
        assert_eq!(update.status.as_deref(), Some(FAILURE_STATUS));
    }

    #[tokio::test]
    async fn test_stream_empty_content_yields_sentinel() {
        let llm = Arc::new(MockLlmProvider::with_response("unused"));
        let synthesizer = Synthesizer::new(llm.clone(), CompletionOptions::default());

        let chunks: Vec<String> = synthesizer.stream(&RunState::new("t")).collect().await;
        assert_eq!(chunks, vec![NO_CONTENT_ANSWER.to_string()]);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_matches_full_answer() {
        let report = "# Deep Research Report\n\n## Executive Summary\n\nText.\n\n## Citations\n- https://a.example";
        let llm = Arc::new(MockLlmProvider::with_response(report).with_chunk_chars(7));
        let synthesizer = Synthesizer::new(llm, CompletionOptions::default());
        let state = gathered_state();

        let streamed: Vec<String> = synthesizer.stream(&state).collect().await;
        let (answer, _) = synthesizer.synthesize(&state).await;

        assert!(streamed.len() > 1);
        assert_eq!(streamed.concat(), answer);
    }

    #[tokio::test]
    async fn test_stream_failure_ends_with_error_chunk() {
        let llm = Arc::new(MockLlmProvider::failing("stream broke"));
        let synthesizer = Synthesizer::new(llm, CompletionOptions::default());

        let chunks: Vec<String> = synthesizer.stream(&gathered_state()).collect().await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with("Analysis failed: "));
        assert!(chunks[0].contains("stream broke"));
    }

    #[tokio::test]
    async fn test_stream_failure_midway_keeps_partial_text_then_stops() {
        let synthesizer =
            Synthesizer::new(Arc::new(BrokenStreamProvider), CompletionOptions::default());

        let chunks: Vec<String> = synthesizer.stream(&gathered_state()).collect().await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "# Partial ");
        assert_eq!(chunks[1], "report");
        assert!(chunks[2].starts_with("Analysis failed: "));
        assert!(chunks[2].contains("connection reset"));
    }

    #[tokio::test]
    async fn test_stream_without_tokens_yields_failure_answer() {
        let llm = Arc::new(MockLlmProvider::with_response(""));
        let synthesizer = Synthesizer::new(llm, CompletionOptions::default());
        let state = gathered_state();

        let chunks: Vec<String> = synthesizer.stream(&state).collect().await;
        let (answer, status) = synthesizer.synthesize(&state).await;

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with("Analysis failed: "));
        assert!(chunks[0].contains("no report text"));
        assert_eq!(chunks.concat(), answer);
        assert_eq!(status, FAILURE_STATUS);
    }
}
