//! # Insight Core
//!
//! Core library for InsightEngine, a deep-research agent.
//! Provides the research pipeline (planner, searcher, scraper, synthesizer),
//! the LLM interface (brain) and its providers, configuration, and
//! fundamental types.

pub mod brain;
pub mod config;
pub mod error;
pub mod persistence;
pub mod providers;
pub mod research;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{LlmProvider, MockLlmProvider, TextStream, complete_text, stream_text};
pub use config::{InsightConfig, LlmConfig, ResearchConfig, load_config};
pub use error::{ConfigError, FetchError, LlmError, Result, ResearchError, SearchError};
pub use providers::create_provider;
pub use research::{
    ContentBlock, ContentExtractor, NoOpResearchCallback, PageFetcher, PipelineBuilder,
    ReportStream, ResearchCallback, ResearchPipeline, ResearchReport, RunState, SearchHit,
    SearchProvider, Stage, StageKind, StateUpdate, Synthesizer,
};
pub use types::{
    CompletionOptions, CompletionRequest, CompletionResponse, Message, Role, StreamEvent,
    TokenUsage,
};
