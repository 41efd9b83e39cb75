//! Deep research pipeline.
//!
//! A linear four-stage process over one shared [`RunState`]:
//! 1. **Plan**: ask the model for a few distinct search queries
//! 2. **Search**: run each query and collect deduplicated result URLs
//! 3. **Scrape**: fetch each page and keep the ones with enough main text
//! 4. **Synthesize**: write a cited Markdown report from the material
//!
//! Each stage returns a [`StateUpdate`] that the engine merges into the
//! state. Stages never fail; collaborator errors degrade to fallbacks.

pub mod engine;
pub mod output;
pub mod planner;
pub mod progress;
pub mod scraper;
pub mod searcher;
pub mod sources;
pub mod stage;
pub mod state;
pub mod synthesis;

pub use engine::{PipelineBuilder, ResearchPipeline};
pub use output::ResearchReport;
pub use planner::Planner;
pub use progress::{NoOpResearchCallback, ProgressEvent, RecordingCallback, ResearchCallback};
pub use scraper::Scraper;
pub use searcher::Searcher;
pub use sources::{
    ContentExtractor, MockPageFetcher, MockSearchProvider, PageFetcher, PassthroughExtractor,
    SearchHit, SearchProvider,
};
pub use stage::{Stage, StageKind};
pub use state::{ContentBlock, RunState, StateUpdate};
pub use synthesis::{NO_CONTENT_ANSWER, ReportStream, Synthesizer};
