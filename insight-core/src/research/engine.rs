//! Research engine: runs the four stages over one shared run state.

use super::planner::Planner;
use super::progress::ResearchCallback;
use super::scraper::Scraper;
use super::searcher::Searcher;
use super::sources::{ContentExtractor, PageFetcher, SearchProvider};
use super::stage::{Stage, StageKind};
use super::state::RunState;
use super::synthesis::Synthesizer;
use crate::brain::LlmProvider;
use crate::config::ResearchConfig;
use crate::error::ResearchError;
use crate::types::CompletionOptions;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span};

/// The Planner → Searcher → Scraper → Synthesizer pipeline.
///
/// Holds only shared, read-only collaborators; every call to [`run`] or
/// [`gather`] works on its own fresh [`RunState`].
///
/// [`run`]: ResearchPipeline::run
/// [`gather`]: ResearchPipeline::gather
pub struct ResearchPipeline {
    stages: Vec<Arc<dyn Stage>>,
    synthesizer: Arc<Synthesizer>,
    config: ResearchConfig,
}

impl ResearchPipeline {
    /// Run all four stages for `topic`.
    ///
    /// Fails only when the topic is blank; every other problem is absorbed
    /// by the stages and shows up as degraded data in the returned state.
    pub async fn run(
        &self,
        topic: &str,
        callback: &dyn ResearchCallback,
    ) -> Result<RunState, ResearchError> {
        let mut state = Self::start(topic)?;
        let span = info_span!("research_run", run_id = %state.id, topic = %state.query);

        async {
            info!("Research run started");
            self.run_stages(&mut state, &self.stages, callback).await;
            callback.on_run_complete(&state);
            info!(
                sources = state.raw_content.len(),
                answered = state.answer.is_some(),
                "Research run finished"
            );
        }
        .instrument(span)
        .await;

        Ok(state)
    }

    /// Run the planner, searcher and scraper only.
    ///
    /// Used by streaming front ends that drive [`Synthesizer::stream`]
    /// themselves. `on_run_complete` is not called.
    pub async fn gather(
        &self,
        topic: &str,
        callback: &dyn ResearchCallback,
    ) -> Result<RunState, ResearchError> {
        let mut state = Self::start(topic)?;
        let span = info_span!("research_gather", run_id = %state.id, topic = %state.query);
        let gather_stages: Vec<Arc<dyn Stage>> = self
            .stages
            .iter()
            .filter(|s| s.kind() != StageKind::Synthesizer)
            .cloned()
            .collect();

        async {
            self.run_stages(&mut state, &gather_stages, callback).await;
            info!(sources = state.raw_content.len(), "Research material gathered");
        }
        .instrument(span)
        .await;

        Ok(state)
    }

    /// The report writer, for streaming the final stage.
    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Stage kinds in execution order.
    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }

    fn start(topic: &str) -> Result<RunState, ResearchError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ResearchError::EmptyTopic);
        }
        Ok(RunState::new(topic))
    }

    async fn run_stages(
        &self,
        state: &mut RunState,
        stages: &[Arc<dyn Stage>],
        callback: &dyn ResearchCallback,
    ) {
        for stage in stages {
            let kind = stage.kind();
            callback.on_stage_start(kind);
            debug!(stage = stage.name(), "Stage started");

            let update = stage
                .run(state)
                .instrument(info_span!("stage", name = stage.name()))
                .await;
            state.merge(update);

            let messages = state.drain_status_updates();
            callback.on_stage_complete(kind, &messages);
        }
    }
}

/// Builder for [`ResearchPipeline`].
pub struct PipelineBuilder {
    llm: Arc<dyn LlmProvider>,
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn ContentExtractor>,
    config: ResearchConfig,
    options: CompletionOptions,
}

impl PipelineBuilder {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn ContentExtractor>,
    ) -> Self {
        Self {
            llm,
            search,
            fetcher,
            extractor,
            config: ResearchConfig::default(),
            options: CompletionOptions::default(),
        }
    }

    pub fn config(mut self, config: ResearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Options used for both model calls (planning and report writing).
    pub fn completion_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> ResearchPipeline {
        let concurrency = self.config.pipeline.concurrency;

        let planner = Planner::new(
            self.llm.clone(),
            self.config.planner.clone(),
            self.options.clone(),
        );
        let searcher = Searcher::new(
            self.search,
            self.config.search.max_results_per_query,
            concurrency,
        );
        let scraper = Scraper::new(
            self.fetcher,
            self.extractor,
            self.config.scraper.min_content_chars,
            concurrency,
        );
        let synthesizer = Arc::new(Synthesizer::new(self.llm, self.options));

        ResearchPipeline {
            stages: vec![
                Arc::new(planner),
                Arc::new(searcher),
                Arc::new(scraper),
                synthesizer.clone(),
            ],
            synthesizer,
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::research::progress::{NoOpResearchCallback, ProgressEvent, RecordingCallback};
    use crate::research::sources::{MockPageFetcher, MockSearchProvider, PassthroughExtractor};
    use pretty_assertions::assert_eq;

    fn pipeline(llm: Arc<MockLlmProvider>) -> ResearchPipeline {
        let search = MockSearchProvider::new().with_urls("q1", &["https://a"]);
        let fetcher = MockPageFetcher::new().with_page("https://a", "a".repeat(600));
        PipelineBuilder::new(
            llm,
            Arc::new(search),
            Arc::new(fetcher),
            Arc::new(PassthroughExtractor),
        )
        .build()
    }

    #[test]
    fn test_stage_order() {
        let p = pipeline(Arc::new(MockLlmProvider::new()));
        assert_eq!(p.stage_kinds(), StageKind::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_empty_topic_rejected() {
        let llm = Arc::new(MockLlmProvider::new());
        let p = pipeline(llm.clone());

        let result = p.run("   ", &NoOpResearchCallback).await;
        assert!(matches!(result, Err(ResearchError::EmptyTopic)));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_run_trims_topic() {
        let llm = Arc::new(MockLlmProvider::with_response("q1"));
        let state = pipeline(llm).run("  topic  ", &NoOpResearchCallback).await.unwrap();
        assert_eq!(state.query, "topic");
    }

    #[tokio::test]
    async fn test_callback_order_and_status_drain() {
        let llm = Arc::new(MockLlmProvider::with_response("q1"));
        let cb = RecordingCallback::new();

        let state = pipeline(llm).run("topic", &cb).await.unwrap();

        assert!(state.status_updates.is_empty());
        assert_eq!(
            cb.events(),
            vec![
                ProgressEvent::StageStarted(StageKind::Planner),
                ProgressEvent::StageCompleted(
                    StageKind::Planner,
                    vec!["Planned 1 searches".into()]
                ),
                ProgressEvent::StageStarted(StageKind::Searcher),
                ProgressEvent::StageCompleted(StageKind::Searcher, vec!["Found 1 URLs".into()]),
                ProgressEvent::StageStarted(StageKind::Scraper),
                ProgressEvent::StageCompleted(StageKind::Scraper, vec!["Scraped 1 pages".into()]),
                ProgressEvent::StageStarted(StageKind::Synthesizer),
                ProgressEvent::StageCompleted(
                    StageKind::Synthesizer,
                    vec!["Report generated successfully".into()]
                ),
                ProgressEvent::RunCompleted,
            ]
        );
    }

    #[tokio::test]
    async fn test_gather_stops_before_synthesis() {
        let llm = Arc::new(MockLlmProvider::with_response("q1"));
        let cb = RecordingCallback::new();

        let state = pipeline(llm.clone()).gather("topic", &cb).await.unwrap();

        assert_eq!(state.raw_content.len(), 1);
        assert_eq!(state.answer, None);
        assert_eq!(llm.call_count(), 1);
        assert!(!cb.events().contains(&ProgressEvent::RunCompleted));
        assert_eq!(
            cb.messages(),
            vec!["Planned 1 searches", "Found 1 URLs", "Scraped 1 pages"]
        );
    }
}
