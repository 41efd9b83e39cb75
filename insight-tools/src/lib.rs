//! # Insight Tools
//!
//! Network-facing collaborators for the research pipeline: DuckDuckGo search,
//! HTTP page fetching, and main-content extraction from HTML.

pub mod extract;
pub mod web;

pub use extract::MainContentExtractor;
pub use web::{DuckDuckGoSearch, HttpPageFetcher};

use insight_core::config::ResearchConfig;
use insight_core::error::ResearchError;
use insight_core::research::{ContentExtractor, PageFetcher, SearchProvider};
use std::sync::Arc;

/// The default web-backed collaborators for a pipeline.
pub struct WebCollaborators {
    pub search: Arc<dyn SearchProvider>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub extractor: Arc<dyn ContentExtractor>,
}

/// Build search, fetch and extraction collaborators from research settings.
pub fn web_collaborators(config: &ResearchConfig) -> Result<WebCollaborators, ResearchError> {
    let search = DuckDuckGoSearch::new(&config.search, &config.scraper.user_agent)?;
    let fetcher = HttpPageFetcher::new(&config.scraper)?;
    Ok(WebCollaborators {
        search: Arc::new(search),
        fetcher: Arc::new(fetcher),
        extractor: Arc::new(MainContentExtractor::new()),
    })
}
