//! Scraper stage: downloads each URL and keeps pages with enough text.

use super::sources::{ContentExtractor, PageFetcher};
use super::stage::{Stage, StageKind};
use super::state::{ContentBlock, RunState, StateUpdate};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether extracted text is long enough to keep.
///
/// Counts characters, not bytes; the threshold itself is excluded.
pub fn has_enough_content(text: &str, min_content_chars: usize) -> bool {
    text.chars().count() > min_content_chars
}

pub struct Scraper {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn ContentExtractor>,
    min_content_chars: usize,
    concurrency: usize,
}

impl Scraper {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn ContentExtractor>,
        min_content_chars: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            min_content_chars,
            concurrency: concurrency.max(1),
        }
    }

    /// Scrape every URL, returning the surviving blocks in URL order.
    pub async fn scrape_all(&self, urls: &[String]) -> Vec<ContentBlock> {
        futures::stream::iter(urls.iter().cloned())
            .map(|url| async move { self.scrape_one(&url).await })
            .buffered(self.concurrency)
            .filter_map(|block| async move { block })
            .collect()
            .await
    }

    async fn scrape_one(&self, url: &str) -> Option<ContentBlock> {
        let raw = match self.fetcher.fetch(url).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(url, error = %e, "Unable to fetch page; skipping");
                return None;
            }
        };

        let Some(text) = self.extractor.extract(&raw) else {
            debug!(url, "No extractable text; skipping");
            return None;
        };

        if !has_enough_content(&text, self.min_content_chars) {
            debug!(
                url,
                chars = text.chars().count(),
                min = self.min_content_chars,
                "Skipped page due to low content"
            );
            return None;
        }

        Some(ContentBlock::new(url, text))
    }
}

#[async_trait]
impl Stage for Scraper {
    fn name(&self) -> &str {
        "scraper"
    }

    fn kind(&self) -> StageKind {
        StageKind::Scraper
    }

    async fn run(&self, state: &RunState) -> StateUpdate {
        let blocks = self.scrape_all(&state.urls).await;
        let status = format!("Scraped {} pages", blocks.len());
        info!(attempted = state.urls.len(), kept = blocks.len(), "{status}");
        StateUpdate::default().raw_content(blocks).status(status)
    }
}
