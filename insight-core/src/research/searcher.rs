//! Searcher stage: runs every planned query and collects result URLs.

use super::sources::SearchProvider;
use super::stage::{Stage, StageKind};
use super::state::{RunState, StateUpdate};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Remove repeated URLs, keeping the first occurrence of each.
pub fn dedup_urls(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

pub struct Searcher {
    search: Arc<dyn SearchProvider>,
    max_results_per_query: usize,
    concurrency: usize,
}

impl Searcher {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        max_results_per_query: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            search,
            max_results_per_query,
            concurrency: concurrency.max(1),
        }
    }

    /// Search every query and return all hit URLs in query order, before dedup.
    ///
    /// A failing query contributes nothing.
    pub async fn collect_urls(&self, queries: &[String]) -> Vec<String> {
        let per_query: Vec<Vec<String>> = futures::stream::iter(queries.iter().cloned())
            .map(|query| async move { self.search_one(&query).await })
            .buffered(self.concurrency)
            .collect()
            .await;
        per_query.into_iter().flatten().collect()
    }

    async fn search_one(&self, query: &str) -> Vec<String> {
        match self
            .search
            .text_search(query, self.max_results_per_query)
            .await
        {
            Ok(hits) => {
                debug!(query, hits = hits.len(), "Search returned results");
                hits.into_iter()
                    .take(self.max_results_per_query)
                    .map(|hit| hit.url)
                    .collect()
            }
            Err(e) => {
                warn!(query, error = %e, "Search failed; skipping query");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Stage for Searcher {
    fn name(&self) -> &str {
        "searcher"
    }

    fn kind(&self) -> StageKind {
        StageKind::Searcher
    }

    async fn run(&self, state: &RunState) -> StateUpdate {
        let collected = self.collect_urls(&state.search_list).await;
        let raw_count = collected.len();
        let urls = dedup_urls(collected);

        let status = format!("Found {raw_count} URLs");
        info!(raw = raw_count, unique = urls.len(), "{status}");
        StateUpdate::default().urls(urls).status(status)
    }
}
