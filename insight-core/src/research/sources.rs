//! Collaborator interfaces for finding and reading web sources.
//!
//! The pipeline talks to the web only through these traits. Concrete HTTP
//! implementations live in `insight-tools`; the in-memory doubles here keep
//! tests off the network.

use crate::error::{FetchError, SearchError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// One web-search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

impl SearchHit {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            snippet: String::new(),
        }
    }
}

/// A text web-search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Return at most `max_results` hits for `query`.
    async fn text_search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, SearchError>;
}

/// Downloads the raw document behind a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Turns a raw document into its main readable text.
pub trait ContentExtractor: Send + Sync {
    /// `None` when the document has no extractable text.
    fn extract(&self, raw: &str) -> Option<String>;
}

/// Canned search results keyed by query.
///
/// Unknown queries return no hits. Queries registered with `fail_query`
/// return a `SearchError`.
#[derive(Default)]
pub struct MockSearchProvider {
    results: HashMap<String, Vec<SearchHit>>,
    failing: Vec<String>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl MockSearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_urls(mut self, query: &str, urls: &[&str]) -> Self {
        self.results.insert(
            query.to_string(),
            urls.iter().map(|u| SearchHit::new(*u)).collect(),
        );
        self
    }

    pub fn fail_query(mut self, query: &str) -> Self {
        self.failing.push(query.to_string());
        self
    }

    /// Every `(query, max_results)` pair requested so far.
    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn text_search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((query.to_string(), max_results));

        if self.failing.iter().any(|q| q == query) {
            return Err(SearchError::Status {
                query: query.to_string(),
                status: 503,
            });
        }
        Ok(self
            .results
            .get(query)
            .map(|hits| hits.iter().take(max_results).cloned().collect())
            .unwrap_or_default())
    }
}

/// Serves canned page bodies keyed by URL.
///
/// Unknown URLs fail with HTTP 404.
#[derive(Default)]
pub struct MockPageFetcher {
    pages: HashMap<String, String>,
    fetched: Mutex<Vec<String>>,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    /// URLs requested so far, in call order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PageFetcher for MockPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.fetched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Treats the raw document as already-extracted text.
///
/// Blank documents yield `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughExtractor;

impl ContentExtractor for PassthroughExtractor {
    fn extract(&self, raw: &str) -> Option<String> {
        let text = raw.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_search_caps_results() {
        let search =
            MockSearchProvider::new().with_urls("q", &["https://a", "https://b", "https://c"]);
        let hits = search.text_search("q", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(search.calls(), vec![("q".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_mock_search_unknown_and_failing_queries() {
        let search = MockSearchProvider::new().fail_query("bad");
        assert!(search.text_search("unknown", 2).await.unwrap().is_empty());
        assert!(matches!(
            search.text_search("bad", 2).await,
            Err(SearchError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_mock_fetcher_unknown_url_is_404() {
        let fetcher = MockPageFetcher::new().with_page("https://a", "body");
        assert_eq!(fetcher.fetch("https://a").await.unwrap(), "body");
        assert!(matches!(
            fetcher.fetch("https://missing").await,
            Err(FetchError::Status { status: 404, .. })
        ));
        assert_eq!(fetcher.fetched(), vec!["https://a", "https://missing"]);
    }

    #[test]
    fn test_passthrough_extractor() {
        assert_eq!(
            PassthroughExtractor.extract("  text  ").as_deref(),
            Some("text")
        );
        assert_eq!(PassthroughExtractor.extract(" \n "), None);
    }
}
