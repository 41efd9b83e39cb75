//! HTTP collaborators for the research pipeline: DuckDuckGo search and page fetching.

use async_trait::async_trait;
use futures::StreamExt;
use insight_core::config::{ScraperConfig, SearchConfig};
use insight_core::error::{FetchError, SearchError};
use insight_core::research::{PageFetcher, SearchHit, SearchProvider};
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;

const DUCKDUCKGO_HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// Content types the fetcher accepts. Anything else is rejected before download.
const TEXT_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml", "text/plain"];

// ---------------------------------------------------------------------------
// DuckDuckGoSearch
// ---------------------------------------------------------------------------

/// Web search through the DuckDuckGo HTML endpoint. No API key required.
pub struct DuckDuckGoSearch {
    client: Client,
    endpoint: String,
    region: Option<String>,
}

impl DuckDuckGoSearch {
    pub fn new(config: &SearchConfig, user_agent: &str) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(user_agent)
            .build()
            .map_err(|e| SearchError::Request {
                query: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: DUCKDUCKGO_HTML_ENDPOINT.to_string(),
            region: config.region.clone(),
        })
    }

    /// Point the provider at a different HTML endpoint (e.g. a proxy).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn text_search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let mut form = vec![("q", query)];
        if let Some(region) = &self.region {
            form.push(("kl", region.as_str()));
        }

        debug!(query, max_results, "Searching DuckDuckGo");

        let response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .header("Accept", "text/html")
            .send()
            .await
            .map_err(|e| SearchError::Request {
                query: query.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                query: query.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| SearchError::Request {
            query: query.to_string(),
            message: format!("Failed to read response body: {}", e),
        })?;

        let hits = parse_results(&body, max_results);
        if hits.is_empty() && body.contains("anomaly-modal") {
            return Err(SearchError::Parse {
                message: "DuckDuckGo answered with a bot challenge instead of results".into(),
            });
        }
        Ok(hits)
    }
}

/// Extract up to `max_results` organic hits from a DuckDuckGo HTML results page.
///
/// Ads and entries without an absolute http(s) link are skipped.
pub fn parse_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let (Ok(result_sel), Ok(link_sel), Ok(snippet_sel)) = (
        Selector::parse(".result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let doc = Html::parse_document(html);
    doc.select(&result_sel)
        .filter(|result| !result.value().classes().any(|c| c == "result--ad"))
        .filter_map(|result| {
            let link = result.select(&link_sel).next()?;
            let url = unwrap_redirect(link.value().attr("href")?);
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return None;
            }
            let title = link.text().collect::<String>().trim().to_string();
            let snippet = result
                .select(&snippet_sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            Some(SearchHit {
                url,
                title,
                snippet,
            })
        })
        .take(max_results)
        .collect()
}

/// DuckDuckGo wraps result links in redirects like
/// `//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&rut=...`.
/// Return the decoded destination, or the input unchanged.
pub fn unwrap_redirect(href: &str) -> String {
    if let Some(pos) = href.find("uddg=") {
        let start = pos + "uddg=".len();
        let end = href[start..]
            .find('&')
            .map(|i| start + i)
            .unwrap_or(href.len());
        let encoded = &href[start..end];
        if !encoded.is_empty()
            && let Ok(decoded) = urlencoding::decode(encoded)
        {
            return decoded.into_owned();
        }
    }
    href.to_string()
}

// ---------------------------------------------------------------------------
// HttpPageFetcher
// ---------------------------------------------------------------------------

/// Downloads pages over HTTP with a timeout, a redirect limit and a size cap.
pub struct HttpPageFetcher {
    client: Client,
    max_download_bytes: usize,
}

impl HttpPageFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            max_download_bytes: config.max_download_bytes,
        })
    }
}

/// Reject anything that is not an absolute http(s) URL.
pub fn validate_url(raw: &str) -> Result<url::Url, FetchError> {
    let parsed = url::Url::parse(raw).map_err(|e| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// Whether a `Content-Type` header value names a textual document.
///
/// A missing header is accepted.
pub fn is_text_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || TEXT_CONTENT_TYPES.contains(&mime.as_str())
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let target = validate_url(url)?;

        let response = self
            .client
            .get(target)
            .header("Accept", "text/html,application/xhtml+xml,text/plain;q=0.9")
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                message: if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !is_text_content_type(&content_type) {
            return Err(FetchError::UnsupportedContentType {
                url: url.to_string(),
                content_type,
            });
        }

        let mut body: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::Body {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            body.extend_from_slice(&chunk);
            if body.len() >= self.max_download_bytes {
                debug!(url, limit = self.max_download_bytes, "Truncating oversized page");
                body.truncate(self.max_download_bytes);
                break;
            }
        }

        debug!(url, bytes = body.len(), "Fetched page");
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
