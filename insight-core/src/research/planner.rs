//! Planner stage: turns the topic into a handful of web-search queries.

use super::stage::{Stage, StageKind};
use super::state::{RunState, StateUpdate};
use crate::brain::{LlmProvider, complete_text};
use crate::config::PlannerConfig;
use crate::types::CompletionOptions;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

/// Leading bullet or enumeration marker (`-`, `*`, `•`, `1.`, `2)`) followed
/// by whitespace or the end of the line.
static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*•]+|\d+[.)])(?:\s+|$)").expect("list marker regex is valid")
});

const WRAPPING_QUOTES: &[char] = &['"', '\'', '`', '“', '”', '‘', '’'];

/// Build the instruction sent to the model.
pub fn planner_prompt(topic: &str, query_count: usize) -> String {
    format!(
        "You are a research lead\n\
         This is the topic: {topic}\n\n\
         Based on the topic, generate {query_count} distinct, specific search queries to gather comprehensive data.\n\
         Return ONLY the queries, one per line."
    )
}

/// Split a model response into clean, distinct queries.
///
/// Lines are trimmed, list markers and wrapping quotes removed, empty lines
/// dropped and duplicates removed keeping the first occurrence. At most
/// `max_queries` survive.
pub fn parse_queries(response: &str, max_queries: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    response
        .lines()
        .map(normalize_line)
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.clone()))
        .take(max_queries)
        .collect()
}

fn normalize_line(line: &str) -> String {
    let line = line.trim();
    let line = LIST_MARKER.replace(line, "");
    line.trim().trim_matches(WRAPPING_QUOTES).trim().to_string()
}

/// Produces `search_list` from the topic with one model call.
pub struct Planner {
    llm: Arc<dyn LlmProvider>,
    config: PlannerConfig,
    options: CompletionOptions,
}

impl Planner {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        config: PlannerConfig,
        options: CompletionOptions,
    ) -> Self {
        Self {
            llm,
            config,
            options,
        }
    }

    /// Plan queries for `topic`. Never empty: falls back to `[topic]`.
    pub async fn plan(&self, topic: &str) -> Vec<String> {
        let prompt = planner_prompt(topic, self.config.query_count);
        let queries = match complete_text(self.llm.as_ref(), &prompt, &self.options).await {
            Ok(text) => parse_queries(&text, self.config.max_queries),
            Err(e) => {
                warn!(error = %e, "Query planning failed; searching the topic directly");
                return vec![topic.to_string()];
            }
        };

        if queries.is_empty() {
            warn!("Model returned no usable queries; searching the topic directly");
            return vec![topic.to_string()];
        }
        debug!(?queries, "Planned search queries");
        queries
    }
}

#[async_trait]
impl Stage for Planner {
    fn name(&self) -> &str {
        "planner"
    }

    fn kind(&self) -> StageKind {
        StageKind::Planner
    }

    async fn run(&self, state: &RunState) -> StateUpdate {
        let search_list = self.plan(&state.query).await;
        let status = format!("Planned {} searches", search_list.len());
        info!(count = search_list.len(), "{status}");
        StateUpdate::default()
            .search_list(search_list)
            .status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use pretty_assertions::assert_eq;

    fn planner(llm: Arc<MockLlmProvider>) -> Planner {
        Planner::new(llm, PlannerConfig::default(), CompletionOptions::default())
    }

    #[test]
    fn test_parse_queries_strips_markers_and_quotes() {
        let response = "1. \"rust async runtimes\"\n- tokio vs async-std\n* `smol executor`\n• glommio io_uring\n2) 'async cancellation'";
        assert_eq!(
            parse_queries(response, 10),
            vec![
                "rust async runtimes",
                "tokio vs async-std",
                "smol executor",
                "glommio io_uring",
                "async cancellation",
            ]
        );
    }

    #[test]
    fn test_parse_queries_drops_blanks_and_duplicates() {
        let response = "\n  alpha  \n\nbeta\nalpha\n-\n  \nbeta\n";
        assert_eq!(parse_queries(response, 5), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_parse_queries_caps_length() {
        let response = "a\nb\nc\nd\ne\nf\ng";
        assert_eq!(parse_queries(response, 5).len(), 5);
    }

    #[test]
    fn test_parse_queries_keeps_inner_numbers() {
        assert_eq!(
            parse_queries("HTTP/2 vs HTTP/3 latency", 5),
            vec!["HTTP/2 vs HTTP/3 latency"]
        );
        assert_eq!(parse_queries("2024 GPU prices", 5), vec!["2024 GPU prices"]);
        assert_eq!(
            parse_queries("3.5 turbo context window", 5),
            vec!["3.5 turbo context window"]
        );
    }

    #[test]
    fn test_parse_queries_keeps_leading_sign_without_space() {
        assert_eq!(
            parse_queries("-40 degrees conversion\n- celsius to fahrenheit", 5),
            vec!["-40 degrees conversion", "celsius to fahrenheit"]
        );
        assert_eq!(parse_queries("*args in python", 5), vec!["*args in python"]);
    }

    #[test]
    fn test_prompt_contains_topic_and_count() {
        let prompt = planner_prompt("quantum computing basics", 3);
        assert!(prompt.contains("This is the topic: quantum computing basics"));
        assert!(prompt.contains("generate 3 distinct"));
        assert!(prompt.contains("one per line"));
    }

    #[tokio::test]
    async fn test_planner_success() {
        let llm = Arc::new(MockLlmProvider::with_response("q one\nq two\nq three"));
        let update = planner(llm.clone())
            .run(&RunState::new("topic"))
            .await;

        assert_eq!(
            update.search_list,
            Some(vec!["q one".into(), "q two".into(), "q three".into()])
        );
        assert_eq!(update.status.as_deref(), Some("Planned 3 searches"));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_planner_falls_back_on_llm_failure() {
        let llm = Arc::new(MockLlmProvider::failing("quota exceeded"));
        let update = planner(llm).run(&RunState::new("rust ownership")).await;

        assert_eq!(update.search_list, Some(vec!["rust ownership".to_string()]));
        assert_eq!(update.status.as_deref(), Some("Planned 1 searches"));
    }

    #[tokio::test]
    async fn test_planner_falls_back_on_blank_response() {
        let llm = Arc::new(MockLlmProvider::with_response("\n \n"));
        let update = planner(llm).run(&RunState::new("topic")).await;
        assert_eq!(update.search_list, Some(vec!["topic".to_string()]));
    }
}
