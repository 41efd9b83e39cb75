//! Run state shared by the pipeline stages.
//!
//! Every stage reads the accumulated [`RunState`] and returns a
//! [`StateUpdate`]; the engine owns the merge step.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Width of the separator line that closes each rendered content block.
const BLOCK_SEPARATOR_WIDTH: usize = 50;

/// Extracted text of one page, tagged with the URL it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub url: String,
    pub text: String,
}

impl ContentBlock {
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for ContentBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SOURCE: {}\nCONTENT:\n{}\n{}",
            self.url,
            self.text,
            "=".repeat(BLOCK_SEPARATOR_WIDTH)
        )
    }
}

/// The record threaded through all stages of one research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub id: Uuid,
    /// The research topic. Never changes after creation.
    pub query: String,
    /// Queries produced by the planner.
    pub search_list: Vec<String>,
    /// Deduplicated result URLs, in first-seen order.
    pub urls: Vec<String>,
    pub raw_content: Vec<ContentBlock>,
    /// The Markdown report, or an error message in its place.
    pub answer: Option<String>,
    /// Stage summaries not yet delivered to the presentation layer.
    pub status_updates: Vec<String>,
}

impl RunState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            search_list: Vec::new(),
            urls: Vec::new(),
            raw_content: Vec::new(),
            answer: None,
            status_updates: Vec::new(),
        }
    }

    /// Apply a stage's partial output.
    ///
    /// Fields present in the update replace the current value; the status
    /// message, if any, is appended to the feed.
    pub fn merge(&mut self, update: StateUpdate) {
        if let Some(search_list) = update.search_list {
            self.search_list = search_list;
        }
        if let Some(urls) = update.urls {
            self.urls = urls;
        }
        if let Some(raw_content) = update.raw_content {
            self.raw_content = raw_content;
        }
        if let Some(answer) = update.answer {
            self.answer = Some(answer);
        }
        if let Some(status) = update.status {
            self.status_updates.push(status);
        }
    }

    /// Take all pending status messages, leaving the feed empty.
    pub fn drain_status_updates(&mut self) -> Vec<String> {
        std::mem::take(&mut self.status_updates)
    }

    /// All content blocks rendered and joined, as fed to the synthesis prompt.
    pub fn research_material(&self) -> String {
        self.raw_content
            .iter()
            .map(ContentBlock::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// URLs of the pages whose text survived scraping.
    pub fn source_urls(&self) -> Vec<String> {
        self.raw_content.iter().map(|b| b.url.clone()).collect()
    }
}

/// Partial output of a single stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub search_list: Option<Vec<String>>,
    pub urls: Option<Vec<String>>,
    pub raw_content: Option<Vec<ContentBlock>>,
    pub answer: Option<String>,
    pub status: Option<String>,
}

impl StateUpdate {
    pub fn search_list(mut self, search_list: Vec<String>) -> Self {
        self.search_list = Some(search_list);
        self
    }

    pub fn urls(mut self, urls: Vec<String>) -> Self {
        self.urls = Some(urls);
        self
    }

    pub fn raw_content(mut self, raw_content: Vec<ContentBlock>) -> Self {
        self.raw_content = Some(raw_content);
        self
    }

    pub fn answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_content_block_rendering() {
        let block = ContentBlock::new("https://example.com/a", "Body text");
        let expected = format!(
            "SOURCE: https://example.com/a\nCONTENT:\nBody text\n{}",
            "=".repeat(50)
        );
        assert_eq!(block.to_string(), expected);
    }

    #[test]
    fn test_merge_overwrites_present_fields_only() {
        let mut state = RunState::new("topic");
        state.merge(
            StateUpdate::default()
                .search_list(vec!["q1".into(), "q2".into()])
                .status("Planned 2 searches"),
        );
        state.merge(StateUpdate::default().urls(vec!["https://a".into()]));

        assert_eq!(state.search_list, vec!["q1", "q2"]);
        assert_eq!(state.urls, vec!["https://a"]);
        assert!(state.raw_content.is_empty());
        assert_eq!(state.answer, None);
        assert_eq!(state.query, "topic");
    }

    #[test]
    fn test_merge_replaces_rather_than_extends() {
        let mut state = RunState::new("topic");
        state.merge(StateUpdate::default().urls(vec!["https://a".into(), "https://b".into()]));
        state.merge(StateUpdate::default().urls(vec!["https://c".into()]));
        assert_eq!(state.urls, vec!["https://c"]);
    }

    #[test]
    fn test_status_updates_append_and_drain() {
        let mut state = RunState::new("topic");
        state.merge(StateUpdate::default().status("one"));
        state.merge(StateUpdate::default().status("two"));

        assert_eq!(state.drain_status_updates(), vec!["one", "two"]);
        assert!(state.status_updates.is_empty());
        assert!(state.drain_status_updates().is_empty());
    }

    #[test]
    fn test_research_material_joins_blocks() {
        let mut state = RunState::new("topic");
        state.merge(StateUpdate::default().raw_content(vec![
            ContentBlock::new("https://a", "alpha"),
            ContentBlock::new("https://b", "beta"),
        ]));

        let material = state.research_material();
        assert!(material.starts_with("SOURCE: https://a\nCONTENT:\nalpha\n"));
        assert!(material.contains(&format!("{}\nSOURCE: https://b", "=".repeat(50))));
        assert_eq!(state.source_urls(), vec!["https://a", "https://b"]);
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunState::new("t").id, RunState::new("t").id);
    }
}
