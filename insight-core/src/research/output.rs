//! The finished research report and its on-disk form.

use super::state::RunState;
use crate::persistence::atomic_write;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// A generated research report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    /// The research topic.
    pub topic: String,
    /// The report body, or the error text that replaced it.
    pub markdown: String,
    /// URLs of the pages the report was written from.
    pub sources: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl ResearchReport {
    /// Build a report from a finished run. `None` if the run produced no answer.
    pub fn from_state(state: &RunState) -> Option<Self> {
        let markdown = state.answer.clone()?;
        Some(Self::new(state, markdown))
    }

    /// Build a report from gathered state and separately produced Markdown,
    /// e.g. the concatenated chunks of a streamed report.
    pub fn new(state: &RunState, markdown: impl Into<String>) -> Self {
        Self {
            topic: state.query.clone(),
            markdown: markdown.into(),
            sources: state.source_urls(),
            generated_at: Utc::now(),
        }
    }

    /// Write the Markdown to `dir/filename`, replacing any existing file.
    pub fn save(&self, dir: &Path, filename: &str) -> std::io::Result<PathBuf> {
        let path = dir.join(filename);
        atomic_write(&path, self.markdown.as_bytes())?;
        info!(path = %path.display(), bytes = self.markdown.len(), "Report saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::state::{ContentBlock, StateUpdate};
    use tempfile::TempDir;

    #[test]
    fn test_from_state_requires_answer() {
        let state = RunState::new("topic");
        assert!(ResearchReport::from_state(&state).is_none());
    }

    #[test]
    fn test_from_state_collects_sources() {
        let mut state = RunState::new("topic");
        state.merge(
            StateUpdate::default()
                .raw_content(vec![ContentBlock::new("https://a", "text")])
                .answer("# Report"),
        );

        let report = ResearchReport::from_state(&state).unwrap();
        assert_eq!(report.topic, "topic");
        assert_eq!(report.markdown, "# Report");
        assert_eq!(report.sources, vec!["https://a"]);
    }

    #[test]
    fn test_save_writes_markdown() {
        let dir = TempDir::new().unwrap();
        let report = ResearchReport::new(&RunState::new("t"), "# Title\n\nBody");

        let path = report.save(dir.path(), "research_report.md").unwrap();
        assert_eq!(path, dir.path().join("research_report.md"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# Title\n\nBody");
    }
}
