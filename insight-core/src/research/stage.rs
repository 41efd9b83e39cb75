//! The `Stage` abstraction implemented by every pipeline step.

use super::state::{RunState, StateUpdate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Planner,
    Searcher,
    Scraper,
    Synthesizer,
}

impl StageKind {
    /// All stages in execution order.
    pub const ALL: [StageKind; 4] = [
        StageKind::Planner,
        StageKind::Searcher,
        StageKind::Scraper,
        StageKind::Synthesizer,
    ];

    /// Short human-readable label used in progress output.
    pub fn label(&self) -> &'static str {
        match self {
            StageKind::Planner => "planning",
            StageKind::Searcher => "searching",
            StageKind::Scraper => "scraping",
            StageKind::Synthesizer => "writing report",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Planner => write!(f, "planner"),
            StageKind::Searcher => write!(f, "searcher"),
            StageKind::Scraper => write!(f, "scraper"),
            StageKind::Synthesizer => write!(f, "synthesizer"),
        }
    }
}

/// A single step of the research pipeline.
///
/// `run` never fails: collaborator errors are logged and turned into the
/// stage's fallback output.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> StageKind;

    async fn run(&self, state: &RunState) -> StateUpdate;
}
