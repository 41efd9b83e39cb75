//! Progress reporting from the pipeline to the presentation layer.

use super::stage::StageKind;
use super::state::RunState;
use std::sync::{Mutex, PoisonError};

/// Callback trait for progressive research UI updates.
pub trait ResearchCallback: Send + Sync {
    /// Called before a stage starts.
    fn on_stage_start(&self, stage: StageKind);
    /// Called after a stage's update has been merged, with the status
    /// messages it produced.
    fn on_stage_complete(&self, stage: StageKind, messages: &[String]);
    /// Called once the last stage of the run has finished.
    fn on_run_complete(&self, state: &RunState);
}

/// No-op callback for tests and headless runs.
pub struct NoOpResearchCallback;

impl ResearchCallback for NoOpResearchCallback {
    fn on_stage_start(&self, _stage: StageKind) {}
    fn on_stage_complete(&self, _stage: StageKind, _messages: &[String]) {}
    fn on_run_complete(&self, _state: &RunState) {}
}

/// A callback event captured by [`RecordingCallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    StageStarted(StageKind),
    StageCompleted(StageKind, Vec<String>),
    RunCompleted,
}

/// Records every callback invocation in order.
#[derive(Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.lock().clone()
    }

    /// All status messages delivered so far, flattened in delivery order.
    pub fn messages(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::StageCompleted(_, messages) => Some(messages.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ProgressEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResearchCallback for RecordingCallback {
    fn on_stage_start(&self, stage: StageKind) {
        self.lock().push(ProgressEvent::StageStarted(stage));
    }

    fn on_stage_complete(&self, stage: StageKind, messages: &[String]) {
        self.lock()
            .push(ProgressEvent::StageCompleted(stage, messages.to_vec()));
    }

    fn on_run_complete(&self, _state: &RunState) {
        self.lock().push(ProgressEvent::RunCompleted);
    }
}
