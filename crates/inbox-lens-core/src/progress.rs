//! Coarse progress reporting for long operations.
//!
//! Core algorithms push [`ProgressEvent`]s into a [`ProgressSink`]; the app
//! crate forwards them onto a channel the CLI subscribes to.

use serde::Serialize;

/// Phase label of a long operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Embedding,
    Clustering,
    Projecting,
    Scoring,
    Indexing,
    Searching,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Embedding => "embedding",
            Phase::Clustering => "clustering",
            Phase::Projecting => "projecting",
            Phase::Scoring => "scoring",
            Phase::Indexing => "indexing",
            Phase::Searching => "searching",
        }
    }
}

/// A single progress tick: `current` of `total` items done in `phase`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub current: u64,
    pub total: u64,
}

impl ProgressEvent {
    pub fn new(phase: Phase, current: usize, total: usize) -> Self {
        Self {
            phase,
            current: current as u64,
            total: total as u64,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }
}

/// Receives progress ticks. Must not block.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards every event.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}
