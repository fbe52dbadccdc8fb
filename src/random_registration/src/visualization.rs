//! Sinks for inspecting candidates during a visualization run.
//!
//! When visualization is enabled the search re-refines its best candidates
//! at full resolution and hands every result to a [`VisualizationSink`].
//! The returned search result is not affected by what the sink does.

use parking_lot::Mutex;
use tracing::info;

use crate::candidate::Candidate;

/// Receives candidates for human inspection.
pub trait VisualizationSink: Send + Sync {
    /// Show one re-refined candidate. `rank` is its position in the result.
    fn show(&self, rank: usize, candidate: &Candidate);
}

/// Logs each candidate's pose and score.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl VisualizationSink for TracingSink {
    fn show(&self, rank: usize, candidate: &Candidate) {
        let t = candidate.guess.translation.vector;
        let (roll, pitch, yaw) = candidate.guess.rotation.euler_angles();
        info!(
            rank,
            score = candidate.score,
            timed_out = candidate.timed_out,
            x = t.x,
            y = t.y,
            z = t.z,
            roll,
            pitch,
            yaw,
            "Candidate"
        );
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl VisualizationSink for NoopSink {
    fn show(&self, _rank: usize, _candidate: &Candidate) {}
}

/// Keeps every shown candidate, in arrival order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    shown: Mutex<Vec<(usize, Candidate)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidates shown so far.
    pub fn shown(&self) -> Vec<(usize, Candidate)> {
        self.shown.lock().clone()
    }
}

impl VisualizationSink for CollectingSink {
    fn show(&self, rank: usize, candidate: &Candidate) {
        self.shown.lock().push((rank, candidate.clone()));
    }
}
