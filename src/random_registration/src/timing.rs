//! Refinement timing and the adaptive time budget.
//!
//! Every refinement call reports its duration to a [`RefineClock`]. The
//! clock keeps a running mean over calls that neither timed out nor failed,
//! and derives the budget of the next call from it:
//! `min(cap, factor × mean)`. Until the first successful sample exists the
//! mean counts as infinite, so the budget equals the cap.
//!
//! Seeds are refined from worker threads; all updates go through one lock
//! that only guards a few scalars, never the refinement work itself.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// How a refinement call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineOutcome {
    /// Returned within budget.
    Success,
    /// Ran out of its time budget.
    TimedOut,
    /// Returned an error.
    Failed,
}

/// Snapshot of refinement timing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefineTiming {
    /// Calls that returned within budget.
    pub successful: usize,
    /// Calls that ran out of time.
    pub timed_out: usize,
    /// Calls that returned an error.
    pub failed: usize,
    /// Mean duration of successful calls, if any.
    pub mean_success_ms: Option<f64>,
    /// Total time spent in all calls.
    pub total_ms: f64,
}

#[derive(Debug, Default)]
struct ClockState {
    successful: usize,
    timed_out: usize,
    failed: usize,
    success_secs: f64,
    total_secs: f64,
}

/// Running-mean accumulator shared across refinement workers.
#[derive(Debug, Default)]
pub struct RefineClock {
    state: Mutex<ClockState>,
}

impl RefineClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished call.
    pub fn record(&self, elapsed: Duration, outcome: RefineOutcome) {
        let secs = elapsed.as_secs_f64();
        let mut state = self.state.lock();
        state.total_secs += secs;
        match outcome {
            RefineOutcome::Success => {
                state.successful += 1;
                state.success_secs += secs;
            }
            RefineOutcome::TimedOut => state.timed_out += 1,
            RefineOutcome::Failed => state.failed += 1,
        }
    }

    /// Mean duration of successful calls, or `None` before the first one.
    pub fn mean_success(&self) -> Option<Duration> {
        let state = self.state.lock();
        if state.successful == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(
            state.success_secs / state.successful as f64,
        ))
    }

    /// Time budget for the next call: `min(cap, factor × mean)`.
    ///
    /// Equals `cap` until a successful sample exists.
    pub fn budget(&self, cap: Duration, factor: f64) -> Duration {
        match self.mean_success() {
            Some(mean) => {
                let scaled = mean.as_secs_f64() * factor.max(0.0);
                Duration::try_from_secs_f64(scaled).map_or(cap, |budget| cap.min(budget))
            }
            None => cap,
        }
    }

    /// Current counters.
    pub fn snapshot(&self) -> RefineTiming {
        let state = self.state.lock();
        RefineTiming {
            successful: state.successful,
            timed_out: state.timed_out,
            failed: state.failed,
            mean_success_ms: (state.successful > 0)
                .then(|| state.success_secs / state.successful as f64 * 1000.0),
            total_ms: state.total_secs * 1000.0,
        }
    }
}
