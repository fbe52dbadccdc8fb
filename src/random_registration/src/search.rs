//! Randomized multi-start global registration.
//!
//! The search is a linear pipeline run once per call:
//!
//! ```text
//! Seed → BulkRefine → {Sort → SelectiveRefine → Dedup} × rounds
//!      → FinalSort → Truncate → (optional) DebugPass → Return
//! ```
//!
//! 1. Seeds: a Cartesian grid of rotations about the source anchor, moved
//!    onto the destination anchor.
//! 2. Bulk refine: every seed is refined in parallel at low resolution, with
//!    regularization and an adaptive time budget.
//! 3. Resolution ladder: each round sorts the set, re-refines the first
//!    `len / divisor` candidates at the round's resolution, then removes
//!    duplicates over the whole set. The divisor doubles every round.
//! 4. The best candidates are returned, scores ascending.
//!
//! Refinement and dedup of a round complete before the next sort begins.
//!
//! # Usage
//!
//! ```ignore
//! use random_registration::{CloudSample, GlobalRegistrationSearch, IcpRefiner, SearchConfig};
//!
//! let source = CloudSample::new(source_points);
//! let destination = CloudSample::new(destination_points);
//! let refiner = IcpRefiner::with_defaults(source.clone(), &destination)?;
//!
//! let search = GlobalRegistrationSearch::new(SearchConfig::with_steps(4))?;
//! let result = search.register(&refiner, &source, &destination)?;
//! if let Some(best) = result.best() {
//!     println!("score {} pose {}", best.score, best.pose);
//! }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use nalgebra::{Translation3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::candidate::{Candidate, CandidateSet};
use crate::centroid::estimate_anchor;
use crate::cloud::CloudSample;
use crate::config::SearchConfig;
use crate::pose::{axis_rotation, is_finite, seed_pose, Pose};
use crate::refiner::{LocalRefiner, RefineRequest};
use crate::timing::{RefineClock, RefineOutcome, RefineTiming};
use crate::visualization::{TracingSink, VisualizationSink};

/// One initial guess of the seed grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    /// Position in grid order.
    pub index: usize,

    /// Rotation angles about x, y and z (radians).
    pub angles: [f64; 3],

    /// Translation offset added to the destination anchor.
    pub offset: Vector3<f64>,

    /// Initial guess, source to destination.
    pub pose: Pose,
}

/// A final search result entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub pose: Pose,
    pub score: f64,

    /// Number of merged hypotheses. Always 1; reserved for clustering.
    pub count: usize,
}

/// Counters of one resolution ladder round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundStats {
    /// Resolution of the round.
    pub target_points: usize,

    /// Candidates re-refined.
    pub refined: usize,

    /// Candidates removed as duplicates.
    pub removed: usize,

    /// Candidates left after dedup.
    pub surviving: usize,

    /// Best ranking score when the round started.
    pub best_before: Option<f64>,

    /// Best ranking score after refinement and dedup.
    pub best_after: Option<f64>,
}

/// Summary of one search invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Number of seeds refined in the bulk pass.
    pub seeds: usize,

    /// Per-round counters of the resolution ladder.
    pub rounds: Vec<RoundStats>,

    /// Number of returned candidates.
    pub candidates: usize,

    /// Refinement outcome counters and timing.
    pub timing: RefineTiming,

    /// Wall-clock duration of the search.
    pub elapsed_ms: f64,
}

/// Ranked output of a search.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    /// Candidates, best first.
    pub candidates: Vec<RankedCandidate>,

    pub stats: SearchStats,
}

impl SearchResult {
    /// Best candidate, if any.
    pub fn best(&self) -> Option<&RankedCandidate> {
        self.candidates.first()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Search statistics as pretty-printed JSON.
    pub fn stats_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.stats)?)
    }
}

/// Multi-start global registration orchestrator.
///
/// Holds no state between invocations; every call to
/// [`register`](Self::register) starts with a fresh timing accumulator.
#[derive(Clone)]
pub struct GlobalRegistrationSearch {
    config: SearchConfig,
    sink: Arc<dyn VisualizationSink>,
}

impl std::fmt::Debug for GlobalRegistrationSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalRegistrationSearch")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GlobalRegistrationSearch {
    /// Create a search with the given configuration.
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sink: Arc::new(TracingSink),
        })
    }

    /// Create a search with default configuration.
    pub fn with_defaults() -> Self {
        Self {
            config: SearchConfig::default(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Replace the sink used by the debug pass.
    pub fn with_sink(mut self, sink: Arc<dyn VisualizationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Anchor poses of the source and destination clouds.
    pub fn anchors(&self, source: &CloudSample, destination: &CloudSample) -> (Pose, Pose) {
        (
            estimate_anchor(source, self.config.source_anchor),
            estimate_anchor(destination, self.config.destination_anchor),
        )
    }

    /// Enumerate the seed grid.
    ///
    /// Seeds are ordered with the x rotation varying slowest and the z
    /// translation fastest. Each seed is
    /// `(destination anchor + offset) · Rx·Ry·Rz · source anchor⁻¹`.
    pub fn seeds(&self, source: &CloudSample, destination: &CloudSample) -> Vec<Seed> {
        let (source_anchor, destination_anchor) = self.anchors(source, destination);
        let [rx, ry, rz] = self.config.rotation.map(|axis| axis.values());
        let [tx, ty, tz] = self.config.translation.map(|axis| axis.values());

        let mut seeds = Vec::with_capacity(self.config.seed_count());
        for &ax in &rx {
            for &ay in &ry {
                for &az in &rz {
                    let rotation = axis_rotation(ax, ay, az);
                    for &ox in &tx {
                        for &oy in &ty {
                            for &oz in &tz {
                                let offset = Vector3::new(ox, oy, oz);
                                let anchor = Translation3::from(offset) * destination_anchor;
                                seeds.push(Seed {
                                    index: seeds.len(),
                                    angles: [ax, ay, az],
                                    offset,
                                    pose: seed_pose(&anchor, &rotation, &source_anchor),
                                });
                            }
                        }
                    }
                }
            }
        }
        seeds
    }

    /// Run the search.
    ///
    /// `refiner` must already be bound to `source` and `destination`. The
    /// clouds are only read here to compute anchors and the duplicate test
    /// subsample; they are not checked for emptiness.
    ///
    /// # Errors
    /// Fails only on an invalid configuration. Refinement failures are kept
    /// as candidates with an infinite score.
    pub fn register<R: LocalRefiner + ?Sized>(
        &self,
        refiner: &R,
        source: &CloudSample,
        destination: &CloudSample,
    ) -> Result<SearchResult> {
        self.config.validate()?;
        let start = Instant::now();
        let clock = RefineClock::new();

        let seeds = self.seeds(source, destination);
        for seed in &seeds {
            trace!(
                index = seed.index,
                total = seeds.len(),
                rx = seed.angles[0],
                ry = seed.angles[1],
                rz = seed.angles[2],
                tx = seed.offset.x,
                ty = seed.offset.y,
                tz = seed.offset.z,
                "Planned seed"
            );
        }

        let mut set = self.bulk_refine(refiner, &clock, &seeds);

        let dedup_points = source.subsample(self.config.dedup_target_points);
        let rounds = self.refine_ladder(refiner, &clock, &mut set, &dedup_points);

        set.sort_by_score();
        set.truncate(self.config.max_candidates);

        if self.config.visualization {
            self.debug_pass(refiner, &set);
        }

        let candidates: Vec<RankedCandidate> = set
            .into_iter()
            .map(|c| RankedCandidate {
                pose: c.guess,
                score: c.score,
                count: 1,
            })
            .collect();

        let stats = SearchStats {
            seeds: seeds.len(),
            rounds,
            candidates: candidates.len(),
            timing: clock.snapshot(),
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        };

        info!(
            seeds = stats.seeds,
            candidates = stats.candidates,
            best_score = candidates.first().map(|c| c.score),
            timed_out = stats.timing.timed_out,
            failed = stats.timing.failed,
            elapsed_ms = stats.elapsed_ms,
            "Global registration finished"
        );

        Ok(SearchResult { candidates, stats })
    }

    /// Refine every seed at the bulk resolution, in parallel.
    fn bulk_refine<R: LocalRefiner + ?Sized>(
        &self,
        refiner: &R,
        clock: &RefineClock,
        seeds: &[Seed],
    ) -> CandidateSet {
        let refined: Vec<Candidate> = seeds
            .par_iter()
            .map(|seed| {
                let request = RefineRequest::new(seed.pose, self.config.bulk_target_points)
                    .with_time_budget(self.time_budget(clock))
                    .with_regularization(true);
                let candidate = self.refine_one(refiner, clock, &request);
                debug!(
                    index = seed.index,
                    rx = seed.angles[0],
                    ry = seed.angles[1],
                    rz = seed.angles[2],
                    score = candidate.score,
                    timed_out = candidate.timed_out,
                    "Seed refined"
                );
                candidate
            })
            .collect();
        CandidateSet::from(refined)
    }

    /// Run the resolution ladder over `set`.
    ///
    /// The leading candidate of every round is re-refined and is never
    /// removed by dedup. The best score therefore never rises across a round
    /// unless the refiner scores the same pose differently at the new
    /// resolution.
    fn refine_ladder<R: LocalRefiner + ?Sized>(
        &self,
        refiner: &R,
        clock: &RefineClock,
        set: &mut CandidateSet,
        dedup_points: &[nalgebra::Point3<f64>],
    ) -> Vec<RoundStats> {
        let mut rounds = Vec::new();
        let mut divisor: usize = 2;

        for target_points in self.config.ladder() {
            set.sort_by_score();
            let best_before = set.first().map(Candidate::ranking_score);

            let selected = set.len() / divisor;
            let refined: Vec<Candidate> = set.as_slice()[..selected]
                .par_iter()
                .map(|candidate| {
                    let request = RefineRequest::new(candidate.guess, target_points)
                        .with_time_budget(self.time_budget(clock))
                        .with_regularization(false);
                    self.refine_one(refiner, clock, &request)
                })
                .collect();
            set.as_mut_slice()[..selected].clone_from_slice(&refined);

            let removed = set.dedup(dedup_points, self.config.dedup_tolerance_factor);
            let round = RoundStats {
                target_points,
                refined: selected,
                removed,
                surviving: set.len(),
                best_before,
                best_after: set.best().map(Candidate::ranking_score),
            };
            debug!(
                target_points,
                refined = round.refined,
                removed = round.removed,
                surviving = round.surviving,
                best_before = round.best_before,
                best_after = round.best_after,
                "Resolution round finished"
            );
            rounds.push(round);

            divisor = divisor.saturating_mul(2);
        }

        rounds
    }

    /// Re-refine the best candidates at full resolution for inspection.
    ///
    /// The results only go to the sink.
    fn debug_pass<R: LocalRefiner + ?Sized>(&self, refiner: &R, set: &CandidateSet) {
        for (rank, candidate) in set.iter().take(self.config.debug_candidates).enumerate() {
            let request = RefineRequest::new(candidate.guess, self.config.debug_target_points)
                .with_regularization(true);
            match refiner.refine(&request) {
                Ok(refined) => self.sink.show(rank, &refined),
                Err(err) => warn!(rank, %err, "Debug refinement failed"),
            }
        }
    }

    /// Budget of the next call; unbounded in visualization mode.
    fn time_budget(&self, clock: &RefineClock) -> Option<Duration> {
        if self.config.visualization {
            None
        } else {
            Some(clock.budget(
                self.config.max_time_budget(),
                self.config.time_budget_factor,
            ))
        }
    }

    /// Run one refinement and record its timing.
    ///
    /// Errors and non-finite poses become a timed-out candidate at the input
    /// guess with an infinite score.
    fn refine_one<R: LocalRefiner + ?Sized>(
        &self,
        refiner: &R,
        clock: &RefineClock,
        request: &RefineRequest,
    ) -> Candidate {
        let start = Instant::now();
        let result = refiner.refine(request);
        let elapsed = start.elapsed();

        match result {
            Ok(candidate) if is_finite(&candidate.guess) => {
                let outcome = if candidate.timed_out {
                    RefineOutcome::TimedOut
                } else {
                    RefineOutcome::Success
                };
                clock.record(elapsed, outcome);
                candidate
            }
            Ok(_) => {
                warn!("Refiner returned a non-finite pose, keeping the input guess");
                clock.record(elapsed, RefineOutcome::Failed);
                Candidate::failed(request.guess, refiner.convergence_tolerance())
            }
            Err(err) => {
                warn!(%err, "Refinement failed, keeping the input guess");
                clock.record(elapsed, RefineOutcome::Failed);
                Candidate::failed(request.guess, refiner.convergence_tolerance())
            }
        }
    }
}
