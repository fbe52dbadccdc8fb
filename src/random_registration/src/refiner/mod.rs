//! Local refinement capability.
//!
//! The search drives every seed through a [`LocalRefiner`]. Any backend that
//! turns an initial guess into a locally optimal [`Candidate`] can be plugged
//! in; [`IcpRefiner`] is the bundled point-to-point ICP backend.

pub mod icp;
pub mod newton;
pub mod prior;
pub mod search;

use std::time::Duration;

use crate::candidate::Candidate;
use crate::error::RefineError;
use crate::pose::Pose;

pub use icp::{IcpConfig, IcpRefiner};
pub use prior::SeedPrior;
pub use search::PointSearch;

/// Parameters of one refinement call.
#[derive(Debug, Clone, PartialEq)]
pub struct RefineRequest {
    /// Initial guess, source to destination.
    pub guess: Pose,

    /// Approximate number of source points to use.
    pub target_points: usize,

    /// Wall-clock budget. `None` means unbounded.
    pub time_budget: Option<Duration>,

    /// Bias the solution toward `guess` when under-constrained.
    pub regularization: bool,
}

impl RefineRequest {
    pub fn new(guess: Pose, target_points: usize) -> Self {
        Self {
            guess,
            target_points,
            time_budget: None,
            regularization: false,
        }
    }

    pub fn with_time_budget(mut self, time_budget: Option<Duration>) -> Self {
        self.time_budget = time_budget;
        self
    }

    pub fn with_regularization(mut self, regularization: bool) -> Self {
        self.regularization = regularization;
        self
    }
}

/// Refines an initial guess to a local optimum.
///
/// The source and destination clouds are bound at construction and reused
/// across calls. Implementations must return within the request's time
/// budget or report `timed_out = true`, and must only return rigid poses.
/// Calls are issued concurrently from worker threads.
pub trait LocalRefiner: Send + Sync {
    /// Refine `request.guess`.
    fn refine(&self, request: &RefineRequest) -> Result<Candidate, RefineError>;

    /// Convergence tolerance ("stop") the refiner declares convergence with.
    fn convergence_tolerance(&self) -> f64;
}

impl<R: LocalRefiner + ?Sized> LocalRefiner for &R {
    fn refine(&self, request: &RefineRequest) -> Result<Candidate, RefineError> {
        (**self).refine(request)
    }

    fn convergence_tolerance(&self) -> f64 {
        (**self).convergence_tolerance()
    }
}

impl<R: LocalRefiner + ?Sized> LocalRefiner for Box<R> {
    fn refine(&self, request: &RefineRequest) -> Result<Candidate, RefineError> {
        (**self).refine(request)
    }

    fn convergence_tolerance(&self) -> f64 {
        (**self).convergence_tolerance()
    }
}
