//! Error types for the local refinement boundary.

use thiserror::Error;

/// Which of the two bound clouds an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudRole {
    Source,
    Destination,
}

impl std::fmt::Display for CloudRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudRole::Source => write!(f, "source"),
            CloudRole::Destination => write!(f, "destination"),
        }
    }
}

/// Errors reported by a [`LocalRefiner`](crate::refiner::LocalRefiner).
///
/// The search never propagates these: a failed refinement is recorded as a
/// timed-out candidate with an infinite score.
#[derive(Error, Debug)]
pub enum RefineError {
    #[error("{which} point cloud is empty")]
    EmptyCloud { which: CloudRole },

    #[error("no correspondences within {max_distance} of the transformed source")]
    NoCorrespondences { max_distance: f64 },

    #[error("degenerate refinement input: {0}")]
    Degenerate(String),
}
