//! Multi-start global point cloud registration.
//!
//! This library finds rigid transforms that align a source point cloud to a
//! destination point cloud without an initial guess. It enumerates a grid of
//! rotation seeds around the clouds' anchor points, refines each seed with a
//! pluggable local refiner, and narrows the candidates over a ladder of
//! increasing resolutions.
//!
//! # Architecture
//!
//! The search is split into phases:
//! - Phase 1: Anchor estimation (mean, median or sphere fit) and seed grid
//! - Phase 2: Bulk refinement of every seed at low resolution
//! - Phase 3: Resolution ladder with duplicate removal
//! - Phase 4: Ranking, truncation and an optional debug pass
//!
//! # Usage
//!
//! ```ignore
//! use random_registration::{CloudSample, GlobalRegistrationSearch, IcpRefiner, SearchConfig};
//!
//! let source = CloudSample::new(load_scan("source.pcd"));
//! let destination = CloudSample::new(load_scan("destination.pcd"));
//!
//! // Local refiner bound to both clouds
//! let refiner = IcpRefiner::with_defaults(source.clone(), &destination)?;
//!
//! // 4 × 4 × 4 rotation seeds
//! let search = GlobalRegistrationSearch::new(SearchConfig::with_steps(4))?;
//! let result = search.register(&refiner, &source, &destination)?;
//!
//! for candidate in result.candidates.iter().take(3) {
//!     println!("score {:.4}: {}", candidate.score, candidate.pose);
//! }
//! ```

pub mod candidate;
pub mod centroid;
pub mod cloud;
pub mod config;
pub mod error;
pub mod pose;
pub mod refiner;
pub mod search;
pub mod test_utils;
pub mod timing;
pub mod visualization;

pub use candidate::{Candidate, CandidateSet};
pub use centroid::{estimate_anchor, fit_sphere, CentroidStrategy, SphereFit};
pub use cloud::CloudSample;
pub use config::{AxisSampling, SearchConfig, SearchConfigBuilder, DEFAULT_ROTATION_STEPS};
pub use error::{CloudRole, RefineError};
pub use pose::Pose;
pub use refiner::{IcpConfig, IcpRefiner, LocalRefiner, RefineRequest};
pub use timing::{RefineClock, RefineOutcome, RefineTiming};
pub use visualization::{CollectingSink, NoopSink, TracingSink, VisualizationSink};

// High-level API (recommended for most users)
pub use search::{
    GlobalRegistrationSearch, RankedCandidate, RoundStats, SearchResult, SearchStats, Seed,
};
