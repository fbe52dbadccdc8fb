//! Point-to-point ICP refiner.
//!
//! Each iteration:
//! 1. Transform the source subsample with the current pose
//! 2. Pair every point with its nearest destination point (KD-tree)
//! 3. Build the Gauss-Newton system over correspondences within range
//! 4. Add the seed prior when regularization is requested
//! 5. Solve for a left-multiplicative update `T ← exp(ξ) · T`
//! 6. Stop once the mean point motion falls below `stop × convergence_ratio`
//!
//! The score is the mean nearest-neighbour distance, each distance truncated
//! at the correspondence range, so it is defined for every pose and is
//! comparable across calls at the same sampling resolution.

use std::time::Instant;

use nalgebra::{Isometry3, Matrix3x6, Matrix6, Point3, Vector3, Vector6};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::newton::newton_step_regularized;
use super::prior::SeedPrior;
use super::search::PointSearch;
use super::{LocalRefiner, RefineRequest};
use crate::candidate::Candidate;
use crate::cloud::CloudSample;
use crate::error::{CloudRole, RefineError};
use crate::pose::{is_finite, mean_displacement, Pose};

/// Configuration for the ICP refiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConfig {
    /// Maximum number of Gauss-Newton iterations per call.
    pub max_iterations: usize,

    /// Correspondences farther apart than this are ignored, and score
    /// contributions are truncated to it.
    pub max_correspondence_distance: f64,

    /// Convergence tolerance, echoed into every returned candidate.
    pub stop: f64,

    /// Iteration stops when the mean point motion is below
    /// `stop × convergence_ratio`.
    pub convergence_ratio: f64,

    /// Per-correspondence weight of the seed prior.
    pub regularization_scale: f64,

    /// Levenberg-Marquardt damping added to the Hessian diagonal.
    pub hessian_damping: f64,

    /// Tolerance for the SVD pseudo-inverse.
    pub svd_tolerance: f64,

    /// Minimum number of correspondences to take a step.
    pub min_correspondences: usize,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            max_correspondence_distance: 1.0,
            stop: 0.01,
            convergence_ratio: 0.1,
            regularization_scale: 0.01,
            hessian_damping: 1e-6,
            svd_tolerance: 1e-10,
            min_correspondences: 6,
        }
    }
}

/// Why an ICP call stopped iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Converged,
    MaxIterations,
    TimedOut,
    FewCorrespondences,
    SingularHessian,
}

/// Linearized alignment problem at one pose.
struct LinearSystem {
    /// Truncated mean nearest-neighbour distance.
    score: f64,
    gradient: Vector6<f64>,
    hessian: Matrix6<f64>,
    correspondences: usize,
}

/// ICP backend for [`LocalRefiner`].
#[derive(Debug)]
pub struct IcpRefiner {
    source: CloudSample,
    search: PointSearch,
    config: IcpConfig,
}

impl IcpRefiner {
    /// Bind a source and destination cloud.
    ///
    /// # Errors
    /// `EmptyCloud` if either cloud has no points, `Degenerate` if the
    /// destination has no finite point.
    pub fn new(
        source: CloudSample,
        destination: &CloudSample,
        config: IcpConfig,
    ) -> Result<Self, RefineError> {
        if source.is_empty() {
            return Err(RefineError::EmptyCloud {
                which: CloudRole::Source,
            });
        }
        if destination.is_empty() {
            return Err(RefineError::EmptyCloud {
                which: CloudRole::Destination,
            });
        }

        let points: Vec<[f32; 3]> = destination.iter().collect();
        let search = PointSearch::from_points(&points).ok_or_else(|| {
            RefineError::Degenerate("destination cloud has no finite points".to_string())
        })?;

        Ok(Self {
            source,
            search,
            config,
        })
    }

    /// Create a refiner with default configuration.
    pub fn with_defaults(
        source: CloudSample,
        destination: &CloudSample,
    ) -> Result<Self, RefineError> {
        Self::new(source, destination, IcpConfig::default())
    }

    /// Get the configuration.
    pub fn config(&self) -> &IcpConfig {
        &self.config
    }

    /// Bound source cloud.
    pub fn source(&self) -> &CloudSample {
        &self.source
    }

    /// Score of `pose` on a source subsample of about `target_points` points.
    pub fn score_pose(&self, pose: &Pose, target_points: usize) -> f64 {
        let points = self.sample(target_points);
        self.evaluate(&points, pose)
    }

    /// Finite source points at the stride for `target_points`.
    fn sample(&self, target_points: usize) -> Vec<Point3<f64>> {
        let mut points = self.source.subsample(target_points);
        points.retain(|p| p.coords.iter().all(|v| v.is_finite()));
        points
    }

    /// Truncated mean nearest-neighbour distance of `pose · points`.
    fn evaluate(&self, points: &[Point3<f64>], pose: &Pose) -> f64 {
        if points.is_empty() {
            return f64::INFINITY;
        }
        let max_distance = self.config.max_correspondence_distance;
        let sum: f64 = points
            .iter()
            .map(|p| {
                let x = pose * p;
                let (_, dist_sq) = self.search.nearest(&[x.x as f32, x.y as f32, x.z as f32]);
                (dist_sq as f64).sqrt().min(max_distance)
            })
            .sum();
        sum / points.len() as f64
    }

    /// Build the Gauss-Newton system for `pose · points`.
    ///
    /// Residual `r = T·p − q`; with `x = T·p` the Jacobian under a left
    /// perturbation is `J = [I, −[x]×]`.
    fn linearize(&self, points: &[Point3<f64>], pose: &Pose) -> LinearSystem {
        let max_distance = self.config.max_correspondence_distance;
        let max_distance_sq = max_distance * max_distance;

        let mut gradient = Vector6::zeros();
        let mut hessian = Matrix6::zeros();
        let mut correspondences = 0;
        let mut score_sum = 0.0;

        let mut jacobian = Matrix3x6::zeros();
        jacobian.fixed_view_mut::<3, 3>(0, 0).fill_with_identity();

        for p in points {
            let x = pose * p;
            let (nearest, dist_sq) = self.search.nearest(&[x.x as f32, x.y as f32, x.z as f32]);
            let dist_sq = dist_sq as f64;
            score_sum += dist_sq.sqrt().min(max_distance);
            if dist_sq > max_distance_sq {
                continue;
            }

            let q = Vector3::new(nearest[0] as f64, nearest[1] as f64, nearest[2] as f64);
            let residual = x.coords - q;
            jacobian
                .fixed_view_mut::<3, 3>(0, 3)
                .copy_from(&(-x.coords.cross_matrix()));

            let jt = jacobian.transpose();
            gradient += jt * residual;
            hessian += jt * jacobian;
            correspondences += 1;
        }

        let score = if points.is_empty() {
            f64::INFINITY
        } else {
            score_sum / points.len() as f64
        };

        LinearSystem {
            score,
            gradient,
            hessian,
            correspondences,
        }
    }
}

impl LocalRefiner for IcpRefiner {
    fn refine(&self, request: &RefineRequest) -> Result<Candidate, RefineError> {
        let start = Instant::now();

        if !is_finite(&request.guess) {
            return Err(RefineError::Degenerate(
                "initial guess has non-finite components".to_string(),
            ));
        }

        let points = self.sample(request.target_points);
        let prior = request
            .regularization
            .then(|| SeedPrior::new(request.guess, self.config.regularization_scale));
        let motion_threshold = self.config.stop * self.config.convergence_ratio;

        let mut pose = request.guess;
        let mut best_pose = pose;
        let mut best_score = f64::INFINITY;
        let mut termination = Termination::MaxIterations;
        let mut iterations = 0;
        let mut prior_energy = 0.0;

        for iteration in 0..self.config.max_iterations {
            if let Some(budget) = request.time_budget {
                if start.elapsed() >= budget {
                    termination = Termination::TimedOut;
                    break;
                }
            }

            let system = self.linearize(&points, &pose);
            if system.score < best_score {
                best_score = system.score;
                best_pose = pose;
            }

            if system.correspondences < self.config.min_correspondences {
                if iteration == 0 && system.correspondences == 0 {
                    return Err(RefineError::NoCorrespondences {
                        max_distance: self.config.max_correspondence_distance,
                    });
                }
                termination = Termination::FewCorrespondences;
                break;
            }

            let mut gradient = system.gradient;
            let mut hessian = system.hessian;
            if let Some(prior) = &prior {
                let (energy, prior_gradient, prior_hessian) =
                    prior.compute_derivatives(&pose, system.correspondences);
                prior_energy = energy;
                gradient += prior_gradient;
                hessian += prior_hessian;
            }

            let Some(delta) = newton_step_regularized(
                &gradient,
                &hessian,
                self.config.hessian_damping,
                self.config.svd_tolerance,
            ) else {
                termination = Termination::SingularHessian;
                break;
            };

            let step = Isometry3::new(
                Vector3::new(delta[0], delta[1], delta[2]),
                Vector3::new(delta[3], delta[4], delta[5]),
            );
            let next = step * pose;
            let motion = mean_displacement(&(pose.inverse() * next), &points);
            pose = next;
            iterations = iteration + 1;

            if motion < motion_threshold {
                termination = Termination::Converged;
                break;
            }
        }

        // The last update has not been scored yet.
        let final_score = self.evaluate(&points, &pose);
        if final_score < best_score {
            best_score = final_score;
            best_pose = pose;
        }

        trace!(
            iterations,
            ?termination,
            score = best_score,
            prior_energy,
            points = points.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "ICP refinement finished"
        );

        Ok(Candidate {
            guess: best_pose,
            score: best_score,
            convergence_tolerance: self.config.stop,
            timed_out: termination == Termination::TimedOut,
        })
    }

    fn convergence_tolerance(&self) -> f64 {
        self.config.stop
    }
}
