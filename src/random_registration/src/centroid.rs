//! Anchor point estimation for seed generation.
//!
//! Each cloud gets an anchor pose (identity rotation, translated to the
//! anchor point). Rotation seeds are generated about these anchors.
//!
//! Three strategies are available:
//! - `Mean`: arithmetic centroid.
//! - `Median`: per-axis median. The result need not be a point of the cloud;
//!   it is an outlier-robust anchor, not a representative point.
//! - `SphereFit`: center of a sphere fitted by minimizing
//!   `Σ |r − ‖pᵢ − c‖|^p` over center `c` and radius `r`, started at the mean.

use nalgebra::{Point3, Vector3, Vector4};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::cloud::{to_point, CloudSample};
use crate::pose::{anchor_pose, Pose};

/// Finite-difference step for the sphere-fit gradient.
const GRADIENT_STEP: f64 = 1e-5;

/// Initial increment of the radius-only search.
const RADIUS_STEP_START: f64 = 0.01;

/// Radius-only search stops once its increment falls below this.
const RADIUS_STEP_MIN: f64 = 1e-4;

/// Initial step of the gradient line search.
const LINE_STEP_START: f64 = 1e-3;

/// Line search stops once its step falls below this.
const LINE_STEP_MIN: f64 = 1e-8;

/// Maximum gradient rounds.
const MAX_ROUNDS: usize = 1000;

/// A round improving the objective by less than this ratio ends the fit.
const MIN_IMPROVEMENT_RATIO: f64 = 0.999;

/// Cap on consecutive accepted steps at one step size.
const MAX_ACCEPTED_STEPS: usize = 100_000;

/// Strategy used to compute a cloud's anchor point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CentroidStrategy {
    /// Arithmetic mean of all points.
    #[default]
    Mean,

    /// Per-axis median, each axis sorted independently.
    Median,

    /// Center of a power-`p` sphere fit started from the mean.
    SphereFit {
        /// Exponent of the residual objective (1.0 by default).
        power: f64,
    },
}

impl CentroidStrategy {
    /// Sphere fit with the default exponent of 1.
    pub fn sphere_fit() -> Self {
        CentroidStrategy::SphereFit { power: 1.0 }
    }
}

/// Result of a sphere fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereFit {
    /// Fitted center.
    pub center: Vector3<f64>,

    /// Fitted radius. Not used by the anchor pose.
    pub radius: f64,

    /// Final value of the residual objective.
    pub residual: f64,
}

/// Compute the anchor pose of a cloud.
///
/// The returned pose has identity rotation and the anchor point as
/// translation. An empty cloud anchors at the origin.
pub fn estimate_anchor(cloud: &CloudSample, strategy: CentroidStrategy) -> Pose {
    anchor_pose(&estimate_anchor_point(cloud, strategy))
}

/// Compute the anchor point of a cloud.
pub fn estimate_anchor_point(cloud: &CloudSample, strategy: CentroidStrategy) -> Vector3<f64> {
    if cloud.is_empty() {
        warn!("Anchor requested for an empty cloud, using the origin");
        return Vector3::zeros();
    }

    match strategy {
        CentroidStrategy::Mean => mean_point(cloud),
        CentroidStrategy::Median => median_point(cloud),
        CentroidStrategy::SphereFit { power } => fit_sphere(cloud, power).center,
    }
}

/// Arithmetic centroid. The cloud must not be empty.
fn mean_point(cloud: &CloudSample) -> Vector3<f64> {
    cloud.mean().unwrap_or_else(Vector3::zeros)
}

/// Per-axis median using the element at index `n / 2` of each sorted axis.
fn median_point(cloud: &CloudSample) -> Vector3<f64> {
    let mut xs = Vec::with_capacity(cloud.len());
    let mut ys = Vec::with_capacity(cloud.len());
    let mut zs = Vec::with_capacity(cloud.len());
    for p in cloud.iter() {
        xs.push(p[0] as f64);
        ys.push(p[1] as f64);
        zs.push(p[2] as f64);
    }

    let mid = xs.len() / 2;
    Vector3::new(
        select_median(&mut xs, mid),
        select_median(&mut ys, mid),
        select_median(&mut zs, mid),
    )
}

fn select_median(values: &mut [f64], mid: usize) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    values[mid]
}

/// Fit a sphere to the cloud, starting from its mean with radius zero.
///
/// The radius is first grown alone in fixed increments while the objective
/// improves, halving the increment down to 1e-4. Then up to 1000 rounds of a
/// 4-D numerical gradient step over (x, y, z, r) run, each with a line search
/// whose step starts at 1e-3 and shrinks ×0.1 down to 1e-8, greedily
/// accepting every improving step. A round that improves the objective by
/// less than 0.1% ends the fit.
///
/// Only a locally improved fit is guaranteed; the iteration caps bound the
/// run time regardless of convergence.
pub fn fit_sphere(cloud: &CloudSample, power: f64) -> SphereFit {
    let points: Vec<Point3<f64>> = cloud.iter().map(to_point).collect();
    let center = mean_point(cloud);
    let mut state = Vector4::new(center.x, center.y, center.z, 0.0);
    let mut score = sphere_objective(&points, power, &state);

    // Radius alone, growing from zero.
    let mut step = RADIUS_STEP_START;
    while step > RADIUS_STEP_MIN {
        let mut accepted = 0;
        loop {
            let mut next = state;
            next.w += step;
            let next_score = sphere_objective(&points, power, &next);
            if !(next_score < score) || accepted >= MAX_ACCEPTED_STEPS {
                break;
            }
            state = next;
            score = next_score;
            accepted += 1;
        }
        step *= 0.5;
    }

    for round in 0..MAX_ROUNDS {
        let score_start = score;
        let direction = -numerical_gradient(&points, power, &state);

        let mut step = LINE_STEP_START;
        while step > LINE_STEP_MIN {
            let mut accepted = 0;
            loop {
                let next = state + direction * step;
                let next_score = sphere_objective(&points, power, &next);
                if !(next_score < score) || accepted >= MAX_ACCEPTED_STEPS {
                    break;
                }
                state = next;
                score = next_score;
                accepted += 1;
            }
            step *= 0.1;
        }

        if !(score_start > 0.0) || score / score_start > MIN_IMPROVEMENT_RATIO {
            trace!(round, score, "Sphere fit converged");
            break;
        }
    }

    SphereFit {
        center: state.xyz(),
        radius: state.w,
        residual: score,
    }
}

/// `Σ |r − ‖pᵢ − c‖|^p` for `state = (cx, cy, cz, r)`.
fn sphere_objective(points: &[Point3<f64>], power: f64, state: &Vector4<f64>) -> f64 {
    let center = Point3::new(state.x, state.y, state.z);
    points
        .iter()
        .map(|p| (state.w - (p - center).norm()).abs().powf(power))
        .sum()
}

/// Central-difference gradient of the sphere objective.
fn numerical_gradient(points: &[Point3<f64>], power: f64, state: &Vector4<f64>) -> Vector4<f64> {
    let mut gradient = Vector4::zeros();
    for axis in 0..4 {
        let mut forward = *state;
        let mut backward = *state;
        forward[axis] += GRADIENT_STEP;
        backward[axis] -= GRADIENT_STEP;
        gradient[axis] = (sphere_objective(points, power, &forward)
            - sphere_objective(points, power, &backward))
            / (2.0 * GRADIENT_STEP);
    }
    gradient
}
