//! Seed regularization for the ICP refiner.
//!
//! During bulk seeding the optimization is biased toward the supplied guess
//! so that under-constrained problems do not drift arbitrarily far from their
//! seed. The bias is a quadratic penalty on the pose error `E = T · T₀⁻¹`,
//! weighted by the number of correspondences so that it keeps the same
//! relative strength at every sampling resolution.

use nalgebra::{Matrix3, Matrix6, Vector6};

use crate::pose::Pose;

/// Quadratic prior toward a reference pose.
#[derive(Debug, Clone)]
pub struct SeedPrior {
    /// Pose the optimization is pulled toward.
    reference: Pose,

    /// Scale factor of the penalty per correspondence.
    scale_factor: f64,
}

impl SeedPrior {
    pub fn new(reference: Pose, scale_factor: f64) -> Self {
        Self {
            reference,
            scale_factor,
        }
    }

    /// Compute the prior contribution to score, gradient, and Hessian.
    ///
    /// With `E = T · T₀⁻¹ = (R_e, t_e)` and a left perturbation
    /// `T' = exp(ξ) · T`, `ξ = [v; ω]`, the linearized residual is
    /// `[t_e + v − [t_e]× ω; log(R_e) + ω]`.
    ///
    /// # Arguments
    /// * `current_pose` - Current estimate
    /// * `correspondence_count` - Number of correspondences (used as weight)
    ///
    /// # Returns
    /// Tuple of (score_delta, gradient_delta, hessian_delta)
    pub fn compute_derivatives(
        &self,
        current_pose: &Pose,
        correspondence_count: usize,
    ) -> (f64, Vector6<f64>, Matrix6<f64>) {
        let weight = self.scale_factor * correspondence_count as f64;
        if !(weight > 0.0) {
            return (0.0, Vector6::zeros(), Matrix6::zeros());
        }

        let error = current_pose * self.reference.inverse();
        let t_e = error.translation.vector;
        let w_e = error.rotation.scaled_axis();

        let mut residual = Vector6::zeros();
        residual.fixed_rows_mut::<3>(0).copy_from(&t_e);
        residual.fixed_rows_mut::<3>(3).copy_from(&w_e);

        let mut jacobian = Matrix6::identity();
        jacobian
            .fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&(-t_e.cross_matrix()));
        // Rotation block: d log(R_e) / dω ≈ I near the reference.
        jacobian
            .fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&Matrix3::identity());

        let score = 0.5 * weight * residual.norm_squared();
        let gradient = jacobian.transpose() * residual * weight;
        let hessian = jacobian.transpose() * jacobian * weight;

        (score, gradient, hessian)
    }
}
