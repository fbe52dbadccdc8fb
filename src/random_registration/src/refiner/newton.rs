//! Gauss-Newton step computation for the ICP refiner.
//!
//! The step solves: Δξ = -H⁻¹g
//! where H = ΣJᵀJ and g = ΣJᵀr over all correspondences.
//!
//! We use SVD for numerical stability when H is near-singular, which
//! happens for planar or linear point sets.

use nalgebra::{Matrix6, Vector6};

/// Compute the Gauss-Newton step using SVD decomposition.
///
/// # Arguments
/// * `gradient` - Gradient of the residual (6x1)
/// * `hessian` - Approximate Hessian (6x6)
/// * `tolerance` - Singular value tolerance for pseudo-inverse
///
/// # Returns
/// The step vector `[v; ω]`, or None if the Hessian is effectively zero.
pub fn newton_step(
    gradient: &Vector6<f64>,
    hessian: &Matrix6<f64>,
    tolerance: f64,
) -> Option<Vector6<f64>> {
    // SVD iterates without a cap; non-finite input must not reach it.
    if !hessian.iter().chain(gradient.iter()).all(|v| v.is_finite()) {
        return None;
    }

    let svd = hessian.svd(true, true);

    let max_sv = svd.singular_values.max();
    if !(max_sv >= tolerance) {
        return None;
    }

    let neg_gradient = -gradient;
    svd.solve(&neg_gradient, tolerance).ok()
}

/// Compute the step with Levenberg-Marquardt damping: Δξ = -(H + λI)⁻¹g.
pub fn newton_step_regularized(
    gradient: &Vector6<f64>,
    hessian: &Matrix6<f64>,
    damping: f64,
    tolerance: f64,
) -> Option<Vector6<f64>> {
    let damped_hessian = hessian + Matrix6::identity() * damping;
    newton_step(gradient, &damped_hessian, tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_newton_step_identity() {
        // For H = I, delta = -g
        let gradient = Vector6::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0);
        let delta = newton_step(&gradient, &Matrix6::identity(), 1e-10).unwrap();

        for i in 0..6 {
            assert_relative_eq!(delta[i], -gradient[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_newton_step_scaled() {
        // For H = 2I, delta = -g/2
        let gradient = Vector6::new(2.0, 4.0, 6.0, 8.0, 10.0, 12.0);
        let delta = newton_step(&gradient, &(Matrix6::identity() * 2.0), 1e-10).unwrap();

        for i in 0..6 {
            assert_relative_eq!(delta[i], -gradient[i] / 2.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_newton_step_singular_hessian() {
        let gradient = Vector6::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0);
        assert!(newton_step(&gradient, &Matrix6::zeros(), 1e-10).is_none());
    }

    #[test]
    fn test_newton_step_nan_hessian() {
        let gradient = Vector6::zeros();
        let hessian = Matrix6::from_element(f64::NAN);
        assert!(newton_step(&gradient, &hessian, 1e-10).is_none());
    }

    #[test]
    fn test_newton_step_regularized_rank_deficient() {
        // Rotation about z unconstrained: the damped step stays finite.
        let gradient = Vector6::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.5);
        let mut hessian = Matrix6::identity();
        hessian[(5, 5)] = 0.0;

        let delta = newton_step_regularized(&gradient, &hessian, 1e-3, 1e-10).unwrap();
        assert!(delta.iter().all(|v| v.is_finite()));
        assert_relative_eq!(delta[0], -1.0 / 1.001, epsilon = 1e-9);
        assert_relative_eq!(delta[5], -0.5 / 1e-3, epsilon = 1e-6);
    }
}
