//! Rigid transform helpers.
//!
//! Poses are `nalgebra::Isometry3<f64>`, so every value is rigid by
//! construction. Poses are never compared for exact equality: use
//! [`mean_displacement`] or [`transformation_diff`].

use nalgebra::{Isometry3, Matrix3, Point3, Translation3, UnitQuaternion, Vector3};

/// Rigid transform (rotation + translation).
pub type Pose = Isometry3<f64>;

/// Rotation composed from three axis-angle rotations, `Rx(rx) · Ry(ry) · Rz(rz)`.
///
/// The X-then-Y-then-Z order is fixed; these rotations do not commute.
pub fn axis_rotation(rx: f64, ry: f64, rz: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_axis_angle(&Vector3::x_axis(), rx)
        * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), ry)
        * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), rz)
}

/// Identity rotation translated to `anchor`.
pub fn anchor_pose(anchor: &Vector3<f64>) -> Pose {
    Isometry3::from_parts(Translation3::from(*anchor), UnitQuaternion::identity())
}

/// Seed transform `destination · rotation · source⁻¹`.
///
/// Rotates the source about its own anchor, then moves that anchor onto the
/// destination anchor.
pub fn seed_pose(destination: &Pose, rotation: &UnitQuaternion<f64>, source: &Pose) -> Pose {
    let rotation = Isometry3::from_parts(Translation3::identity(), *rotation);
    destination * rotation * source.inverse()
}

/// Mean Euclidean displacement of `points` under `relative`.
///
/// Returns infinity for an empty point set so that no comparison against it
/// can succeed.
pub fn mean_displacement(relative: &Pose, points: &[Point3<f64>]) -> f64 {
    if points.is_empty() {
        return f64::INFINITY;
    }
    let sum: f64 = points.iter().map(|p| (relative * p - p).norm()).sum();
    sum / points.len() as f64
}

/// Rotation-weighted distance between two poses.
///
/// With `C = A⁻¹ · B`, returns `w · Σ|I − R_C| + |t_C|` where the sum runs
/// over the nine entries of the rotation block.
pub fn transformation_diff(a: &Pose, b: &Pose, rotation_weight: f64) -> f64 {
    let c = a.inverse() * b;
    let rotation: Matrix3<f64> = *c.rotation.to_rotation_matrix().matrix();
    let r: f64 = (Matrix3::identity() - rotation).iter().map(|v| v.abs()).sum();
    let t = c.translation.vector.norm();
    r * rotation_weight + t
}

/// Check that a pose has finite components.
pub fn is_finite(pose: &Pose) -> bool {
    pose.translation.vector.iter().all(|v| v.is_finite())
        && pose.rotation.coords.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_axis_rotation_order() {
        let q = axis_rotation(FRAC_PI_2, 0.0, FRAC_PI_2);
        // Rx(90°) · Rz(90°) applied to x̂: Rz maps x̂ to ŷ, Rx maps ŷ to ẑ.
        let v = q * Vector3::x();
        assert_relative_eq!(v, Vector3::z(), epsilon = 1e-12);

        let swapped = axis_rotation(0.0, 0.0, FRAC_PI_2) * axis_rotation(FRAC_PI_2, 0.0, 0.0);
        let w = swapped * Vector3::x();
        assert_relative_eq!(w, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_seed_pose_maps_anchor() {
        let source = anchor_pose(&Vector3::new(1.0, 2.0, 3.0));
        let destination = anchor_pose(&Vector3::new(-4.0, 0.5, 7.0));
        let rotation = axis_rotation(0.3, -0.2, 1.1);

        let seed = seed_pose(&destination, &rotation, &source);
        let mapped = seed * Point3::new(1.0, 2.0, 3.0);
        assert_relative_eq!(mapped, Point3::new(-4.0, 0.5, 7.0), epsilon = 1e-12);

        // Offsets from the source anchor are rotated.
        let offset = seed * Point3::new(2.0, 2.0, 3.0) - mapped;
        assert_relative_eq!(offset, rotation * Vector3::x(), epsilon = 1e-12);
    }

    #[test]
    fn test_mean_displacement() {
        let points = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        let shift = Isometry3::translation(0.0, 0.0, 2.0);
        assert_relative_eq!(mean_displacement(&shift, &points), 2.0);
        assert_relative_eq!(mean_displacement(&Pose::identity(), &points), 0.0);
        assert!(mean_displacement(&shift, &[]).is_infinite());
    }

    #[test]
    fn test_transformation_diff() {
        let a = Pose::identity();
        assert_relative_eq!(transformation_diff(&a, &a, 10.0), 0.0, epsilon = 1e-12);

        let b = Isometry3::translation(3.0, 4.0, 0.0);
        assert_relative_eq!(transformation_diff(&a, &b, 10.0), 5.0, epsilon = 1e-12);

        let c = Isometry3::rotation(Vector3::z() * FRAC_PI_2);
        // I - Rz(90°) has four unit entries.
        assert_relative_eq!(transformation_diff(&a, &c, 1.0), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_is_finite() {
        assert!(is_finite(&Pose::identity()));
        assert!(!is_finite(&Isometry3::translation(f64::NAN, 0.0, 0.0)));
    }
}
