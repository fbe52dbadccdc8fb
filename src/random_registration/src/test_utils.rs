//! Test utilities.
//!
//! Synthetic point cloud generators and ground-truth helpers for testing the
//! registration search with known transforms.

use nalgebra::{Point3, Vector3};

use crate::pose::Pose;

/// Deterministic uniform generator over `[0, 1)`.
///
/// 64-bit LCG; the top 53 bits of the state form the mantissa.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        ((self.state >> 11) as f64) / ((1u64 << 53) as f64)
    }

    /// Next value in `[-1, 1)`.
    pub fn next_signed(&mut self) -> f64 {
        self.next_f64() * 2.0 - 1.0
    }
}

/// Generate a box corner: three orthogonal rectangular faces meeting at the origin.
///
/// - XY face: z=0, x∈[0,lx], y∈[0,ly]
/// - YZ face: x=0, y∈[0,ly], z∈[0,lz]
/// - ZX face: y=0, x∈[0,lx], z∈[0,lz]
///
/// With unequal side lengths the corner has no rotational symmetry, so a
/// registration against a moved copy has a single correct answer.
///
/// # Arguments
/// * `lengths` - Side lengths `[lx, ly, lz]`
/// * `interval` - Grid spacing between points
pub fn make_box_corner_pcd(lengths: [f32; 3], interval: f32) -> Vec<[f32; 3]> {
    let steps = lengths.map(|l| ((l / interval).round() as usize) + 1);
    let [nx, ny, nz] = steps;

    let mut points = Vec::with_capacity(nx * ny + ny * nz + nx * nz);

    // XY face (z=0)
    for i in 0..nx {
        for j in 0..ny {
            points.push([interval * i as f32, interval * j as f32, 0.0]);
        }
    }

    // YZ face (x=0)
    for j in 0..ny {
        for k in 0..nz {
            points.push([0.0, interval * j as f32, interval * k as f32]);
        }
    }

    // ZX face (y=0)
    for i in 0..nx {
        for k in 0..nz {
            points.push([interval * i as f32, 0.0, interval * k as f32]);
        }
    }

    points
}

/// Box corner rotated off the coordinate axes.
///
/// Axis-aligned planar clouds put hundreds of points on one coordinate value,
/// which overflows KD-tree buckets. The fixed tilt avoids that.
pub fn make_tilted_box_corner_pcd(lengths: [f32; 3], interval: f32) -> Vec<[f32; 3]> {
    transform_points(&make_box_corner_pcd(lengths, interval), &box_tilt())
}

/// Random points on the three faces of a box corner, with the same tilt as
/// [`make_tilted_box_corner_pcd`].
///
/// Faces are picked with probability proportional to their area. The samples
/// have no lattice spacing, so nearest-neighbour matching against a moved
/// copy cannot lock onto a shifted grid row.
pub fn make_random_box_corner_pcd(
    lengths: [f32; 3],
    num_points: usize,
    seed: u64,
) -> Vec<[f32; 3]> {
    let [lx, ly, lz] = lengths.map(f64::from);
    let xy = lx * ly;
    let yz = ly * lz;
    let total = xy + yz + lx * lz;

    let mut rng = Lcg::new(seed);
    let points: Vec<[f32; 3]> = (0..num_points)
        .map(|_| {
            let pick = rng.next_f64() * total;
            let u = rng.next_f64();
            let v = rng.next_f64();
            if pick < xy {
                [(u * lx) as f32, (v * ly) as f32, 0.0]
            } else if pick < xy + yz {
                [0.0, (u * ly) as f32, (v * lz) as f32]
            } else {
                [(u * lx) as f32, 0.0, (v * lz) as f32]
            }
        })
        .collect();

    transform_points(&points, &box_tilt())
}

/// Fixed rotation that takes the box corner faces off the coordinate planes.
fn box_tilt() -> Pose {
    Pose::new(Vector3::zeros(), Vector3::new(0.3, -0.2, 0.4))
}

/// Generate points on a sphere surface.
///
/// Directions are drawn uniformly by rejection sampling in the unit cube.
///
/// # Arguments
/// * `center` - Center of the sphere
/// * `radius` - Radius of the sphere
/// * `num_points` - Number of points to generate
/// * `seed` - Random seed for reproducibility
/// * `upper_hemisphere` - Only keep points with z ≥ center z
pub fn make_sphere_surface(
    center: [f32; 3],
    radius: f32,
    num_points: usize,
    seed: u64,
    upper_hemisphere: bool,
) -> Vec<[f32; 3]> {
    let mut rng = Lcg::new(seed);
    let mut points = Vec::with_capacity(num_points);

    while points.len() < num_points {
        let u = rng.next_signed();
        let v = rng.next_signed();
        let mut w = rng.next_signed();

        let r2 = u * u + v * v + w * w;
        if r2 > 1.0 || r2 <= 1e-6 {
            continue;
        }
        if upper_hemisphere && w < 0.0 {
            w = -w;
        }

        let scale = radius as f64 / r2.sqrt();
        points.push([
            center[0] + (u * scale) as f32,
            center[1] + (v * scale) as f32,
            center[2] + (w * scale) as f32,
        ]);
    }

    points
}

/// Generate an isotropic cloud of points scattered around `center`.
///
/// Each coordinate is the sum of three uniform draws in `[-spread, spread)`,
/// a cheap bell-shaped distribution.
pub fn make_random_blob(
    center: [f32; 3],
    spread: f32,
    num_points: usize,
    seed: u64,
) -> Vec<[f32; 3]> {
    let mut rng = Lcg::new(seed);
    let mut draw = || -> f32 {
        let sum = rng.next_signed() + rng.next_signed() + rng.next_signed();
        (sum / 3.0) as f32 * spread
    };

    (0..num_points)
        .map(|_| {
            [
                center[0] + draw(),
                center[1] + draw(),
                center[2] + draw(),
            ]
        })
        .collect()
}

/// Transform a point cloud by a pose.
pub fn transform_points(points: &[[f32; 3]], pose: &Pose) -> Vec<[f32; 3]> {
    points
        .iter()
        .map(|p| {
            let q = pose * Point3::new(p[0] as f64, p[1] as f64, p[2] as f64);
            [q.x as f32, q.y as f32, q.z as f32]
        })
        .collect()
}

/// Mean distance between `pose · a[i]` and `b[i]`, pairing points by index.
///
/// Only meaningful when `b` is a transformed copy of `a`.
pub fn mean_point_distance(pose: &Pose, a: &[[f32; 3]], b: &[[f32; 3]]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(p, q)| {
            let moved = pose * Point3::new(p[0] as f64, p[1] as f64, p[2] as f64);
            (moved - Point3::new(q[0] as f64, q[1] as f64, q[2] as f64)).norm()
        })
        .sum();
    sum / n as f64
}

/// Compute bounds of a point cloud.
pub fn compute_bounds(points: &[[f32; 3]]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];

    for p in points {
        for i in 0..3 {
            min[i] = min[i].min(p[i]);
            max[i] = max[i].max(p[i]);
        }
    }

    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Vector3};

    #[test]
    fn test_lcg_covers_unit_interval() {
        let mut rng = Lcg::new(42);
        let values: Vec<f64> = (0..10_000).map(|_| rng.next_f64()).collect();
        let max = values.iter().cloned().fold(f64::MIN, f64::max);
        let min = values.iter().cloned().fold(f64::MAX, f64::min);
        let mean = values.iter().sum::<f64>() / values.len() as f64;

        assert!(min >= 0.0 && max < 1.0);
        assert!(max > 0.99 && min < 0.01);
        assert!((mean - 0.5).abs() < 0.02, "mean = {mean}");
    }

    #[test]
    fn test_box_corner_point_count() {
        let pcd = make_box_corner_pcd([2.0, 1.2, 0.6], 0.1);
        // 21×13 + 13×7 + 21×7
        assert_eq!(pcd.len(), 273 + 91 + 147);

        let (min, max) = compute_bounds(&pcd);
        assert_relative_eq!(max[0], 2.0, epsilon = 1e-5);
        assert_relative_eq!(max[1], 1.2, epsilon = 1e-5);
        assert_relative_eq!(max[2], 0.6, epsilon = 1e-5);
        assert_eq!(min, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_random_box_corner_on_faces() {
        let lengths = [2.0, 1.2, 0.6];
        let pcd = make_random_box_corner_pcd(lengths, 800, 7);
        assert_eq!(pcd.len(), 800);
        assert_eq!(pcd, make_random_box_corner_pcd(lengths, 800, 7));

        // Undo the tilt: every point lies on one face, inside the box.
        let untilted = transform_points(&pcd, &box_tilt().inverse());
        let mut on_face = [0usize; 3];
        for p in &untilted {
            for axis in 0..3 {
                assert!(p[axis] > -1e-4 && p[axis] < lengths[axis] + 1e-4);
            }
            let face = (0..3)
                .min_by(|&a, &b| p[a].abs().total_cmp(&p[b].abs()))
                .unwrap();
            assert!(p[face].abs() < 1e-4);
            on_face[face] += 1;
        }
        // The XY face (z = 0) has the largest area.
        assert!(on_face[2] > on_face[0] && on_face[2] > on_face[1]);
    }

    #[test]
    fn test_sphere_surface_radius() {
        let center = [1.0, -2.0, 0.5];
        let pcd = make_sphere_surface(center, 2.0, 500, 3, false);
        assert_eq!(pcd.len(), 500);
        for p in &pcd {
            let d = ((p[0] - center[0]).powi(2) + (p[1] - center[1]).powi(2)
                + (p[2] - center[2]).powi(2))
            .sqrt();
            assert_relative_eq!(d, 2.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_sphere_surface_hemisphere() {
        let pcd = make_sphere_surface([0.0, 0.0, 0.0], 1.0, 200, 11, true);
        assert!(pcd.iter().all(|p| p[2] >= 0.0));
    }

    #[test]
    fn test_random_blob_deterministic() {
        let a = make_random_blob([5.0, 5.0, 5.0], 1.0, 100, 9);
        let b = make_random_blob([5.0, 5.0, 5.0], 1.0, 100, 9);
        assert_eq!(a, b);

        let (min, max) = compute_bounds(&a);
        for i in 0..3 {
            assert!(min[i] >= 4.0 && max[i] <= 6.0);
        }
    }

    #[test]
    fn test_transform_and_distance() {
        let pcd = make_box_corner_pcd([1.0, 0.5, 0.3], 0.1);
        let pose = Isometry3::new(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.2));
        let moved = transform_points(&pcd, &pose);

        assert_relative_eq!(mean_point_distance(&pose, &pcd, &moved), 0.0, epsilon = 1e-5);
        assert!(mean_point_distance(&Pose::identity(), &pcd, &moved) > 0.5);
    }
}
