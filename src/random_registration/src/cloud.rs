//! Immutable, shared point cloud samples.
//!
//! A [`CloudSample`] is a reference-counted buffer of 3-D points plus an
//! optional downsampling stride. Cloning a sample never copies points, so the
//! search, the refiner and every candidate comparison can hold the same cloud.

use std::sync::Arc;

use nalgebra::{Isometry3, Point3, Vector3};

/// Read-only 3-D point set.
#[derive(Debug, Clone)]
pub struct CloudSample {
    /// Shared point buffer, never mutated after construction.
    points: Arc<[[f32; 3]]>,

    /// Downsampling stride applied to indexed access (1 = every point).
    stride: usize,
}

impl CloudSample {
    /// Create a sample that owns the given points.
    pub fn new(points: Vec<[f32; 3]>) -> Self {
        Self {
            points: points.into(),
            stride: 1,
        }
    }

    /// Create a sample by copying points from a slice.
    pub fn from_slice(points: &[[f32; 3]]) -> Self {
        Self::new(points.to_vec())
    }

    /// Return a view of the same buffer that only exposes every `stride`-th point.
    ///
    /// A stride of zero is treated as one.
    pub fn with_stride(&self, stride: usize) -> Self {
        Self {
            points: Arc::clone(&self.points),
            stride: stride.max(1),
        }
    }

    /// Downsampling stride of this view.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of points visible through this view.
    pub fn len(&self) -> usize {
        self.points.len().div_ceil(self.stride)
    }

    /// Check whether the view exposes no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of points in the underlying buffer, ignoring the stride.
    pub fn raw_len(&self) -> usize {
        self.points.len()
    }

    /// Indexed access through the view.
    pub fn get(&self, index: usize) -> Option<[f32; 3]> {
        self.points.get(index * self.stride).copied()
    }

    /// Indexed access as a double precision point.
    pub fn point(&self, index: usize) -> Option<Point3<f64>> {
        self.get(index).map(to_point)
    }

    /// Iterate over the visible points.
    pub fn iter(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        self.points.iter().step_by(self.stride).copied()
    }

    /// Underlying buffer, ignoring the stride.
    pub fn raw_points(&self) -> &[[f32; 3]] {
        &self.points
    }

    /// Stride that leaves roughly `target_points` points of this view.
    pub fn stride_for(&self, target_points: usize) -> usize {
        (self.len() / target_points.max(1)).max(1)
    }

    /// Points taken at a fixed stride, `len / stride` of them.
    ///
    /// The trailing partial stride is dropped, so a stride larger than the
    /// cloud yields no points.
    pub fn strided_points(&self, stride: usize) -> Vec<Point3<f64>> {
        let stride = stride.max(1);
        (0..self.len() / stride)
            .filter_map(|i| self.point(i * stride))
            .collect()
    }

    /// Roughly `target_points` points of this view, at a uniform stride.
    pub fn subsample(&self, target_points: usize) -> Vec<Point3<f64>> {
        self.strided_points(self.stride_for(target_points))
    }

    /// Arithmetic mean of the visible points, or `None` for an empty cloud.
    pub fn mean(&self) -> Option<Vector3<f64>> {
        if self.is_empty() {
            return None;
        }
        let (sum, count) = self
            .iter()
            .fold((Vector3::zeros(), 0usize), |(sum, count), p| {
                (sum + to_point(p).coords, count + 1)
            });
        Some(sum / count as f64)
    }

    /// Apply a rigid transform to every visible point.
    pub fn transformed(&self, pose: &Isometry3<f64>) -> Self {
        let points = self
            .iter()
            .map(|p| {
                let q = pose * to_point(p);
                [q.x as f32, q.y as f32, q.z as f32]
            })
            .collect();
        Self::new(points)
    }
}

impl From<Vec<[f32; 3]>> for CloudSample {
    fn from(points: Vec<[f32; 3]>) -> Self {
        Self::new(points)
    }
}

/// Convert a stored point to double precision.
#[inline]
pub fn to_point(p: [f32; 3]) -> Point3<f64> {
    Point3::new(p[0] as f64, p[1] as f64, p[2] as f64)
}
