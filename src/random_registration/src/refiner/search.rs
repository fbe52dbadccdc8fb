//! KD-tree based nearest-neighbour search over the destination cloud.
//!
//! The destination cloud is bound once per refiner and queried for every
//! transformed source point of every iteration, so the tree is immutable
//! and built a single time.

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

/// Bucket size for the KD-tree.
///
/// Larger than kiddo's default of 32 to cope with planar clouds where many
/// points share a coordinate on one axis.
const BUCKET_SIZE: usize = 256;

/// Nearest-neighbour index over a fixed point set.
#[derive(Debug)]
pub struct PointSearch {
    /// Generic args: A=f32 (coordinate), T=u64 (index), K=3 (dimensions), B=bucket size
    kdtree: ImmutableKdTree<f32, u64, 3, BUCKET_SIZE>,

    /// Indexed points, non-finite entries removed.
    points: Vec<[f32; 3]>,
}

impl PointSearch {
    /// Build an index from the finite points of a slice.
    ///
    /// # Returns
    /// `None` if no finite point remains.
    pub fn from_points(points: &[[f32; 3]]) -> Option<Self> {
        let points: Vec<[f32; 3]> = points
            .iter()
            .filter(|p| p.iter().all(|v| v.is_finite()))
            .copied()
            .collect();
        if points.is_empty() {
            return None;
        }

        // The item value is the index into `points`.
        let kdtree: ImmutableKdTree<f32, u64, 3, BUCKET_SIZE> = (&*points).into();

        Some(Self { kdtree, points })
    }

    /// Nearest indexed point to `query`.
    ///
    /// # Returns
    /// The point and its squared distance to `query`.
    pub fn nearest(&self, query: &[f32; 3]) -> ([f32; 3], f32) {
        let nn = self.kdtree.nearest_one::<SquaredEuclidean>(query);
        (self.points[nn.item as usize], nn.distance)
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
