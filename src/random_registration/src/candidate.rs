//! Registration hypotheses and the ranked collection that holds them.

use std::cmp::Ordering;

use nalgebra::Point3;

use crate::pose::{mean_displacement, Pose};

/// A registration hypothesis produced by one local refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Refined transform from source to destination.
    pub guess: Pose,

    /// Alignment residual (lower is better).
    pub score: f64,

    /// Convergence tolerance the refiner used; scales the duplicate threshold.
    pub convergence_tolerance: f64,

    /// Whether the refinement ran out of its time budget.
    pub timed_out: bool,
}

impl Candidate {
    /// Candidate recorded for a refinement that failed outright.
    ///
    /// Keeps the input guess and ranks behind every finite score.
    pub fn failed(guess: Pose, convergence_tolerance: f64) -> Self {
        Self {
            guess,
            score: f64::INFINITY,
            convergence_tolerance,
            timed_out: true,
        }
    }

    /// Score used for ranking: NaN counts as the worst possible score.
    pub fn ranking_score(&self) -> f64 {
        if self.score.is_nan() {
            f64::INFINITY
        } else {
            self.score
        }
    }

    /// Check whether `other` lands within this candidate's duplicate threshold.
    ///
    /// Applies `self.guess⁻¹ · other.guess` to `points` and compares the mean
    /// displacement against `factor × self.convergence_tolerance`. The test
    /// is directional: this candidate's tolerance sets the threshold.
    pub fn is_duplicate_of(&self, other: &Candidate, points: &[Point3<f64>], factor: f64) -> bool {
        let relative = self.guess.inverse() * other.guess;
        mean_displacement(&relative, points) < factor * self.convergence_tolerance
    }
}

/// Ascending order by ranking score, NaN last.
pub fn compare_scores(a: &Candidate, b: &Candidate) -> Ordering {
    a.ranking_score().total_cmp(&b.ranking_score())
}

/// Mutable, ranked collection of in-flight candidates.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
}

impl CandidateSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Append a candidate.
    pub fn push(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
    }

    /// Candidate at `index`.
    pub fn get(&self, index: usize) -> Option<&Candidate> {
        self.candidates.get(index)
    }

    /// First candidate (the best one after [`sort_by_score`](Self::sort_by_score)).
    pub fn first(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    /// Candidate with the lowest ranking score, regardless of current order.
    pub fn best(&self) -> Option<&Candidate> {
        self.candidates.iter().min_by(|a, b| compare_scores(a, b))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.candidates.iter()
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn as_mut_slice(&mut self) -> &mut [Candidate] {
        &mut self.candidates
    }

    /// Sort ascending by score, best first.
    ///
    /// The sort is stable: equal scores keep their current relative order.
    pub fn sort_by_score(&mut self) {
        self.candidates.sort_by(compare_scores);
    }

    /// Keep at most `max` candidates from the front.
    pub fn truncate(&mut self, max: usize) {
        self.candidates.truncate(max);
    }

    /// Remove candidates that duplicate an earlier one.
    ///
    /// Every pair `(earlier, later)` is tested with
    /// `later.is_duplicate_of(earlier)`. A duplicate is removed by moving the
    /// last candidate into its slot, so order is not preserved. The first
    /// candidate is never removed. Cost is quadratic in the set size.
    ///
    /// # Returns
    /// Number of removed candidates.
    pub fn dedup(&mut self, points: &[Point3<f64>], factor: f64) -> usize {
        let before = self.candidates.len();

        let mut ax = 0;
        while ax < self.candidates.len() {
            let mut bx = ax + 1;
            while bx < self.candidates.len() {
                if self.candidates[bx].is_duplicate_of(&self.candidates[ax], points, factor) {
                    self.candidates.swap_remove(bx);
                } else {
                    bx += 1;
                }
            }
            ax += 1;
        }

        before - self.candidates.len()
    }

    pub fn into_vec(self) -> Vec<Candidate> {
        self.candidates
    }
}

impl From<Vec<Candidate>> for CandidateSet {
    fn from(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }
}

impl FromIterator<Candidate> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = Candidate>>(iter: I) -> Self {
        Self {
            candidates: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for CandidateSet {
    type Item = Candidate;
    type IntoIter = std::vec::IntoIter<Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.into_iter()
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Isometry3, Vector3};

    fn candidate(x: f64, score: f64) -> Candidate {
        Candidate {
            guess: Isometry3::translation(x, 0.0, 0.0),
            score,
            convergence_tolerance: 0.01,
            timed_out: false,
        }
    }

    fn grid_points() -> Vec<Point3<f64>> {
        let mut points = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                points.push(Point3::new(i as f64 * 0.25, j as f64 * 0.25, 0.0));
            }
        }
        points
    }

    /// Three clusters of near-identical poses, interleaved.
    fn clustered_set() -> CandidateSet {
        let mut set = CandidateSet::new();
        for k in 0..4 {
            let jitter = k as f64 * 0.01;
            set.push(candidate(0.0 + jitter, 1.0 + jitter));
            set.push(candidate(5.0 + jitter, 2.0 + jitter));
            set.push(candidate(10.0 + jitter, 3.0 + jitter));
        }
        set
    }

    #[test]
    fn test_sort_ascending() {
        let mut set: CandidateSet = vec![
            candidate(0.0, 3.0),
            candidate(1.0, 1.0),
            candidate(2.0, 2.0),
        ]
        .into();
        set.sort_by_score();

        let scores: Vec<f64> = set.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_sort_stable_for_ties() {
        let mut set: CandidateSet = vec![
            candidate(0.0, 1.0),
            candidate(1.0, 0.5),
            candidate(2.0, 1.0),
            candidate(3.0, 1.0),
        ]
        .into();
        set.sort_by_score();

        let xs: Vec<f64> = set.iter().map(|c| c.guess.translation.x).collect();
        assert_eq!(xs, vec![1.0, 0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_nan_ranks_last() {
        let mut set: CandidateSet = vec![
            candidate(0.0, f64::NAN),
            candidate(1.0, f64::INFINITY),
            candidate(2.0, 5.0),
        ]
        .into();
        set.sort_by_score();

        assert_eq!(set.first().unwrap().score, 5.0);
        assert_eq!(set.best().unwrap().score, 5.0);
        assert!(set.get(2).unwrap().score.is_nan() || set.get(1).unwrap().score.is_nan());
    }

    #[test]
    fn test_failed_candidate() {
        let guess = Isometry3::translation(1.0, 2.0, 3.0);
        let failed = Candidate::failed(guess, 0.01);
        assert!(failed.timed_out);
        assert!(failed.score.is_infinite());
        assert_eq!(failed.guess, guess);
    }

    #[test]
    fn test_is_duplicate_threshold() {
        let points = grid_points();
        let a = candidate(0.0, 1.0);
        let near = candidate(0.1, 1.0);
        let far = candidate(0.3, 1.0);

        // Threshold: 20 × 0.01 = 0.2
        assert!(near.is_duplicate_of(&a, &points, 20.0));
        assert!(!far.is_duplicate_of(&a, &points, 20.0));
    }

    #[test]
    fn test_dedup_clusters() {
        let mut set = clustered_set();
        let removed = set.dedup(&grid_points(), 20.0);

        assert_eq!(removed, 9);
        assert_eq!(set.len(), 3);
        // The first candidate is never removed.
        assert_eq!(set.first().unwrap().guess.translation.x, 0.0);
    }

    #[test]
    fn test_dedup_idempotent() {
        let points = grid_points();
        let mut set = clustered_set();
        set.dedup(&points, 20.0);
        let after_first: Vec<Vector3<f64>> =
            set.iter().map(|c| c.guess.translation.vector).collect();

        let removed = set.dedup(&points, 20.0);
        assert_eq!(removed, 0);

        let after_second: Vec<Vector3<f64>> =
            set.iter().map(|c| c.guess.translation.vector).collect();
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn test_dedup_never_empties() {
        let points = grid_points();
        let mut set: CandidateSet = (0..10).map(|_| candidate(0.0, 1.0)).collect();
        set.dedup(&points, 20.0);
        assert_eq!(set.len(), 1);

        let mut empty = CandidateSet::new();
        assert_eq!(empty.dedup(&points, 20.0), 0);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_dedup_without_points_keeps_all() {
        let mut set: CandidateSet = (0..4).map(|_| candidate(0.0, 1.0)).collect();
        assert_eq!(set.dedup(&[], 20.0), 0);
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_truncate() {
        let mut set = clustered_set();
        set.truncate(5);
        assert_eq!(set.len(), 5);
        set.truncate(50);
        assert_eq!(set.len(), 5);
    }
}
