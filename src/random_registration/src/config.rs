//! Search configuration.

use std::f64::consts::PI;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::centroid::CentroidStrategy;

/// Default rotation steps per axis.
pub const DEFAULT_ROTATION_STEPS: usize = 4;

/// Sampling of one axis: `steps` values `start + i·(stop − start)`.
///
/// The increment is `stop − start` itself, not divided by `steps`. For a
/// rotation axis with `stop = 2π·n/(n+1)` this still visits `n` distinct
/// angles, all multiples of `2π/(n+1)`, and never samples 2π next to 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisSampling {
    /// Number of sampled values.
    pub steps: usize,
    pub start: f64,
    pub stop: f64,
}

impl AxisSampling {
    /// Rotation axis sampling `n` angles without repeating the full turn.
    pub fn full_turn(steps: usize) -> Self {
        Self {
            steps,
            start: 0.0,
            stop: 2.0 * PI * steps as f64 / (steps as f64 + 1.0),
        }
    }

    /// Single sample at zero.
    pub fn fixed() -> Self {
        Self {
            steps: 1,
            start: 0.0,
            stop: 0.0,
        }
    }

    /// Value of sample `index`.
    pub fn value(&self, index: usize) -> f64 {
        self.start + index as f64 * (self.stop - self.start)
    }

    /// All sampled values, in index order.
    pub fn values(&self) -> Vec<f64> {
        (0..self.steps).map(|i| self.value(i)).collect()
    }
}

impl Default for AxisSampling {
    fn default() -> Self {
        Self::fixed()
    }
}

/// Configuration for the global registration search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Rotation sampling about x, y and z (radians).
    pub rotation: [AxisSampling; 3],

    /// Translation sampling along x, y and z, added to the destination anchor.
    pub translation: [AxisSampling; 3],

    /// Anchor strategy for the source cloud.
    pub source_anchor: CentroidStrategy,

    /// Anchor strategy for the destination cloud.
    pub destination_anchor: CentroidStrategy,

    /// Subsample size for the bulk seed refinement.
    pub bulk_target_points: usize,

    /// First rung of the resolution ladder; doubled every round.
    pub ladder_start_points: usize,

    /// Ladder rounds run while the resolution is at most this.
    pub ladder_max_points: usize,

    /// Upper bound of the per-call time budget (seconds).
    pub max_time_budget_secs: f64,

    /// Budget is this multiple of the mean successful refinement time.
    pub time_budget_factor: f64,

    /// Number of candidates kept in the final result.
    pub max_candidates: usize,

    /// Duplicate threshold in multiples of the refiner's tolerance.
    pub dedup_tolerance_factor: f64,

    /// Approximate source subsample size for duplicate tests.
    pub dedup_target_points: usize,

    /// Number of top candidates re-refined by the debug pass.
    pub debug_candidates: usize,

    /// Resolution of the debug pass.
    pub debug_target_points: usize,

    /// Remove time budgets and run the debug pass.
    pub visualization: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rotation: [AxisSampling::full_turn(DEFAULT_ROTATION_STEPS); 3],
            translation: [AxisSampling::fixed(); 3],
            source_anchor: CentroidStrategy::Mean,
            destination_anchor: CentroidStrategy::Mean,
            bulk_target_points: 250,
            ladder_start_points: 500,
            ladder_max_points: 16000,
            max_time_budget_secs: 0.5,
            time_budget_factor: 3.0,
            max_candidates: 500,
            dedup_tolerance_factor: 20.0,
            dedup_target_points: 250,
            debug_candidates: 5,
            debug_target_points: 1_000_000,
            visualization: false,
        }
    }
}

impl SearchConfig {
    /// Default configuration with `steps` rotation samples per axis.
    pub fn with_steps(steps: usize) -> Self {
        Self {
            rotation: [AxisSampling::full_turn(steps); 3],
            ..Default::default()
        }
    }

    /// Create a builder with default settings.
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::new()
    }

    /// Number of seeds the configuration generates.
    pub fn seed_count(&self) -> usize {
        self.rotation
            .iter()
            .chain(self.translation.iter())
            .map(|axis| axis.steps)
            .product()
    }

    /// Resolutions of the ladder rounds, in order.
    pub fn ladder(&self) -> Vec<usize> {
        let mut rungs = Vec::new();
        let mut points = self.ladder_start_points;
        while points > 0 && points <= self.ladder_max_points {
            rungs.push(points);
            points = match points.checked_mul(2) {
                Some(next) => next,
                None => break,
            };
        }
        rungs
    }

    /// Upper bound of the per-call time budget.
    ///
    /// Values too large for a `Duration` saturate.
    pub fn max_time_budget(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_time_budget_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Check the configuration for values the search cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (axis, sampling) in ["x", "y", "z"].iter().zip(&self.rotation) {
            if sampling.steps == 0 {
                bail!("Rotation steps about {axis} must be positive");
            }
            if !sampling.start.is_finite() || !sampling.stop.is_finite() {
                bail!("Rotation range about {axis} must be finite");
            }
        }
        for (axis, sampling) in ["x", "y", "z"].iter().zip(&self.translation) {
            if sampling.steps == 0 {
                bail!("Translation steps along {axis} must be positive");
            }
            if !sampling.start.is_finite() || !sampling.stop.is_finite() {
                bail!("Translation range along {axis} must be finite");
            }
        }
        if self.bulk_target_points == 0 {
            bail!("Bulk target point count must be positive");
        }
        if self.ladder_start_points == 0 || self.ladder_max_points == 0 {
            bail!("Resolution ladder bounds must be positive");
        }
        if !self.max_time_budget_secs.is_finite() || self.max_time_budget_secs <= 0.0 {
            bail!(
                "Maximum time budget must be positive, got {}",
                self.max_time_budget_secs
            );
        }
        if Duration::try_from_secs_f64(self.max_time_budget_secs).is_err() {
            bail!(
                "Maximum time budget of {} s is out of range",
                self.max_time_budget_secs
            );
        }
        if !self.time_budget_factor.is_finite() || self.time_budget_factor <= 0.0 {
            bail!(
                "Time budget factor must be positive, got {}",
                self.time_budget_factor
            );
        }
        if self.max_candidates == 0 {
            bail!("At least one candidate must be retained");
        }
        if !self.dedup_tolerance_factor.is_finite() || self.dedup_tolerance_factor < 0.0 {
            bail!(
                "Dedup tolerance factor must be non-negative, got {}",
                self.dedup_tolerance_factor
            );
        }
        if self.dedup_target_points == 0 {
            bail!("Dedup target point count must be positive");
        }
        Ok(())
    }

    /// Parse a configuration from JSON. Missing fields take default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Invalid search configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for [`SearchConfig`].
#[derive(Debug, Clone, Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `steps` rotation samples over a full turn on every axis.
    pub fn rotation_steps(mut self, steps: usize) -> Self {
        self.config.rotation = [AxisSampling::full_turn(steps); 3];
        self
    }

    /// Set rotation sampling per axis (x, y, z).
    pub fn rotation(mut self, x: AxisSampling, y: AxisSampling, z: AxisSampling) -> Self {
        self.config.rotation = [x, y, z];
        self
    }

    /// Set translation sampling per axis (x, y, z).
    pub fn translation(mut self, x: AxisSampling, y: AxisSampling, z: AxisSampling) -> Self {
        self.config.translation = [x, y, z];
        self
    }

    /// Set the anchor strategy of both clouds.
    pub fn anchor(mut self, strategy: CentroidStrategy) -> Self {
        self.config.source_anchor = strategy;
        self.config.destination_anchor = strategy;
        self
    }

    pub fn source_anchor(mut self, strategy: CentroidStrategy) -> Self {
        self.config.source_anchor = strategy;
        self
    }

    pub fn destination_anchor(mut self, strategy: CentroidStrategy) -> Self {
        self.config.destination_anchor = strategy;
        self
    }

    /// Set the bulk refinement resolution.
    pub fn bulk_target_points(mut self, points: usize) -> Self {
        self.config.bulk_target_points = points;
        self
    }

    /// Set the resolution ladder bounds.
    pub fn ladder(mut self, start_points: usize, max_points: usize) -> Self {
        self.config.ladder_start_points = start_points;
        self.config.ladder_max_points = max_points;
        self
    }

    /// Set the time budget cap and the multiple of the mean refinement time.
    pub fn time_budget(mut self, max_secs: f64, factor: f64) -> Self {
        self.config.max_time_budget_secs = max_secs;
        self.config.time_budget_factor = factor;
        self
    }

    /// Set the number of retained candidates.
    pub fn max_candidates(mut self, max_candidates: usize) -> Self {
        self.config.max_candidates = max_candidates;
        self
    }

    /// Set the duplicate threshold factor.
    pub fn dedup_tolerance_factor(mut self, factor: f64) -> Self {
        self.config.dedup_tolerance_factor = factor;
        self
    }

    /// Enable or disable visualization mode.
    ///
    /// Removes time budgets and re-refines the best candidates for display.
    pub fn visualization(mut self, enabled: bool) -> Self {
        self.config.visualization = enabled;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<SearchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.seed_count(), 64);
        assert_eq!(config.bulk_target_points, 250);
        assert_eq!(config.max_candidates, 500);
        assert_relative_eq!(config.rotation[0].stop, 2.0 * PI * 4.0 / 5.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_turn_distinct_angles() {
        // With the undivided increment the angles are multiples of 2π/(n+1).
        let sampling = AxisSampling::full_turn(4);
        let step = 2.0 * PI / 5.0;
        let mut wrapped: Vec<i64> = sampling
            .values()
            .iter()
            .map(|a| (a.rem_euclid(2.0 * PI) / step).round() as i64 % 5)
            .collect();
        assert_eq!(wrapped[0], 0);
        wrapped.sort();
        wrapped.dedup();
        assert_eq!(wrapped.len(), 4);
    }

    #[test]
    fn test_axis_values() {
        let sampling = AxisSampling {
            steps: 3,
            start: 1.0,
            stop: 1.5,
        };
        assert_eq!(sampling.values(), vec![1.0, 1.5, 2.0]);
        assert_eq!(AxisSampling::fixed().values(), vec![0.0]);
    }

    #[test]
    fn test_ladder() {
        let config = SearchConfig::default();
        assert_eq!(config.ladder(), vec![500, 1000, 2000, 4000, 8000, 16000]);

        let config = SearchConfig::builder().ladder(600, 1000).build().unwrap();
        assert_eq!(config.ladder(), vec![600]);

        let config = SearchConfig::builder().ladder(2000, 1000).build().unwrap();
        assert!(config.ladder().is_empty());
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = SearchConfig::default();
        config.rotation[1].steps = 0;
        assert!(config.validate().is_err());

        let mut config = SearchConfig::default();
        config.translation[2].steps = 0;
        assert!(config.validate().is_err());

        assert!(SearchConfig::builder().max_candidates(0).build().is_err());
        assert!(SearchConfig::builder().time_budget(0.0, 3.0).build().is_err());
        assert!(SearchConfig::builder().ladder(0, 16000).build().is_err());
    }

    #[test]
    fn test_time_budget_range() {
        assert!(SearchConfig::builder().time_budget(1e20, 3.0).build().is_err());

        let config = SearchConfig::builder().time_budget(3600.0, 1e300).build().unwrap();
        assert_eq!(config.max_time_budget(), Duration::from_secs(3600));

        // Unvalidated configurations saturate instead of panicking.
        let config = SearchConfig {
            max_time_budget_secs: 1e20,
            ..Default::default()
        };
        assert_eq!(config.max_time_budget(), Duration::MAX);
    }

    #[test]
    fn test_builder() {
        let config = SearchConfig::builder()
            .rotation_steps(2)
            .translation(
                AxisSampling {
                    steps: 3,
                    start: 0.0,
                    stop: 0.5,
                },
                AxisSampling::fixed(),
                AxisSampling::fixed(),
            )
            .anchor(CentroidStrategy::Median)
            .visualization(true)
            .build()
            .unwrap();

        assert_eq!(config.seed_count(), 2 * 2 * 2 * 3);
        assert_eq!(config.source_anchor, CentroidStrategy::Median);
        assert_eq!(config.destination_anchor, CentroidStrategy::Median);
        assert!(config.visualization);
    }

    #[test]
    fn test_json_round_trip() {
        let config = SearchConfig::builder()
            .rotation_steps(3)
            .source_anchor(CentroidStrategy::sphere_fit())
            .build()
            .unwrap();
        let json = config.to_json().unwrap();
        let parsed = SearchConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_json_partial() {
        let parsed = SearchConfig::from_json(r#"{"max_candidates": 10}"#).unwrap();
        assert_eq!(parsed.max_candidates, 10);
        assert_eq!(parsed.seed_count(), 64);

        assert!(SearchConfig::from_json(r#"{"max_candidates": 0}"#).is_err());
        assert!(SearchConfig::from_json("not json").is_err());
    }
}
