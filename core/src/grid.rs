//! Occupancy grid geometry, per-particle map storage and the map-based sensor operations.
//!
//! The module separates the immutable part of a map from the mutable part:
//!
//! - [`OccupancyGrid`] owns the geometry (origin, resolution, size in cells), the sensor
//!   parameters and the blur kernel. It is shared read-only by every particle.
//! - [`GridMapData`] holds the evidence of one particle: a flat log-odds array and the derived
//!   likelihood field, both indexed by `x + y * width`. Each particle owns its own copy.
//!
//! All map operations live on [`OccupancyGrid`] and take the [`GridMapData`] they work on as an
//! argument:
//!
//! 1. [`OccupancyGrid::integrate_observation`] fuses a sweep into the log-odds array by walking
//!    each beam with a [`RayIterator`] and applying the inverse sensor model to every cell.
//! 2. [`OccupancyGrid::compute_likelihood_field`] thresholds the log-odds to `{0, 0.5, 1}` and
//!    blurs the result with a separable Gaussian.
//! 3. [`OccupancyGrid::probability_of`] scores a sweep at a pose against the likelihood field.
//! 4. [`OccupancyGrid::find_best_pose`] searches a fixed window of poses for the best score.
//!
//! Lookups outside the grid are never errors: they are skipped.
use log::trace;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SlamError};
use crate::kernel::{gaussian_kernel, kernel_radius, separable_blur};
use crate::observation::Observation;
use crate::raycast::RayIterator;
use crate::sensor::{SensorConfig, inverse_sensor_model};
use crate::{Pose, inv_logit, logit};

/// Slack used when converting a world size into a cell count, so that sizes which are an exact
/// multiple of the resolution do not gain an extra cell from floating point noise.
const CELL_COUNT_EPSILON: f64 = 1e-9;

/// Requested grid geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Requested width in meters
    pub width: f64,
    /// Requested height in meters
    pub height: f64,
    /// Cell size in meters per cell
    pub resolution: f64,
    /// World x coordinate of the lower left corner
    pub origin_x: f64,
    /// World y coordinate of the lower left corner
    pub origin_y: f64,
    /// Variance term of the likelihood blur; the kernel uses
    /// `sigma = sqrt(variance / resolution)` cells
    pub likelihood_variance: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            width: 6.0,
            height: 6.0,
            resolution: 0.05,
            origin_x: -3.0,
            origin_y: -3.0,
            likelihood_variance: 0.05,
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = |value: f64| value > 0.0 && value.is_finite();
        if !positive(self.resolution) {
            return Err(SlamError::InvalidGeometry(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        if !positive(self.width) || !positive(self.height) {
            return Err(SlamError::InvalidGeometry(format!(
                "size must be positive, got {} x {}",
                self.width, self.height
            )));
        }
        if !(self.origin_x.is_finite() && self.origin_y.is_finite()) {
            return Err(SlamError::InvalidGeometry(format!(
                "origin must be finite, got ({}, {})",
                self.origin_x, self.origin_y
            )));
        }
        if !(self.likelihood_variance >= 0.0 && self.likelihood_variance.is_finite()) {
            return Err(SlamError::InvalidGeometry(format!(
                "likelihood variance must be non-negative, got {}",
                self.likelihood_variance
            )));
        }
        Ok(())
    }
}

/// Fixed header of the persisted grid layout.
///
/// A serializer writes these five values in field order, followed by `width * height` log-odds
/// values in row-major order (`index = x + y * width`). The world size recorded here is the
/// realized size, which may exceed the requested size because the cell count is rounded up.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridHeader {
    pub world_width: f64,
    pub world_height: f64,
    pub resolution: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

/// Search window of the scan matcher.
///
/// Offsets run from `-span` up to, but not including, `+span` in increments of `step`, on each of
/// the three axes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanMatcherConfig {
    /// Half-width of the x window in meters
    pub x_span: f64,
    /// Half-width of the y window in meters
    pub y_span: f64,
    /// Half-width of the heading window in radians
    pub theta_span: f64,
    /// Translation increment in meters
    pub translation_step: f64,
    /// Heading increment in radians
    pub rotation_step: f64,
}

impl Default for ScanMatcherConfig {
    fn default() -> Self {
        let theta_span = 15.0_f64.to_radians();
        ScanMatcherConfig {
            x_span: 0.20,
            y_span: 0.20,
            theta_span,
            translation_step: 0.04,
            rotation_step: theta_span / 5.0,
        }
    }
}

impl ScanMatcherConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = |value: f64| value > 0.0 && value.is_finite();
        if !positive(self.translation_step) || !positive(self.rotation_step) {
            return Err(SlamError::InvalidConfig(format!(
                "scan matcher steps must be positive, got {} m and {} rad",
                self.translation_step, self.rotation_step
            )));
        }
        let non_negative = |value: f64| value >= 0.0 && value.is_finite();
        if !non_negative(self.x_span)
            || !non_negative(self.y_span)
            || !non_negative(self.theta_span)
        {
            return Err(SlamError::InvalidConfig(
                "scan matcher spans must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
    /// Window offsets on one axis: `-span + k * step` for `k` in `0..round(2 * span / step)`.
    fn offsets(span: f64, step: f64) -> Vec<f64> {
        let count = (2.0 * span / step).round() as usize;
        if count == 0 {
            return vec![0.0];
        }
        (0..count).map(|k| -span + k as f64 * step).collect()
    }
    /// Number of candidate poses evaluated per search, not counting the start pose.
    pub fn candidate_count(&self) -> usize {
        Self::offsets(self.x_span, self.translation_step).len()
            * Self::offsets(self.y_span, self.translation_step).len()
            * Self::offsets(self.theta_span, self.rotation_step).len()
    }
}

/// Result of a scan matching search
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanMatch {
    pub pose: Pose,
    /// Unnormalized observation likelihood at `pose`
    pub score: f64,
}

/// Evidence of one particle: log-odds per cell and the derived likelihood field.
#[derive(Clone, Debug, PartialEq)]
pub struct GridMapData {
    width: usize,
    log_odds: Vec<f64>,
    likelihood: Vec<f64>,
    likelihood_stale: bool,
}

impl GridMapData {
    pub fn log_odds(&self) -> &[f64] {
        &self.log_odds
    }
    pub fn likelihood(&self) -> &[f64] {
        &self.likelihood
    }
    /// Mutable access to the log-odds array. Marks the likelihood field as stale.
    pub fn log_odds_mut(&mut self) -> &mut [f64] {
        self.likelihood_stale = true;
        &mut self.log_odds
    }
    /// Whether the likelihood field still reflects the current log-odds
    pub fn likelihood_is_current(&self) -> bool {
        !self.likelihood_stale
    }
    /// Clear every cell back to unknown
    pub fn reset(&mut self) {
        self.log_odds.fill(0.0);
        self.likelihood.fill(0.0);
        self.likelihood_stale = true;
    }
    /// Log-odds of cell `(x, y)`, or `None` outside the map
    pub fn log_odds_at(&self, x: usize, y: usize) -> Option<f64> {
        self.cell_index(x, y).map(|i| self.log_odds[i])
    }
    /// Occupancy probability of cell `(x, y)`, or `None` outside the map
    pub fn probability_at(&self, x: usize, y: usize) -> Option<f64> {
        self.log_odds_at(x, y).map(inv_logit)
    }
    fn cell_index(&self, x: usize, y: usize) -> Option<usize> {
        if x >= self.width || y >= self.log_odds.len() / self.width.max(1) {
            return None;
        }
        Some(x + y * self.width)
    }
    pub fn width(&self) -> usize {
        self.width
    }
    pub fn len(&self) -> usize {
        self.log_odds.len()
    }
    pub fn is_empty(&self) -> bool {
        self.log_odds.is_empty()
    }
}

/// Immutable grid geometry shared by all particles.
#[derive(Clone, Debug)]
pub struct OccupancyGrid {
    origin: Point2<f64>,
    resolution: f64,
    width: usize,
    height: usize,
    likelihood_variance: f64,
    kernel: Vec<f64>,
    sensor: SensorConfig,
}

impl OccupancyGrid {
    /// Create a grid covering at least the requested area.
    ///
    /// The number of cells on each axis is `ceil(size / resolution)`, so the realized world size
    /// may be slightly larger than requested.
    ///
    /// # Errors
    /// * [`SlamError::InvalidGeometry`] for non-positive or non-finite sizes and resolution.
    ///
    /// # Example
    /// ```rust
    /// use gridslam::grid::{GridConfig, OccupancyGrid};
    /// use gridslam::sensor::SensorConfig;
    ///
    /// let config = GridConfig { width: 1.0, height: 0.5, resolution: 0.3, ..Default::default() };
    /// let grid = OccupancyGrid::new(&config, SensorConfig::default()).unwrap();
    /// assert_eq!(grid.width(), 4);
    /// assert_eq!(grid.height(), 2);
    /// assert!((grid.world_width() - 1.2).abs() < 1e-9);
    /// ```
    pub fn new(config: &GridConfig, sensor: SensorConfig) -> Result<OccupancyGrid> {
        config.validate()?;
        sensor.validate()?;
        let width = cell_count(config.width, config.resolution);
        let height = cell_count(config.height, config.resolution);
        let sigma = (config.likelihood_variance / config.resolution).sqrt();
        let kernel = gaussian_kernel(sigma, kernel_radius(sigma));
        Ok(OccupancyGrid {
            origin: Point2::new(config.origin_x, config.origin_y),
            resolution: config.resolution,
            width,
            height,
            likelihood_variance: config.likelihood_variance,
            kernel,
            sensor,
        })
    }
    /// Rebuild the geometry described by a persisted header.
    pub fn from_header(header: &GridHeader, sensor: SensorConfig) -> Result<OccupancyGrid> {
        let config = GridConfig {
            width: header.world_width,
            height: header.world_height,
            resolution: header.resolution,
            origin_x: header.origin_x,
            origin_y: header.origin_y,
            ..GridConfig::default()
        };
        OccupancyGrid::new(&config, sensor)
    }
    pub fn header(&self) -> GridHeader {
        GridHeader {
            world_width: self.world_width(),
            world_height: self.world_height(),
            resolution: self.resolution,
            origin_x: self.origin.x,
            origin_y: self.origin.y,
        }
    }
    /// Grid width in cells
    pub fn width(&self) -> usize {
        self.width
    }
    /// Grid height in cells
    pub fn height(&self) -> usize {
        self.height
    }
    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }
    pub fn resolution(&self) -> f64 {
        self.resolution
    }
    pub fn origin(&self) -> Point2<f64> {
        self.origin
    }
    /// Realized world width in meters, `width * resolution`
    pub fn world_width(&self) -> f64 {
        self.width as f64 * self.resolution
    }
    /// Realized world height in meters, `height * resolution`
    pub fn world_height(&self) -> f64 {
        self.height as f64 * self.resolution
    }
    pub fn sensor(&self) -> &SensorConfig {
        &self.sensor
    }
    pub fn kernel(&self) -> &[f64] {
        &self.kernel
    }
    pub fn likelihood_variance(&self) -> f64 {
        self.likelihood_variance
    }

    /// Allocate map storage for one particle.
    ///
    /// With `source` the new map is a deep copy of it; otherwise every cell starts unknown
    /// (log-odds 0) and the likelihood field is zero.
    pub fn create_map_data(&self, source: Option<&GridMapData>) -> GridMapData {
        match source {
            Some(other) => other.clone(),
            None => GridMapData {
                width: self.width,
                log_odds: vec![0.0; self.cell_count()],
                likelihood: vec![0.0; self.cell_count()],
                likelihood_stale: true,
            },
        }
    }
    /// Wrap a row-major log-odds buffer as map storage for this grid.
    ///
    /// # Errors
    /// * [`SlamError::LayoutMismatch`] if the buffer does not hold exactly `width * height` values.
    pub fn map_from_log_odds(&self, log_odds: Vec<f64>) -> Result<GridMapData> {
        if log_odds.len() != self.cell_count() {
            return Err(SlamError::LayoutMismatch {
                expected: self.cell_count(),
                actual: log_odds.len(),
            });
        }
        Ok(GridMapData {
            width: self.width,
            log_odds,
            likelihood: vec![0.0; self.cell_count()],
            likelihood_stale: true,
        })
    }

    /// Continuous grid coordinates of a world point, `(world - origin) / resolution`.
    pub fn to_grid_coords(&self, world_x: f64, world_y: f64) -> (f64, f64) {
        (
            (world_x - self.origin.x) / self.resolution,
            (world_y - self.origin.y) / self.resolution,
        )
    }
    /// Cell containing a world point, or `None` outside the grid.
    pub fn world_to_grid(&self, world_x: f64, world_y: f64) -> Option<(usize, usize)> {
        let (gx, gy) = self.to_grid_coords(world_x, world_y);
        let (gx, gy) = (gx.floor(), gy.floor());
        if gx >= 0.0 && gy >= 0.0 && gx < self.width as f64 && gy < self.height as f64 {
            Some((gx as usize, gy as usize))
        } else {
            None
        }
    }
    /// World coordinates of a cell center
    pub fn grid_to_world(&self, x: usize, y: usize) -> Point2<f64> {
        Point2::new(
            self.origin.x + (x as f64 + 0.5) * self.resolution,
            self.origin.y + (y as f64 + 0.5) * self.resolution,
        )
    }
    pub fn point_in_map(&self, world_x: f64, world_y: f64) -> bool {
        self.world_to_grid(world_x, world_y).is_some()
    }
    pub fn index(&self, x: usize, y: usize) -> usize {
        x + y * self.width
    }
    fn world_index(&self, world_x: f64, world_y: f64) -> Option<usize> {
        self.world_to_grid(world_x, world_y)
            .map(|(x, y)| self.index(x, y))
    }

    pub fn log_odds_at(&self, map: &GridMapData, world_x: f64, world_y: f64) -> Option<f64> {
        self.world_index(world_x, world_y).map(|i| map.log_odds[i])
    }
    pub fn likelihood_at(&self, map: &GridMapData, world_x: f64, world_y: f64) -> Option<f64> {
        self.world_index(world_x, world_y).map(|i| map.likelihood[i])
    }

    /// Fuse a full sweep taken at `pose` into `map`.
    ///
    /// Every beam is walked from the sensor origin to its end point (plus
    /// `SensorConfig::additional_steps` cells). Each visited cell receives
    /// `logit(inverse_sensor_model(..))` for its distance from the beam origin.
    pub fn integrate_observation(
        &self,
        map: &mut GridMapData,
        observation: &Observation,
        pose: &Pose,
    ) {
        let origin = pose.transform_point(0.0, 0.0);
        let (start_x, start_y) = self.to_grid_coords(origin.x, origin.y);
        for m in observation {
            let end = m.end_point(pose);
            let (end_x, end_y) = self.to_grid_coords(end.x, end.y);
            self.apply_measurement(
                map,
                start_x,
                start_y,
                end_x,
                end_y,
                m.distance / self.resolution,
                m.was_hit,
            );
        }
        map.likelihood_stale = true;
    }

    /// Fuse a single beam given in grid coordinates.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_measurement(
        &self,
        map: &mut GridMapData,
        start_x: f64,
        start_y: f64,
        end_x: f64,
        end_y: f64,
        measured_distance: f64,
        was_hit: bool,
    ) {
        let ray = RayIterator::new(
            self.width,
            self.height,
            start_x + 0.5,
            start_y + 0.5,
            end_x + 0.5,
            end_y + 0.5,
            self.sensor.additional_steps,
        );
        for (x, y) in ray {
            let dx = start_x - (x as f64 + 0.5);
            let dy = start_y - (y as f64 + 0.5);
            let distance = dx.hypot(dy);
            let p = inverse_sensor_model(
                distance,
                measured_distance,
                was_hit,
                self.sensor.hit_tolerance_cells,
            );
            map.log_odds[x + y * self.width] += logit(p);
        }
        map.likelihood_stale = true;
    }

    /// Rebuild the likelihood field of `map` from its current log-odds.
    ///
    /// Cells are hard-thresholded (occupied 1.0, free 0.0, unknown 0.5) and blurred with the
    /// grid's Gaussian kernel.
    pub fn compute_likelihood_field(&self, map: &mut GridMapData) {
        let thresholded: Vec<f64> = map
            .log_odds
            .iter()
            .map(|&l| {
                if l > 0.0 {
                    1.0
                } else if l < 0.0 {
                    0.0
                } else {
                    0.5
                }
            })
            .collect();
        separable_blur(
            &thresholded,
            &mut map.likelihood,
            self.width,
            self.height,
            &self.kernel,
        );
        map.likelihood_stale = false;
    }

    /// Recompute the likelihood field only if the log-odds changed since the last computation.
    /// The result is identical to calling [`OccupancyGrid::compute_likelihood_field`].
    pub fn ensure_likelihood_field(&self, map: &mut GridMapData) {
        if map.likelihood_stale {
            self.compute_likelihood_field(map);
        }
    }

    /// Observation likelihood `p(z | m, x)` of a sweep taken at `pose`, up to a constant factor.
    ///
    /// Only hits contribute. Each hit whose end point lands in the grid multiplies the result by
    /// `z_hit * field + z_random / max_range`, or by `1 / max_range` when the field value is
    /// 0.5 (unexplored). End points outside the grid are skipped. The likelihood field must be
    /// current.
    pub fn probability_of(&self, map: &GridMapData, observation: &Observation, pose: &Pose) -> f64 {
        let uniform = self.sensor.uniform_density();
        let z_hit = self.sensor.z_hit;
        let z_random = self.sensor.z_random();
        let isometry = pose.to_isometry();
        let mut product = 1.0;
        for m in observation.hits() {
            let end = isometry.transform_point(&Point2::new(m.local_x, m.local_y));
            if let Some(index) = self.world_index(end.x, end.y) {
                let value = map.likelihood[index];
                if (value - 0.5).abs() <= self.sensor.unknown_epsilon {
                    product *= uniform;
                } else {
                    product *= z_hit * value + z_random * uniform;
                }
            }
        }
        product
    }

    /// Brute-force local search for the pose that best explains `observation`.
    ///
    /// See [`OccupancyGrid::match_scan`].
    pub fn find_best_pose(
        &self,
        map: &GridMapData,
        observation: &Observation,
        start: &Pose,
        matcher: &ScanMatcherConfig,
    ) -> Pose {
        self.match_scan(map, observation, start, matcher).pose
    }

    /// Evaluate every offset of the search window in x, y, theta order, keeping a candidate only
    /// if it scores strictly higher than the best so far. Ties therefore go to the earliest
    /// candidate, i.e. the most negative offsets. On a map with nothing to match against every
    /// candidate scores the same and the first corner of the window wins. The start pose is
    /// returned only when no candidate scores above zero.
    pub fn match_scan(
        &self,
        map: &GridMapData,
        observation: &Observation,
        start: &Pose,
        matcher: &ScanMatcherConfig,
    ) -> ScanMatch {
        let x_offsets = ScanMatcherConfig::offsets(matcher.x_span, matcher.translation_step);
        let y_offsets = ScanMatcherConfig::offsets(matcher.y_span, matcher.translation_step);
        let theta_offsets = ScanMatcherConfig::offsets(matcher.theta_span, matcher.rotation_step);

        let mut best = ScanMatch {
            pose: *start,
            score: 0.0,
        };
        for &dx in &x_offsets {
            for &dy in &y_offsets {
                for &dtheta in &theta_offsets {
                    let candidate = start.offset(dx, dy, dtheta);
                    let score = self.probability_of(map, observation, &candidate);
                    if score > best.score {
                        best = ScanMatch {
                            pose: candidate,
                            score,
                        };
                    }
                }
            }
        }
        if best.score == 0.0 {
            // nothing beat zero, so the start pose stands and is scored as itself
            best.score = self.probability_of(map, observation, start);
        }
        trace!(
            "scan match: start {} -> best {} (score {:.3e})",
            start, best.pose, best.score
        );
        best
    }
}

fn cell_count(size: f64, resolution: f64) -> usize {
    ((size / resolution - CELL_COUNT_EPSILON).ceil() as usize).max(1)
}
