//! Particle filter SLAM engine.
//!
//! Each [`Particle`] is a full hypothesis: a pose and a private occupancy map. One call to
//! [`SlamEngine::update`] runs the complete per-particle pipeline:
//!
//! 1. sample a new pose from the odometry motion model,
//! 2. bring the particle's likelihood field up to date,
//! 3. refine the sampled pose with the scan matcher against that field,
//! 4. weight the particle by the observation likelihood at the refined pose,
//! 5. fuse the observation into the particle's map (skipped on large turns).
//!
//! Afterwards the weights are normalized and the effective sample size is returned.
//! [`SlamEngine::resample`] draws a new generation with low-variance resampling, and
//! [`SlamEngine::step`] combines both, resampling only when the particle set has degenerated.
//!
//! Randomness is always supplied by the caller, so a seeded generator reproduces a run exactly.
use log::{debug, info, trace, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};
use std::path::Path;

use crate::error::{Result, SlamError};
use crate::grid::{GridConfig, GridMapData, OccupancyGrid, ScanMatcherConfig};
use crate::motion::{MotionNoise, Odometry, RobotGeometry};
use crate::observation::Observation;
use crate::sensor::SensorConfig;
use crate::{Pose, wrap_angle};

/// Complete engine configuration.
///
/// Every section falls back to its defaults when missing from a YAML document:
///
/// ```yaml
/// num_particles: 100
/// grid:
///   resolution: 0.1
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlamConfig {
    /// Number of particles kept by the filter
    pub num_particles: usize,
    /// Heading change in radians above which a cycle does not update the maps
    pub rotation_threshold: f64,
    /// Resample in [`SlamEngine::step`] when `Neff < threshold * N`; `None` never resamples there
    pub resample_threshold: Option<f64>,
    pub grid: GridConfig,
    pub sensor: SensorConfig,
    pub matcher: ScanMatcherConfig,
    pub noise: MotionNoise,
    pub geometry: RobotGeometry,
}

impl Default for SlamConfig {
    fn default() -> Self {
        SlamConfig {
            num_particles: 500,
            rotation_threshold: 30.0_f64.to_radians(),
            resample_threshold: Some(0.5),
            grid: GridConfig::default(),
            sensor: SensorConfig::default(),
            matcher: ScanMatcherConfig::default(),
            noise: MotionNoise::default(),
            geometry: RobotGeometry::default(),
        }
    }
}

impl SlamConfig {
    /// Parse a configuration from a YAML document.
    ///
    /// # Example
    /// ```rust
    /// use gridslam::slam::SlamConfig;
    ///
    /// let config = SlamConfig::from_yaml("num_particles: 20\nsensor:\n  max_range: 3.5\n").unwrap();
    /// assert_eq!(config.num_particles, 20);
    /// assert_eq!(config.sensor.max_range, 3.5);
    /// assert_eq!(config.grid.resolution, 0.05);
    /// ```
    pub fn from_yaml(document: &str) -> Result<SlamConfig> {
        let config: SlamConfig = serde_yaml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }
    /// Read and parse a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SlamConfig> {
        let document = std::fs::read_to_string(path)?;
        SlamConfig::from_yaml(&document)
    }
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
    /// Check every section for values that would break the filter.
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(SlamError::InvalidParticleCount(0));
        }
        if !(self.rotation_threshold >= 0.0) {
            return Err(SlamError::InvalidConfig(format!(
                "rotation threshold must be non-negative, got {}",
                self.rotation_threshold
            )));
        }
        if let Some(threshold) = self.resample_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(SlamError::InvalidConfig(format!(
                    "resample threshold must lie in [0, 1], got {}",
                    threshold
                )));
            }
        }
        self.sensor.validate()?;
        self.grid.validate()?;
        self.matcher.validate()?;
        self.noise.validate()?;
        self.geometry.validate()?;
        Ok(())
    }
}

/// One pose hypothesis together with the map built along it.
#[derive(Clone, Debug)]
pub struct Particle {
    pub weight: f64,
    pub pose: Pose,
    pub map: GridMapData,
}

impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("x", &self.pose.x)
            .field("y", &self.pose.y)
            .field("theta_deg", &self.pose.theta.to_degrees())
            .field("weight", &self.weight)
            .finish()
    }
}

/// Outcome of one [`SlamEngine::step`]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Effective sample size right after the update, before any resampling
    pub neff: f64,
    /// Whether the particle set was resampled
    pub resampled: bool,
    /// Whether the observation was fused into the maps
    pub integrated: bool,
}

#[derive(Clone)]
pub struct SlamEngine {
    config: SlamConfig,
    grid: OccupancyGrid,
    particles: Vec<Particle>,
    strongest: usize,
}

impl Debug for SlamEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (min_weight, max_weight) = self
            .particles
            .iter()
            .map(|p| p.weight)
            .fold((f64::INFINITY, 0.0_f64), |(lo, hi), w| (lo.min(w), hi.max(w)));
        f.debug_struct("SlamEngine")
            .field("num_particles", &self.particles.len())
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field("weighted_pose", &format_args!("{}", self.weighted_pose()))
            .field("grid", &format_args!("{} x {} cells", self.grid.width(), self.grid.height()))
            .finish()
    }
}

impl SlamEngine {
    /// Build the shared grid and `config.num_particles` particles at the origin.
    ///
    /// # Errors
    /// * [`SlamError::InvalidParticleCount`] for zero particles.
    /// * [`SlamError::InvalidGeometry`] / [`SlamError::InvalidConfig`] for invalid sections.
    pub fn new(config: SlamConfig) -> Result<SlamEngine> {
        config.validate()?;
        let grid = OccupancyGrid::new(&config.grid, config.sensor.clone())?;
        let mut engine = SlamEngine {
            config,
            grid,
            particles: Vec::new(),
            strongest: 0,
        };
        engine.initialize(engine.config.num_particles)?;
        Ok(engine)
    }
    /// Replace the particle set by `num_particles` particles at pose `(0, 0, 0)`, each with a
    /// blank map and weight `1 / num_particles`.
    pub fn initialize(&mut self, num_particles: usize) -> Result<()> {
        if num_particles == 0 {
            return Err(SlamError::InvalidParticleCount(num_particles));
        }
        self.populate(num_particles);
        info!(
            "Initialized {} particles on a {} x {} grid ({} m cells)",
            num_particles,
            self.grid.width(),
            self.grid.height(),
            self.grid.resolution()
        );
        Ok(())
    }
    /// Discard every particle and start over with the same particle count.
    pub fn reset(&mut self) {
        let n = self.particles.len().max(1);
        self.populate(n);
        info!("Reset to {} particles", n);
    }
    fn populate(&mut self, num_particles: usize) {
        let weight = 1.0 / num_particles as f64;
        let blank = self.grid.create_map_data(None);
        self.particles = (0..num_particles)
            .map(|_| Particle {
                weight,
                pose: Pose::default(),
                map: blank.clone(),
            })
            .collect();
        self.strongest = 0;
    }

    pub fn config(&self) -> &SlamConfig {
        &self.config
    }
    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    /// Mutable access to the particle set, for seeding poses or weights
    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }
    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }
    pub fn strongest_index(&self) -> usize {
        self.strongest
    }
    /// The particle with the largest weight after the last update
    pub fn strongest_particle(&self) -> &Particle {
        &self.particles[self.strongest.min(self.particles.len() - 1)]
    }

    /// Overwrite all weights at once.
    ///
    /// # Errors
    /// * [`SlamError::LayoutMismatch`] if `weights` does not have one entry per particle.
    pub fn set_weights(&mut self, weights: &[f64]) -> Result<()> {
        if weights.len() != self.particles.len() {
            return Err(SlamError::LayoutMismatch {
                expected: self.particles.len(),
                actual: weights.len(),
            });
        }
        for (particle, &w) in self.particles.iter_mut().zip(weights) {
            particle.weight = w;
        }
        self.strongest = self.find_strongest();
        Ok(())
    }

    /// Run one filter cycle with the given sweep and odometry increment.
    ///
    /// # Arguments
    /// * `observation` - the sweep taken at the end of the motion, already deskewed if needed
    /// * `odometry` - motion reported since the previous cycle
    /// * `rng` - random source for the motion model
    ///
    /// # Returns
    /// * The effective sample size of the normalized weights.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        observation: &Observation,
        odometry: &Odometry,
        rng: &mut R,
    ) -> f64 {
        let skip = self.integration_skipped(odometry);
        for (i, particle) in self.particles.iter_mut().enumerate() {
            let sampled = odometry.apply(&particle.pose, rng);
            self.grid.ensure_likelihood_field(&mut particle.map);
            let best = self
                .grid
                .match_scan(&particle.map, observation, &sampled, &self.config.matcher);
            trace!("particle {}: sampled {} refined {}", i, sampled, best.pose);
            particle.pose = best.pose;
            particle.weight = best.score;
            if !skip {
                self.grid
                    .integrate_observation(&mut particle.map, observation, &particle.pose);
            }
        }
        self.normalize_weights();
        self.strongest = self.find_strongest();
        let neff = self.effective_sample_size();
        debug!(
            "update: neff {:.1} / {}, strongest #{} (w = {:.4}), map update {}",
            neff,
            self.particles.len(),
            self.strongest,
            self.particles[self.strongest].weight,
            if skip { "skipped" } else { "applied" }
        );
        neff
    }

    /// Whether a cycle with this odometry leaves the maps untouched
    pub fn integration_skipped(&self, odometry: &Odometry) -> bool {
        odometry.delta_theta.abs() > self.config.rotation_threshold
    }

    /// Scale the weights to sum to one. A vector with a zero, negative or non-finite sum is
    /// replaced by uniform weights.
    pub fn normalize_weights(&mut self) {
        let sum: f64 = self.particles.iter().map(|p| p.weight).sum();
        if sum > 0.0 && sum.is_finite() {
            for particle in &mut self.particles {
                particle.weight /= sum;
            }
        } else {
            warn!("Degenerate weight sum {}, falling back to uniform weights", sum);
            let uniform = 1.0 / self.particles.len() as f64;
            for particle in &mut self.particles {
                particle.weight = uniform;
            }
        }
    }

    fn find_strongest(&self) -> usize {
        let mut best = 0;
        for (i, particle) in self.particles.iter().enumerate() {
            if particle.weight > self.particles[best].weight {
                best = i;
            }
        }
        best
    }

    /// Effective sample size `1 / sum((w_i / sum(w))^2)`.
    ///
    /// Lies in `[1, N]` for any non-negative weight vector with a positive sum, and is `0.0` when
    /// the weights are all zero or contain NaN.
    pub fn effective_sample_size(&self) -> f64 {
        effective_sample_size(self.particles.iter().map(|p| p.weight))
    }

    /// Draw a new generation with low-variance resampling.
    ///
    /// A single offset `r ~ U(0, 1/N)` selects the particles at cumulative weights
    /// `r + m / N`. Every selected particle is deep-copied, so no two particles share map storage
    /// afterwards, and all weights are reset to `1 / N`. With a degenerate weight vector the
    /// current particles are kept and only their weights are reset.
    pub fn resample<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let n = self.particles.len();
        let uniform = 1.0 / n as f64;
        let sum: f64 = self.particles.iter().map(|p| p.weight).sum();
        if !(sum > 0.0 && sum.is_finite()) {
            warn!("Cannot resample with weight sum {}, keeping particles", sum);
            for particle in &mut self.particles {
                particle.weight = uniform;
            }
            return;
        }

        let r = rng.random::<f64>() * uniform;
        let mut cumulative = self.particles[0].weight / sum;
        let mut i = 0;
        let mut strongest = None;
        let mut next = Vec::with_capacity(n);
        for m in 0..n {
            let u = r + m as f64 * uniform;
            while u > cumulative && i < n - 1 {
                i += 1;
                cumulative += self.particles[i].weight / sum;
            }
            if i == self.strongest && strongest.is_none() {
                strongest = Some(m);
            }
            let mut copy = self.particles[i].clone();
            copy.weight = uniform;
            next.push(copy);
        }
        self.particles = next;
        self.strongest = strongest.unwrap_or(0);
    }

    /// Update and, when the effective sample size drops below `resample_threshold * N`, resample.
    ///
    /// # Example
    /// ```rust
    /// use gridslam::motion::Odometry;
    /// use gridslam::observation::{Measurement, Observation};
    /// use gridslam::slam::{SlamConfig, SlamEngine};
    /// use rand::SeedableRng;
    /// use rand::rngs::StdRng;
    ///
    /// let config = SlamConfig { num_particles: 4, ..Default::default() };
    /// let mut engine = SlamEngine::new(config).unwrap();
    /// let mut rng = StdRng::seed_from_u64(1);
    /// let sweep: Observation = vec![Measurement::new(0.0, 1.0, true)].into();
    /// let report = engine.step(&sweep, &Odometry::new(0.0, 0.0), &mut rng);
    /// assert!(report.integrated);
    /// assert!(report.neff >= 1.0 && report.neff <= 4.0 + 1e-9);
    /// ```
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        observation: &Observation,
        odometry: &Odometry,
        rng: &mut R,
    ) -> StepReport {
        let integrated = !self.integration_skipped(odometry);
        let neff = self.update(observation, odometry, rng);
        let resampled = match self.config.resample_threshold {
            Some(threshold) if neff < threshold * self.particles.len() as f64 => {
                info!(
                    "Resampling: neff {:.1} below {:.1}",
                    neff,
                    threshold * self.particles.len() as f64
                );
                self.resample(rng);
                true
            }
            _ => false,
        };
        StepReport {
            neff,
            resampled,
            integrated,
        }
    }

    /// Weighted average of the particle poses.
    ///
    /// Positions are averaged linearly. Headings are wrapped into `(-PI, PI]` and then also
    /// averaged linearly, which is not a circular mean: two particles at `PI - e` and `-PI + e`
    /// average to `0` rather than `PI`.
    pub fn weighted_pose(&self) -> Pose {
        let sum: f64 = self.particles.iter().map(|p| p.weight).sum();
        let n = self.particles.len() as f64;
        let weight_of = |p: &Particle| {
            if sum > 0.0 && sum.is_finite() {
                p.weight / sum
            } else {
                1.0 / n
            }
        };
        self.particles.iter().fold(Pose::default(), |acc, p| {
            let w = weight_of(p);
            Pose::new(
                acc.x + w * p.pose.x,
                acc.y + w * p.pose.y,
                acc.theta + w * wrap_angle(p.pose.theta),
            )
        })
    }
}

/// Effective sample size of an arbitrary weight sequence; see
/// [`SlamEngine::effective_sample_size`].
pub fn effective_sample_size<I: IntoIterator<Item = f64>>(weights: I) -> f64 {
    let weights: Vec<f64> = weights.into_iter().collect();
    let sum: f64 = weights.iter().sum();
    if !(sum > 0.0 && sum.is_finite()) {
        return 0.0;
    }
    let sum_of_squares: f64 = weights.iter().map(|w| (w / sum) * (w / sum)).sum();
    if sum_of_squares > 0.0 && sum_of_squares.is_finite() {
        1.0 / sum_of_squares
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Measurement;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f64::consts::PI;

    fn small_config(num_particles: usize) -> SlamConfig {
        SlamConfig {
            num_particles,
            grid: GridConfig {
                width: 3.0,
                height: 3.0,
                origin_x: -1.5,
                origin_y: -1.5,
                ..GridConfig::default()
            },
            matcher: ScanMatcherConfig {
                x_span: 0.04,
                y_span: 0.04,
                theta_span: 3.0_f64.to_radians(),
                translation_step: 0.04,
                rotation_step: 3.0_f64.to_radians(),
            },
            ..SlamConfig::default()
        }
    }

    fn sweep() -> Observation {
        (0..12)
            .map(|i| Measurement::new(i as f64 * PI / 6.0, 0.8, true))
            .collect()
    }

    #[test]
    fn test_new_rejects_zero_particles() {
        let result = SlamEngine::new(small_config(0));
        assert!(matches!(result, Err(SlamError::InvalidParticleCount(0))));
        let mut engine = SlamEngine::new(small_config(2)).unwrap();
        assert!(matches!(
            engine.initialize(0),
            Err(SlamError::InvalidParticleCount(0))
        ));
        assert_eq!(engine.num_particles(), 2);
    }
    #[test]
    fn test_initialize() {
        let engine = SlamEngine::new(small_config(8)).unwrap();
        assert_eq!(engine.num_particles(), 8);
        for particle in engine.particles() {
            assert_eq!(particle.pose, Pose::default());
            assert_approx_eq!(particle.weight, 0.125, 1e-15);
            assert!(particle.map.log_odds().iter().all(|&l| l == 0.0));
            assert_eq!(particle.map.len(), engine.grid().cell_count());
        }
        assert_approx_eq!(engine.effective_sample_size(), 8.0, 1e-9);
    }
    #[test]
    fn test_weights_sum_to_one_after_update() {
        for n in [1, 3, 7] {
            let mut engine = SlamEngine::new(small_config(n)).unwrap();
            let mut rng = StdRng::seed_from_u64(n as u64);
            for _ in 0..3 {
                let neff = engine.update(&sweep(), &Odometry::new(0.02, 0.01), &mut rng);
                let total: f64 = engine.particles().iter().map(|p| p.weight).sum();
                assert_approx_eq!(total, 1.0, 1e-9);
                assert!(neff >= 1.0 - 1e-9 && neff <= n as f64 + 1e-9);
            }
        }
    }
    #[test]
    fn test_effective_sample_size_bounds() {
        assert_approx_eq!(effective_sample_size(vec![0.25; 4]), 4.0, 1e-12);
        assert_approx_eq!(effective_sample_size(vec![1.0, 0.0, 0.0, 0.0]), 1.0, 1e-12);
        // raw weights are normalized first
        assert_approx_eq!(effective_sample_size(vec![3.0, 3.0]), 2.0, 1e-12);
        let neff = effective_sample_size(vec![0.1, 0.5, 0.2, 0.2]);
        assert!(neff > 1.0 && neff < 4.0);
        assert_eq!(effective_sample_size(vec![0.0; 3]), 0.0);
        assert_eq!(effective_sample_size(vec![f64::NAN, 1.0]), 0.0);
    }
    #[test]
    fn test_set_weights_checks_length() {
        let mut engine = SlamEngine::new(small_config(3)).unwrap();
        assert!(matches!(
            engine.set_weights(&[1.0]),
            Err(SlamError::LayoutMismatch { expected: 3, actual: 1 })
        ));
        engine.set_weights(&[0.1, 0.7, 0.2]).unwrap();
        assert_eq!(engine.strongest_index(), 1);
    }
    #[test]
    fn test_normalize_degenerate_weights() {
        let mut engine = SlamEngine::new(small_config(4)).unwrap();
        engine.set_weights(&[0.0; 4]).unwrap();
        engine.normalize_weights();
        for particle in engine.particles() {
            assert_approx_eq!(particle.weight, 0.25, 1e-15);
        }
    }
    #[test]
    fn test_resample_concentrated_distribution() {
        let n = 50;
        let mut engine = SlamEngine::new(small_config(n)).unwrap();
        for (i, particle) in engine.particles_mut().iter_mut().enumerate() {
            particle.pose = Pose::new(i as f64 * 0.01, 0.0, 0.0);
        }
        let mut weights = vec![1e-6; n];
        weights[17] = 1.0;
        engine.set_weights(&weights).unwrap();
        engine.normalize_weights();
        let mut rng = StdRng::seed_from_u64(5);
        engine.resample(&mut rng);
        let target = Pose::new(0.17, 0.0, 0.0);
        let copies = engine
            .particles()
            .iter()
            .filter(|p| p.pose == target)
            .count();
        assert!(copies >= n - 2, "only {} copies", copies);
        for particle in engine.particles() {
            assert_approx_eq!(particle.weight, 1.0 / n as f64, 1e-15);
        }
        assert_eq!(engine.strongest_particle().pose, target);
    }
    #[test]
    fn test_resampled_maps_are_independent() {
        let mut engine = SlamEngine::new(small_config(3)).unwrap();
        engine.set_weights(&[1.0, 0.0, 0.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        engine.resample(&mut rng);
        engine.particles_mut()[0].map.log_odds_mut()[0] = 5.0;
        assert_eq!(engine.particles()[1].map.log_odds()[0], 0.0);
        assert_eq!(engine.particles()[2].map.log_odds()[0], 0.0);
    }
    #[test]
    fn test_resample_degenerate_weights_keeps_particles() {
        let mut engine = SlamEngine::new(small_config(3)).unwrap();
        for (i, particle) in engine.particles_mut().iter_mut().enumerate() {
            particle.pose = Pose::new(i as f64, 0.0, 0.0);
            particle.weight = f64::NAN;
        }
        let mut rng = StdRng::seed_from_u64(1);
        engine.resample(&mut rng);
        for (i, particle) in engine.particles().iter().enumerate() {
            assert_eq!(particle.pose.x, i as f64);
            assert_approx_eq!(particle.weight, 1.0 / 3.0, 1e-15);
        }
    }
    #[test]
    fn test_weighted_pose_linear_average() {
        let mut engine = SlamEngine::new(small_config(2)).unwrap();
        engine.particles_mut()[0].pose = Pose::new(1.0, 0.0, 0.2);
        engine.particles_mut()[1].pose = Pose::new(3.0, 2.0, 0.4);
        engine.set_weights(&[0.75, 0.25]).unwrap();
        let pose = engine.weighted_pose();
        assert_approx_eq!(pose.x, 1.5, 1e-12);
        assert_approx_eq!(pose.y, 0.5, 1e-12);
        assert_approx_eq!(pose.theta, 0.25, 1e-12);
    }
    #[test]
    fn test_weighted_pose_heading_is_not_a_circular_mean() {
        let mut engine = SlamEngine::new(small_config(2)).unwrap();
        engine.particles_mut()[0].pose = Pose::new(0.0, 0.0, PI - 0.1);
        engine.particles_mut()[1].pose = Pose::new(0.0, 0.0, -PI + 0.1);
        // both headings point almost backwards, yet the average points forwards
        let pose = engine.weighted_pose();
        assert_approx_eq!(pose.theta, 0.0, 1e-12);
        // wrapping happens per particle before averaging
        engine.particles_mut()[1].pose = Pose::new(0.0, 0.0, PI + 0.1 + 2.0 * PI);
        let pose = engine.weighted_pose();
        assert_approx_eq!(pose.theta, 0.0, 1e-9);
    }
    #[test]
    fn test_large_rotation_skips_map_update() {
        let mut engine = SlamEngine::new(small_config(3)).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let turn = Odometry::new(0.01, 40.0_f64.to_radians());
        assert!(engine.integration_skipped(&turn));
        let report = engine.step(&sweep(), &turn, &mut rng);
        assert!(!report.integrated);
        for particle in engine.particles() {
            assert!(particle.map.log_odds().iter().all(|&l| l == 0.0));
        }
        let report = engine.step(&sweep(), &Odometry::new(0.01, 0.1), &mut rng);
        assert!(report.integrated);
        for particle in engine.particles() {
            assert!(particle.map.log_odds().iter().any(|&l| l > 0.0));
        }
    }
    #[test]
    fn test_reset_restores_initial_state() {
        let mut engine = SlamEngine::new(small_config(4)).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        engine.update(&sweep(), &Odometry::new(0.05, 0.0), &mut rng);
        engine.reset();
        assert_eq!(engine.num_particles(), 4);
        assert_eq!(engine.strongest_index(), 0);
        for particle in engine.particles() {
            assert_eq!(particle.pose, Pose::default());
            assert_approx_eq!(particle.weight, 0.25, 1e-15);
            assert!(particle.map.log_odds().iter().all(|&l| l == 0.0));
        }
    }
    #[test]
    fn test_step_resamples_below_threshold() {
        let mut config = small_config(4);
        config.resample_threshold = Some(1.0);
        let mut engine = SlamEngine::new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        // the first sweep sees an unknown map, so every particle scores the same
        let first = engine.step(&sweep(), &Odometry::new(0.0, 0.0), &mut rng);
        assert_approx_eq!(first.neff, 4.0, 1e-9);
        assert!(!first.resampled);

        let mut config = small_config(4);
        config.resample_threshold = None;
        let mut engine = SlamEngine::new(config).unwrap();
        engine.step(&sweep(), &Odometry::new(0.0, 0.0), &mut rng);
        let second = engine.step(&sweep(), &Odometry::new(0.05, 0.0), &mut rng);
        assert!(!second.resampled);
    }
    #[test]
    fn test_update_is_reproducible() {
        let run = |seed| {
            let mut engine = SlamEngine::new(small_config(5)).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..3 {
                engine.step(&sweep(), &Odometry::new(0.03, 0.02), &mut rng);
            }
            engine.weighted_pose()
        };
        assert_eq!(run(21), run(21));
    }
    #[test]
    fn test_config_yaml() {
        let config =
            SlamConfig::from_yaml("num_particles: 20\ngrid:\n  resolution: 0.1\n").unwrap();
        assert_eq!(config.num_particles, 20);
        assert_eq!(config.grid.resolution, 0.1);
        assert_eq!(config.grid.width, 6.0);
        assert_eq!(config.matcher, ScanMatcherConfig::default());
        let round_trip = SlamConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(round_trip, config);
        assert!(matches!(
            SlamConfig::from_yaml("num_particles: 0\n"),
            Err(SlamError::InvalidParticleCount(0))
        ));
        assert!(matches!(
            SlamConfig::from_yaml("grid:\n  resolution: -1.0\n"),
            Err(SlamError::InvalidGeometry(_))
        ));
        assert!(matches!(
            SlamConfig::from_yaml("matcher:\n  rotation_step: 0.0\n"),
            Err(SlamError::InvalidConfig(_))
        ));
        assert!(matches!(
            SlamConfig::from_yaml("geometry:\n  ticks_per_revolution: 0\n"),
            Err(SlamError::InvalidConfig(_))
        ));
        assert!(matches!(
            SlamConfig::from_yaml("noise:\n  center_gain: -1.0\n"),
            Err(SlamError::InvalidConfig(_))
        ));
        assert!(matches!(
            SlamConfig::from_yaml("num_particles: [1, 2]\n"),
            Err(SlamError::Yaml(_))
        ));
        assert!(matches!(
            SlamConfig::load("/nonexistent/gridslam.yaml"),
            Err(SlamError::Io(_))
        ));
    }
}
