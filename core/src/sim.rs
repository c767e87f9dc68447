//! Synthetic environment and batch runs of the SLAM engine.
//!
//! This module provides:
//! - [`SimulatedRoom`], a rectangular room with optional box obstacles that produces range
//!   sweeps for any robot pose
//! - [`run_simulation`], which drives a [`SlamEngine`] along a scripted trajectory
//! - [`SlamResult`] and [`SlamRecord`] for storing and exporting the estimated trajectory next to
//!   the ground truth
use log::{debug, info};
use nalgebra::{Isometry2, Point2, Vector2};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::motion::Odometry;
use crate::observation::Observation;
use crate::sensor::SensorConfig;
use crate::slam::{SlamConfig, SlamEngine};
use crate::{Pose, wrap_angle};

/// Axis-aligned rectangle in world coordinates
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Obstacle {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Obstacle {
        Obstacle {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
    /// Parametric interval `[t_enter, t_exit]` along the ray `origin + t * direction` that lies
    /// inside the rectangle (slab method), or `None` if the line misses it.
    fn slab(&self, origin: &Point2<f64>, direction: &Vector2<f64>) -> Option<(f64, f64)> {
        let mut t_enter = f64::NEG_INFINITY;
        let mut t_exit = f64::INFINITY;
        for (o, d, lo, hi) in [
            (origin.x, direction.x, self.min_x, self.max_x),
            (origin.y, direction.y, self.min_y, self.max_y),
        ] {
            if d == 0.0 {
                if o < lo || o > hi {
                    return None;
                }
            } else {
                let t1 = (lo - o) / d;
                let t2 = (hi - o) / d;
                t_enter = t_enter.max(t1.min(t2));
                t_exit = t_exit.min(t1.max(t2));
            }
        }
        (t_enter <= t_exit).then_some((t_enter, t_exit))
    }
}

/// Closed rectangular room seen from the inside.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulatedRoom {
    pub walls: Obstacle,
    pub obstacles: Vec<Obstacle>,
}

impl SimulatedRoom {
    /// Room of the given size centered on the world origin.
    ///
    /// # Example
    /// ```rust
    /// use gridslam::Pose;
    /// use gridslam::sim::SimulatedRoom;
    ///
    /// let room = SimulatedRoom::new(4.0, 2.0);
    /// let d = room.ray_distance(&Pose::new(0.0, 0.0, 0.0));
    /// assert!((d - 2.0).abs() < 1e-12);
    /// ```
    pub fn new(width: f64, height: f64) -> SimulatedRoom {
        SimulatedRoom {
            walls: Obstacle::new(-width / 2.0, -height / 2.0, width / 2.0, height / 2.0),
            obstacles: Vec::new(),
        }
    }
    pub fn with_obstacle(mut self, obstacle: Obstacle) -> SimulatedRoom {
        self.obstacles.push(obstacle);
        self
    }
    /// Distance from the pose's position along its heading to the first surface.
    ///
    /// Returns `f64::INFINITY` if nothing is hit, which only happens from outside the room.
    pub fn ray_distance(&self, pose: &Pose) -> f64 {
        let origin = Point2::new(pose.x, pose.y);
        let direction = Vector2::new(pose.theta.cos(), pose.theta.sin());
        let mut nearest = match self.walls.slab(&origin, &direction) {
            Some((_, t_exit)) if t_exit >= 0.0 => t_exit,
            _ => f64::INFINITY,
        };
        for obstacle in &self.obstacles {
            if let Some((t_enter, t_exit)) = obstacle.slab(&origin, &direction) {
                let t = if t_enter >= 0.0 { t_enter } else { t_exit };
                if t >= 0.0 && t < nearest {
                    nearest = t;
                }
            }
        }
        nearest
    }
    /// Sweep of `beams` evenly spaced readings over a full revolution, starting straight ahead.
    /// Readings beyond the sensor range become misses at `max_range`.
    pub fn scan(&self, pose: &Pose, beams: usize, sensor: &SensorConfig) -> Observation {
        let mut observation = Observation::with_capacity(beams);
        for i in 0..beams {
            let angle = i as f64 * std::f64::consts::TAU / beams as f64;
            let beam = Pose::new(pose.x, pose.y, pose.theta + angle);
            observation.push_range(wrap_angle(angle), self.ray_distance(&beam), sensor);
        }
        observation
    }
    /// Like [`SimulatedRoom::scan`], with zero-mean Gaussian noise of `range_sd` meters added to
    /// every finite reading.
    pub fn scan_noisy<R: Rng + ?Sized>(
        &self,
        pose: &Pose,
        beams: usize,
        sensor: &SensorConfig,
        range_sd: f64,
        rng: &mut R,
    ) -> Observation {
        let noise = Normal::new(0.0, range_sd).ok();
        let mut observation = Observation::with_capacity(beams);
        for i in 0..beams {
            let angle = i as f64 * std::f64::consts::TAU / beams as f64;
            let beam = Pose::new(pose.x, pose.y, pose.theta + angle);
            let mut distance = self.ray_distance(&beam);
            if let (Some(noise), true) = (noise.as_ref(), distance.is_finite()) {
                distance = (distance + noise.sample(rng)).max(0.0);
            }
            observation.push_range(wrap_angle(angle), distance, sensor);
        }
        observation
    }
}

/// One motion command of a scripted run: true distance and heading change.
pub type Command = (f64, f64);

/// Script that drives slow loops: eight short moves straight ahead followed by two gentle turns.
pub fn loop_script(steps: usize) -> Vec<Command> {
    (0..steps)
        .map(|i| {
            if i % 10 < 8 {
                (0.04, 0.0)
            } else {
                (0.02, 20.0_f64.to_radians())
            }
        })
        .collect()
}

/// A single row of a simulated run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlamRecord {
    pub step: usize,
    pub truth_x: f64,
    pub truth_y: f64,
    pub truth_theta: f64,
    pub estimate_x: f64,
    pub estimate_y: f64,
    pub estimate_theta: f64,
    pub strongest_x: f64,
    pub strongest_y: f64,
    pub strongest_theta: f64,
    pub neff: f64,
    pub resampled: bool,
    pub integrated: bool,
}

impl SlamRecord {
    pub fn truth(&self) -> Pose {
        Pose::new(self.truth_x, self.truth_y, self.truth_theta)
    }
    pub fn estimate(&self) -> Pose {
        Pose::new(self.estimate_x, self.estimate_y, self.estimate_theta)
    }
    /// Distance between the weighted estimate and the true position
    pub fn position_error(&self) -> f64 {
        self.estimate().distance_to(&self.truth())
    }
}

/// Trajectory produced by [`run_simulation`].
#[derive(Clone, Debug, Default)]
pub struct SlamResult {
    pub records: Vec<SlamRecord>,
}

impl SlamResult {
    pub fn new() -> Self {
        SlamResult {
            records: Vec::new(),
        }
    }
    /// Writes the trajectory to a CSV file, one row per step with a header row.
    ///
    /// # Arguments
    /// * `path` - Path where the CSV file will be saved
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
    /// Reads a trajectory previously written by [`SlamResult::to_csv`].
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut result = SlamResult::new();
        for record in reader.deserialize() {
            result.records.push(record?);
        }
        Ok(result)
    }
    /// Largest position error over the run, `0.0` for an empty run
    pub fn max_position_error(&self) -> f64 {
        self.records
            .iter()
            .map(SlamRecord::position_error)
            .fold(0.0, f64::max)
    }
    /// Rigid transform taking world coordinates into the frame the map was built in.
    ///
    /// The first sweep lands on an empty map, where every scan matcher candidate ties and the
    /// estimate jumps to the corner of the search window. Everything after that is tracked
    /// relative to this displaced frame, so it is fixed by the first record. `None` for an
    /// empty run.
    pub fn map_frame(&self) -> Option<Isometry2<f64>> {
        let first = self.records.first()?;
        Some(first.estimate().to_isometry() * first.truth().to_isometry().inverse())
    }
    /// Position error of every step after moving the truth into the map frame.
    pub fn aligned_position_errors(&self) -> Vec<f64> {
        let Some(frame) = self.map_frame() else {
            return Vec::new();
        };
        self.records
            .iter()
            .map(|r| {
                let truth = frame * Point2::new(r.truth_x, r.truth_y);
                (truth - Point2::new(r.estimate_x, r.estimate_y)).norm()
            })
            .collect()
    }
    /// Largest aligned position error, `0.0` for an empty run
    pub fn max_aligned_error(&self) -> f64 {
        self.aligned_position_errors()
            .into_iter()
            .fold(0.0, f64::max)
    }
    pub fn resample_count(&self) -> usize {
        self.records.iter().filter(|r| r.resampled).count()
    }
}

/// Run the engine through a scripted trajectory inside `room`.
///
/// The true pose starts at the origin and follows every command exactly. Each step the engine
/// receives the commanded increment as odometry and a sweep of `beams` readings taken at the new
/// true pose, and runs [`SlamEngine::step`].
///
/// # Arguments
/// * `config` - engine configuration
/// * `room` - environment to scan
/// * `commands` - `(delta_center, delta_theta)` per step
/// * `beams` - readings per sweep
/// * `rng` - random source shared by the engine
///
/// # Returns
/// * One [`SlamRecord`] per command.
pub fn run_simulation<R: Rng + ?Sized>(
    config: &SlamConfig,
    room: &SimulatedRoom,
    commands: &[Command],
    beams: usize,
    rng: &mut R,
) -> Result<SlamResult> {
    let mut engine = SlamEngine::new(config.clone())?;
    let mut truth = Pose::default();
    let mut result = SlamResult::new();
    info!(
        "Simulating {} steps with {} particles and {} beams",
        commands.len(),
        engine.num_particles(),
        beams
    );
    for (step, &(delta_center, delta_theta)) in commands.iter().enumerate() {
        let odometry = Odometry::with_noise(delta_center, delta_theta, &config.noise);
        truth = odometry.apply_exact(&truth);
        let observation = room.scan(&truth, beams, &config.sensor);
        let report = engine.step(&observation, &odometry, rng);
        let estimate = engine.weighted_pose();
        let strongest = engine.strongest_particle().pose;
        debug!("step {}: truth {} estimate {}", step, truth, estimate);
        result.records.push(SlamRecord {
            step,
            truth_x: truth.x,
            truth_y: truth.y,
            truth_theta: truth.theta,
            estimate_x: estimate.x,
            estimate_y: estimate.y,
            estimate_theta: estimate.theta,
            strongest_x: strongest.x,
            strongest_y: strongest.y,
            strongest_theta: strongest.theta,
            neff: report.neff,
            resampled: report.resampled,
            integrated: report.integrated,
        });
    }
    Ok(result)
}
