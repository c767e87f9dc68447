//! Occupancy grid SLAM toolbox built around a particle filter
//!
//! This crate estimates the trajectory of a small differential-drive robot and builds a 2-D
//! occupancy map of its surroundings from two noisy inputs: sweeps of a rotating range sensor and
//! wheel odometry increments. Every particle of the filter carries its own complete occupancy
//! grid together with a candidate pose; each cycle the pose is sampled from the odometry motion
//! model, refined by a brute-force local scan matcher against the particle's own likelihood
//! field, weighted by the observation likelihood, and finally used to fuse the sweep into the
//! particle's map.
//!
//! The crate neither talks to hardware nor renders anything. A caller feeds one
//! `(Observation, Odometry)` pair per cycle into [`slam::SlamEngine`] and reads back the
//! effective sample size, the particle set, the strongest particle and the weighted pose.
//!
//! Primarily built off of these crate dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): rigid-body transforms between the robot and world frames.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr):
//!   explicitly passed, seedable random sources for motion sampling and resampling.
//! - [`serde`](https://crates.io/crates/serde): configuration and simulation records.
//!
//! ## Coordinate conventions
//!
//! World coordinates are meters with the heading `theta` measured counter-clockwise from the
//! world x-axis. The robot frame has x pointing forward. Grid coordinates are
//! `(world - origin) / resolution`, so cell `(i, j)` covers
//! `[origin + i*resolution, origin + (i+1)*resolution)` on each axis and is stored at index
//! `i + j * width`.
//!
//! ## Log-odds
//!
//! Cell evidence is stored as log-odds, `l = ln(p / (1 - p))`. A fresh cell holds `0.0`, which is
//! `logit(0.5)`, i.e. unknown. Independent evidence is fused by addition.
use nalgebra::{Isometry2, Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::fmt::{self, Display};

pub mod error;
pub mod grid;
pub mod kernel;
pub mod logging;
pub mod motion;
pub mod observation;
pub mod raycast;
pub mod sensor;
pub mod sim;
pub mod slam;

pub use error::{Result, SlamError};

/// Robot position and heading in world coordinates.
///
/// A `Pose` is a plain value. Transforms such as the motion model, scan matching candidates and
/// deskewing always produce a new `Pose` instead of mutating an existing one, which keeps a
/// candidate under evaluation from ever aliasing a particle's committed pose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// X position in meters
    pub x: f64,
    /// Y position in meters
    pub y: f64,
    /// Heading in radians, counter-clockwise from the world x-axis
    pub theta: f64,
}

impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose {{ x: {:.3} m, y: {:.3} m, theta: {:.2} deg }}",
            self.x,
            self.y,
            self.theta.to_degrees()
        )
    }
}

impl Pose {
    /// Create a new pose from position and heading
    ///
    /// # Example
    /// ```rust
    /// use gridslam::Pose;
    /// let pose = Pose::new(1.0, 2.0, 0.5);
    /// assert_eq!(pose.x, 1.0);
    /// assert_eq!(pose.theta, 0.5);
    /// ```
    pub fn new(x: f64, y: f64, theta: f64) -> Pose {
        Pose { x, y, theta }
    }
    /// Returns a copy of this pose shifted by the given offsets. The heading is wrapped into
    /// `(-PI, PI]`.
    pub fn offset(&self, dx: f64, dy: f64, dtheta: f64) -> Pose {
        Pose {
            x: self.x + dx,
            y: self.y + dy,
            theta: wrap_angle(self.theta + dtheta),
        }
    }
    /// The rigid transform taking robot-frame points into the world frame.
    pub fn to_isometry(&self) -> Isometry2<f64> {
        Isometry2::new(Vector2::new(self.x, self.y), self.theta)
    }
    /// Transform a point given in the robot frame into world coordinates.
    ///
    /// # Arguments
    /// * `local_x` - forward offset in meters
    /// * `local_y` - leftward offset in meters
    ///
    /// # Example
    /// ```rust
    /// use gridslam::Pose;
    /// use std::f64::consts::FRAC_PI_2;
    ///
    /// let pose = Pose::new(1.0, 0.0, FRAC_PI_2);
    /// let world = pose.transform_point(2.0, 0.0);
    /// assert!((world.x - 1.0).abs() < 1e-12);
    /// assert!((world.y - 2.0).abs() < 1e-12);
    /// ```
    pub fn transform_point(&self, local_x: f64, local_y: f64) -> Point2<f64> {
        self.to_isometry()
            .transform_point(&Point2::new(local_x, local_y))
    }
    /// Euclidean distance between the positions of two poses
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Wrap an angle into the canonical range `(-PI, PI]`.
///
/// Non-finite input is returned unchanged.
///
/// # Example
/// ```rust
/// use gridslam::wrap_angle;
/// use std::f64::consts::PI;
///
/// assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
/// assert_eq!(wrap_angle(-PI), PI);
/// ```
pub fn wrap_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return angle;
    }
    let mut wrapped = angle % TAU;
    if wrapped <= -PI {
        wrapped += TAU;
    } else if wrapped > PI {
        wrapped -= TAU;
    }
    wrapped
}

/// Convert a probability to log-odds form, `ln(p / (1 - p))`.
pub fn logit(probability: f64) -> f64 {
    (probability / (1.0 - probability)).ln()
}

/// Convert a log-odds value back into a probability.
pub fn inv_logit(log_odds: f64) -> f64 {
    1.0 - 1.0 / (1.0 + log_odds.exp())
}
