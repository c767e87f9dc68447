//! Odometry motion model for a differential-drive robot.
//!
//! The robot reports how far its center travelled and how much it turned since the previous
//! sweep. [`Odometry::apply`] draws a noisy version of that increment and moves a pose by it:
//! heading first, then the distance along the new heading. Noise grows with the size of the
//! reported motion.
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SlamError};
use crate::{Pose, wrap_angle};

/// Physical parameters of the drive train.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotGeometry {
    /// Distance between the two wheels in meters
    pub wheel_track_width: f64,
    /// Wheel diameter in meters
    pub wheel_diameter: f64,
    /// Encoder ticks per full wheel revolution
    pub ticks_per_revolution: u32,
}

impl Default for RobotGeometry {
    fn default() -> Self {
        RobotGeometry {
            wheel_track_width: 0.22,
            wheel_diameter: 0.063,
            ticks_per_revolution: 32 * 30,
        }
    }
}

impl RobotGeometry {
    /// Distance travelled by a wheel for the given tick count
    pub fn ticks_to_distance(&self, ticks: i32) -> f64 {
        ticks as f64 / self.ticks_per_revolution as f64 * std::f64::consts::PI * self.wheel_diameter
    }
    /// Rejects geometry that would turn encoder ticks into infinite or NaN increments.
    pub fn validate(&self) -> Result<()> {
        if !(self.wheel_track_width > 0.0 && self.wheel_track_width.is_finite()) {
            return Err(SlamError::InvalidConfig(format!(
                "wheel track width must be positive, got {}",
                self.wheel_track_width
            )));
        }
        if !(self.wheel_diameter > 0.0 && self.wheel_diameter.is_finite()) {
            return Err(SlamError::InvalidConfig(format!(
                "wheel diameter must be positive, got {}",
                self.wheel_diameter
            )));
        }
        if self.ticks_per_revolution == 0 {
            return Err(SlamError::InvalidConfig(
                "ticks per revolution must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Standard deviation model, `sd = base + gain * |delta|` for each of the two components.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionNoise {
    /// Translation noise floor in meters
    pub center_base: f64,
    /// Translation noise per meter travelled
    pub center_gain: f64,
    /// Rotation noise floor in radians
    pub theta_base: f64,
    /// Rotation noise per radian turned
    pub theta_gain: f64,
}

impl Default for MotionNoise {
    fn default() -> Self {
        // +/- 2 sd covers about 95% of the samples
        MotionNoise {
            center_base: 0.01 / 2.0,
            center_gain: 0.05 / 2.0,
            theta_base: 5.0_f64.to_radians(),
            theta_gain: 0.1,
        }
    }
}

impl MotionNoise {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("center_base", self.center_base),
            ("center_gain", self.center_gain),
            ("theta_base", self.theta_base),
            ("theta_gain", self.theta_gain),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(SlamError::InvalidConfig(format!(
                    "motion noise {} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Odometry increment between two sweeps, together with its noise model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    /// Distance travelled by the robot center in meters, positive forward
    pub delta_center: f64,
    /// Heading change in radians, positive counter-clockwise
    pub delta_theta: f64,
    /// Standard deviation of the travelled distance
    pub sd_center: f64,
    /// Standard deviation of the heading change
    pub sd_theta: f64,
}

impl Odometry {
    /// Create an increment with the default noise model.
    ///
    /// # Example
    /// ```rust
    /// use gridslam::motion::Odometry;
    ///
    /// let odometry = Odometry::new(0.1, 0.0);
    /// assert!((odometry.sd_center - (0.005 + 0.025 * 0.1)).abs() < 1e-12);
    /// ```
    pub fn new(delta_center: f64, delta_theta: f64) -> Odometry {
        Odometry::with_noise(delta_center, delta_theta, &MotionNoise::default())
    }
    pub fn with_noise(delta_center: f64, delta_theta: f64, noise: &MotionNoise) -> Odometry {
        Odometry {
            delta_center,
            delta_theta,
            sd_center: noise.center_base + noise.center_gain * delta_center.abs(),
            sd_theta: noise.theta_base + noise.theta_gain * delta_theta.abs(),
        }
    }
    /// Build an increment from left and right encoder tick counts.
    ///
    /// # Arguments
    /// * `left_ticks`, `right_ticks` - ticks counted since the previous sweep
    /// * `geometry` - wheel diameter, track width and encoder resolution
    /// * `noise` - standard deviation model
    ///
    /// # Example
    /// ```rust
    /// use gridslam::motion::{MotionNoise, Odometry, RobotGeometry};
    ///
    /// let geometry = RobotGeometry::default();
    /// let odometry = Odometry::from_ticks(960, 960, &geometry, &MotionNoise::default());
    /// // one full wheel revolution straight ahead
    /// assert!((odometry.delta_center - std::f64::consts::PI * 0.063).abs() < 1e-12);
    /// assert_eq!(odometry.delta_theta, 0.0);
    /// ```
    pub fn from_ticks(
        left_ticks: i32,
        right_ticks: i32,
        geometry: &RobotGeometry,
        noise: &MotionNoise,
    ) -> Odometry {
        let d_left = geometry.ticks_to_distance(left_ticks);
        let d_right = geometry.ticks_to_distance(right_ticks);
        let delta_center = (d_left + d_right) / 2.0;
        let delta_theta = (d_right - d_left) / geometry.wheel_track_width;
        Odometry::with_noise(delta_center, delta_theta, noise)
    }
    /// Sample a noisy version of this increment and apply it to `pose`.
    ///
    /// The heading is updated first and wrapped into `(-PI, PI]`; the position then advances
    /// along the new heading. When the reported `delta_center` is exactly zero no noise is
    /// drawn at all and both components are taken as zero, even if `delta_theta` is not.
    pub fn apply<R: Rng + ?Sized>(&self, pose: &Pose, rng: &mut R) -> Pose {
        // TODO: in-place rotations (delta_center == 0, delta_theta != 0) are dropped here; decide
        // whether they should be sampled like any other motion.
        let (d, theta) = if self.delta_center == 0.0 {
            (0.0, 0.0)
        } else {
            (
                sample_normal(self.delta_center, self.sd_center, rng),
                sample_normal(self.delta_theta, self.sd_theta, rng),
            )
        };
        let heading = wrap_angle(pose.theta + theta);
        Pose::new(
            pose.x + d * heading.cos(),
            pose.y + d * heading.sin(),
            heading,
        )
    }
    /// Apply the reported increment without any noise.
    pub fn apply_exact(&self, pose: &Pose) -> Pose {
        let heading = wrap_angle(pose.theta + self.delta_theta);
        Pose::new(
            pose.x + self.delta_center * heading.cos(),
            pose.y + self.delta_center * heading.sin(),
            heading,
        )
    }
}

fn sample_normal<R: Rng + ?Sized>(mean: f64, std_dev: f64, rng: &mut R) -> f64 {
    match Normal::new(mean, std_dev) {
        Ok(normal) => normal.sample(rng),
        Err(_) => mean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f64::consts::PI;

    #[test]
    fn test_ticks_to_odometry() {
        let geometry = RobotGeometry::default();
        let noise = MotionNoise::default();
        let odometry = Odometry::from_ticks(-480, 480, &geometry, &noise);
        let wheel = 0.5 * PI * 0.063;
        assert_approx_eq!(odometry.delta_center, 0.0, 1e-12);
        assert_approx_eq!(odometry.delta_theta, 2.0 * wheel / 0.22, 1e-12);
        let odometry = Odometry::from_ticks(100, 300, &geometry, &noise);
        let d_left = 100.0 / 960.0 * PI * 0.063;
        let d_right = 300.0 / 960.0 * PI * 0.063;
        assert_approx_eq!(odometry.delta_center, (d_left + d_right) / 2.0, 1e-12);
        assert_approx_eq!(odometry.delta_theta, (d_right - d_left) / 0.22, 1e-12);
    }
    #[test]
    fn test_geometry_and_noise_validation() {
        assert!(RobotGeometry::default().validate().is_ok());
        assert!(MotionNoise::default().validate().is_ok());
        let no_ticks = RobotGeometry {
            ticks_per_revolution: 0,
            ..RobotGeometry::default()
        };
        assert!(matches!(no_ticks.validate(), Err(SlamError::InvalidConfig(_))));
        let no_track = RobotGeometry {
            wheel_track_width: 0.0,
            ..RobotGeometry::default()
        };
        assert!(no_track.validate().is_err());
        let no_wheel = RobotGeometry {
            wheel_diameter: f64::NAN,
            ..RobotGeometry::default()
        };
        assert!(no_wheel.validate().is_err());
        let negative = MotionNoise {
            theta_gain: -0.1,
            ..MotionNoise::default()
        };
        assert!(negative.validate().is_err());
        let infinite = MotionNoise {
            center_base: f64::INFINITY,
            ..MotionNoise::default()
        };
        assert!(infinite.validate().is_err());
    }
    #[test]
    fn test_noise_scales_with_motion() {
        let still = Odometry::new(0.0, 0.0);
        let moving = Odometry::new(-0.4, 0.5);
        assert_approx_eq!(still.sd_center, 0.005, 1e-12);
        assert_approx_eq!(still.sd_theta, 5.0_f64.to_radians(), 1e-12);
        assert_approx_eq!(moving.sd_center, 0.005 + 0.025 * 0.4, 1e-12);
        assert_approx_eq!(moving.sd_theta, 5.0_f64.to_radians() + 0.05, 1e-12);
    }
    #[test]
    fn test_zero_center_suppresses_noise() {
        let mut rng = StdRng::seed_from_u64(7);
        let pose = Pose::new(0.3, -0.2, 1.0);
        let odometry = Odometry::new(0.0, 0.8);
        for _ in 0..20 {
            let moved = odometry.apply(&pose, &mut rng);
            assert_eq!(moved, pose);
        }
    }
    #[test]
    fn test_apply_moves_along_new_heading() {
        let odometry = Odometry::new(1.0, PI / 2.0);
        let moved = odometry.apply_exact(&Pose::new(0.0, 0.0, 0.0));
        assert_approx_eq!(moved.x, 0.0, 1e-12);
        assert_approx_eq!(moved.y, 1.0, 1e-12);
        assert_approx_eq!(moved.theta, PI / 2.0, 1e-12);
    }
    #[test]
    fn test_apply_wraps_heading() {
        let odometry = Odometry::new(0.1, 0.4);
        let moved = odometry.apply_exact(&Pose::new(0.0, 0.0, PI - 0.1));
        assert_approx_eq!(moved.theta, -PI + 0.3, 1e-12);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let sampled = odometry.apply(&Pose::new(0.0, 0.0, PI - 0.1), &mut rng);
            assert!(sampled.theta > -PI && sampled.theta <= PI);
        }
    }
    #[test]
    fn test_sampled_motion_is_centered_on_report() {
        let mut rng = StdRng::seed_from_u64(42);
        let odometry = Odometry::new(0.2, 0.1);
        let start = Pose::default();
        let n = 4000;
        let (mut sum_d, mut sum_t) = (0.0, 0.0);
        for _ in 0..n {
            let moved = odometry.apply(&start, &mut rng);
            sum_d += moved.x.hypot(moved.y);
            sum_t += moved.theta;
        }
        assert_approx_eq!(sum_d / n as f64, 0.2, 0.002);
        assert_approx_eq!(sum_t / n as f64, 0.1, 0.01);
    }
    #[test]
    fn test_apply_is_reproducible_with_seed() {
        let odometry = Odometry::new(0.05, -0.02);
        let mut a = StdRng::seed_from_u64(11);
        let mut b = StdRng::seed_from_u64(11);
        let pose = Pose::new(1.0, 2.0, 0.3);
        assert_eq!(odometry.apply(&pose, &mut a), odometry.apply(&pose, &mut b));
    }
}
