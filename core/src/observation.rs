//! Range sweeps and their motion compensation.
//!
//! An [`Observation`] is one full revolution of the range sensor: an ordered list of polar
//! [`Measurement`]s. The order matters, since the robot keeps moving while the sensor sweeps and
//! the index of a reading inside the sweep tells how much of that motion to undo
//! ([`Observation::deskew`]).
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::Pose;
use crate::motion::Odometry;
use crate::sensor::SensorConfig;

/// A single range reading in the robot frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Beam angle in radians relative to the robot's forward axis
    pub angle: f64,
    /// Measured range in meters
    pub distance: f64,
    /// Whether the sensor detected an obstacle (false means the beam saw nothing in range)
    pub was_hit: bool,
    /// Cached end point, `distance * cos(angle)`
    pub local_x: f64,
    /// Cached end point, `distance * sin(angle)`
    pub local_y: f64,
}

impl Measurement {
    /// Create a measurement from a polar reading.
    ///
    /// # Example
    /// ```rust
    /// use gridslam::observation::Measurement;
    /// use std::f64::consts::FRAC_PI_2;
    ///
    /// let m = Measurement::new(FRAC_PI_2, 2.0, true);
    /// assert!(m.local_x.abs() < 1e-12);
    /// assert!((m.local_y - 2.0).abs() < 1e-12);
    /// ```
    pub fn new(angle: f64, distance: f64, was_hit: bool) -> Measurement {
        Measurement {
            angle,
            distance,
            was_hit,
            local_x: distance * angle.cos(),
            local_y: distance * angle.sin(),
        }
    }
    /// Create a measurement from an end point given in the robot frame.
    pub fn from_local(local_x: f64, local_y: f64, was_hit: bool) -> Measurement {
        Measurement {
            angle: local_y.atan2(local_x),
            distance: local_x.hypot(local_y),
            was_hit,
            local_x,
            local_y,
        }
    }
    /// World coordinates of the beam's end point when the robot is at `pose`.
    pub fn end_point(&self, pose: &Pose) -> Point2<f64> {
        pose.transform_point(self.local_x, self.local_y)
    }
}

/// One full sensor sweep.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    measurements: Vec<Measurement>,
}

impl Observation {
    pub fn new() -> Observation {
        Observation {
            measurements: Vec::new(),
        }
    }
    pub fn with_capacity(capacity: usize) -> Observation {
        Observation {
            measurements: Vec::with_capacity(capacity),
        }
    }
    pub fn push(&mut self, measurement: Measurement) {
        self.measurements.push(measurement);
    }
    /// Add a raw range reading.
    ///
    /// Readings beyond the sensor's maximum range mean the beam found nothing; they are stored
    /// as misses at exactly `max_range`. Everything else is a hit at the measured distance.
    ///
    /// # Example
    /// ```rust
    /// use gridslam::observation::Observation;
    /// use gridslam::sensor::SensorConfig;
    ///
    /// let config = SensorConfig::default();
    /// let mut obs = Observation::new();
    /// obs.push_range(0.0, 1.5, &config);
    /// obs.push_range(0.1, 9.0, &config);
    /// assert!(obs.measurements()[0].was_hit);
    /// assert!(!obs.measurements()[1].was_hit);
    /// assert_eq!(obs.measurements()[1].distance, config.max_range);
    /// ```
    pub fn push_range(&mut self, angle: f64, distance: f64, config: &SensorConfig) {
        if distance > config.max_range || !distance.is_finite() {
            self.push(Measurement::new(angle, config.max_range, false));
        } else {
            self.push(Measurement::new(angle, distance, true));
        }
    }
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Measurement> {
        self.measurements.iter()
    }
    /// Measurements that detected an obstacle
    pub fn hits(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements.iter().filter(|m| m.was_hit)
    }
    pub fn len(&self) -> usize {
        self.measurements.len()
    }
    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
    pub fn clear(&mut self) {
        self.measurements.clear();
    }
    /// Compensate every reading of this sweep for the robot motion reported by `odometry`.
    ///
    /// See [`Observation::deskew_with`].
    pub fn deskew(&self, odometry: &Odometry) -> Observation {
        self.deskew_with(odometry.delta_center, odometry.delta_theta)
    }
    /// Compensate every reading for motion `(delta_center, delta_theta)` that happened while the
    /// sweep was taken.
    ///
    /// Reading `i` of `n` is moved back by the time factor `-(n - i) / n`: its end point is
    /// rotated by `delta_theta * factor` and shifted along the local x-axis by
    /// `delta_center * factor`. A new observation is returned; `self` is left untouched.
    ///
    /// # Example
    /// ```rust
    /// use gridslam::observation::{Measurement, Observation};
    ///
    /// let sweep: Observation = vec![Measurement::new(0.0, 1.0, true); 2].into();
    /// let corrected = sweep.deskew_with(0.2, 0.0);
    /// // first reading is moved back by the full motion, second by half of it
    /// assert!((corrected.measurements()[0].local_x - 0.8).abs() < 1e-12);
    /// assert!((corrected.measurements()[1].local_x - 0.9).abs() < 1e-12);
    /// ```
    pub fn deskew_with(&self, delta_center: f64, delta_theta: f64) -> Observation {
        let n = self.measurements.len();
        self.measurements
            .iter()
            .enumerate()
            .map(|(i, m)| deskew_measurement(m, i, n, delta_center, delta_theta))
            .collect()
    }
}

/// Time factor for reading `index` of a sweep with `count` readings, in `[-1, 0)`.
pub fn time_factor(index: usize, count: usize) -> f64 {
    -((count - index) as f64) / count as f64
}

fn deskew_measurement(
    m: &Measurement,
    index: usize,
    count: usize,
    delta_center: f64,
    delta_theta: f64,
) -> Measurement {
    let factor = time_factor(index, count);
    let d_theta = delta_theta * factor;
    let d_x = delta_center * factor;
    let x = m.distance * (m.angle + d_theta).cos() + d_x;
    let y = m.distance * (m.angle + d_theta).sin();
    Measurement::from_local(x, y, m.was_hit)
}

impl From<Vec<Measurement>> for Observation {
    fn from(measurements: Vec<Measurement>) -> Self {
        Observation { measurements }
    }
}

impl FromIterator<Measurement> for Observation {
    fn from_iter<I: IntoIterator<Item = Measurement>>(iter: I) -> Self {
        Observation {
            measurements: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Observation {
    type Item = &'a Measurement;
    type IntoIter = std::slice::Iter<'a, Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.measurements.iter()
    }
}
