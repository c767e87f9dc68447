//! Inverse sensor model for a single-beam range sensor
//!
//! The model maps a hypothesized distance along a beam and the distance the sensor actually
//! reported to one of three occupancy probabilities. Distances may be given in any unit as long
//! as both distances and the tolerance share it; the grid calls it with cell units.
use serde::{Deserialize, Serialize};

use crate::error::{Result, SlamError};

/// Probability assigned to cells the beam passed through
pub const P_FREE: f64 = 0.30;
/// Probability assigned to cells the beam carries no information about
pub const P_PRIOR: f64 = 0.50;
/// Probability assigned to cells inside the hit band around the measured distance
pub const P_OCCUPIED: f64 = 0.90;

/// Parameters describing the range sensor and how its readings are scored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Maximum sensing range in meters. Readings beyond it are treated as "no echo".
    pub max_range: f64,
    /// Width of the occupied band around a hit, in grid cells
    pub hit_tolerance_cells: f64,
    /// Extra cells the rasterizer walks past a beam's end point
    pub additional_steps: usize,
    /// Weight of the likelihood field in the beam-endpoint mixture, `z_random = 1 - z_hit`
    pub z_hit: f64,
    /// Likelihood values this close to 0.5 count as unexplored
    pub unknown_epsilon: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            max_range: 4.0,
            hit_tolerance_cells: 2.0,
            additional_steps: 2,
            z_hit: 0.8,
            unknown_epsilon: 1e-9,
        }
    }
}

impl SensorConfig {
    pub fn z_random(&self) -> f64 {
        1.0 - self.z_hit
    }
    /// Density of a uniformly random reading over the sensor range
    pub fn uniform_density(&self) -> f64 {
        1.0 / self.max_range
    }
    pub fn validate(&self) -> Result<()> {
        if !(self.max_range > 0.0 && self.max_range.is_finite()) {
            return Err(SlamError::InvalidConfig(format!(
                "max range must be positive, got {}",
                self.max_range
            )));
        }
        if !(self.hit_tolerance_cells >= 0.0) {
            return Err(SlamError::InvalidConfig(format!(
                "hit tolerance must be non-negative, got {}",
                self.hit_tolerance_cells
            )));
        }
        if !(0.0..=1.0).contains(&self.z_hit) {
            return Err(SlamError::InvalidConfig(format!(
                "z_hit must lie in [0, 1], got {}",
                self.z_hit
            )));
        }
        Ok(())
    }
}

/// Probability that the cell at `current_distance` along a beam is occupied.
///
/// For a miss (no echo) every cell before `measured_distance` is free and the rest stay at the
/// prior. For a hit, cells closer than `measured_distance - tolerance / 2` are free, cells inside
/// the `tolerance` wide band are occupied and cells strictly beyond it stay at the prior.
///
/// # Arguments
/// * `current_distance` - distance from the beam origin to the cell under consideration
/// * `measured_distance` - distance reported by the sensor
/// * `was_hit` - whether the sensor detected an obstacle
/// * `tolerance` - width of the occupied band, must be non-negative
///
/// # Example
/// ```rust
/// use gridslam::sensor::{inverse_sensor_model, P_FREE, P_OCCUPIED, P_PRIOR};
///
/// assert_eq!(inverse_sensor_model(10.0, 10.0, true, 2.0), P_OCCUPIED);
/// assert_eq!(inverse_sensor_model(2.0, 10.0, true, 2.0), P_FREE);
/// assert_eq!(inverse_sensor_model(20.0, 10.0, true, 2.0), P_PRIOR);
/// assert_eq!(inverse_sensor_model(20.0, 10.0, false, 2.0), P_PRIOR);
/// ```
pub fn inverse_sensor_model(
    current_distance: f64,
    measured_distance: f64,
    was_hit: bool,
    tolerance: f64,
) -> f64 {
    if !was_hit {
        return if current_distance < measured_distance {
            P_FREE
        } else {
            P_PRIOR
        };
    }
    let half_band = tolerance / 2.0;
    if current_distance < measured_distance - half_band {
        P_FREE
    } else if current_distance > measured_distance + half_band {
        P_PRIOR
    } else {
        P_OCCUPIED
    }
}
