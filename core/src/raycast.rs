//! Grid traversal for sensor beams.
//!
//! [`RayIterator`] walks every grid cell touched by a floating point segment, in order from the
//! start point to the end point, using an amortized constant-time stepping scheme with an
//! accumulated error term (see <https://playtechs.blogspot.com/2007/03/raytracing-on-grid.html>).
//!
//! ```text
//! From (0.5, 0.5) to (3.5, 2.5):
//!
//!     2 │       ■ ■
//!     1 │   ■ ■ ■
//!     0 ■ ■
//!       └──────────
//!        0 1 2 3
//! ```
//!
//! The walk can continue a fixed number of cells past the nominal end point so that the
//! inverse sensor model gets a chance to mark cells slightly behind a hit. It stops as soon as
//! it leaves the grid; there is no wraparound.
use std::iter::FusedIterator;

/// Iterator over the grid cells a segment passes through.
///
/// Coordinates are grid coordinates (cells, origin at the lower left corner of the grid). Each
/// visited cell is yielded exactly once as `(x, y)`.
#[derive(Clone, Debug)]
pub struct RayIterator {
    x: i64,
    y: i64,
    width: i64,
    height: i64,
    x_inc: i64,
    y_inc: i64,
    remaining: i64,
    dx: f64,
    dy: f64,
    error: f64,
}

impl RayIterator {
    /// Set up a walk from `(x0, y0)` to `(x1, y1)` on a `width` x `height` grid.
    ///
    /// # Arguments
    /// * `width`, `height` - grid bounds in cells
    /// * `x0`, `y0` - start point in grid coordinates
    /// * `x1`, `y1` - end point in grid coordinates
    /// * `additional_steps` - number of cells to keep walking after the end cell
    ///
    /// # Example
    /// ```rust
    /// use gridslam::raycast::RayIterator;
    ///
    /// let cells: Vec<(usize, usize)> = RayIterator::new(10, 10, 0.5, 0.5, 3.5, 0.5, 0).collect();
    /// assert_eq!(cells, vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
    /// ```
    pub fn new(
        width: usize,
        height: usize,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        additional_steps: usize,
    ) -> RayIterator {
        let mut ray = RayIterator {
            x: 0,
            y: 0,
            width: width as i64,
            height: height as i64,
            x_inc: 0,
            y_inc: 0,
            remaining: 0,
            dx: 0.0,
            dy: 0.0,
            error: 0.0,
        };
        if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
            return ray;
        }

        ray.dx = (x1 - x0).abs();
        ray.dy = (y1 - y0).abs();
        ray.x = x0.floor() as i64;
        ray.y = y0.floor() as i64;

        if ray.dx == 0.0 && ray.dy == 0.0 {
            // zero-length segment: only the start cell
            ray.remaining = 1;
            return ray;
        }

        // Step counts saturate for huge end points; the walk stops at the grid edge long before.
        ray.remaining = i64::try_from(additional_steps)
            .unwrap_or(i64::MAX)
            .saturating_add(1);

        // An infinite error on a degenerate axis forces every step onto the other axis.
        if ray.dx == 0.0 {
            ray.x_inc = 0;
            ray.error = f64::INFINITY;
        } else if x1 > x0 {
            ray.x_inc = 1;
            ray.remaining = ray
                .remaining
                .saturating_add((x1.floor() as i64).saturating_sub(ray.x));
            ray.error = (x0.floor() + 1.0 - x0) * ray.dy;
        } else {
            ray.x_inc = -1;
            ray.remaining = ray
                .remaining
                .saturating_add(ray.x.saturating_sub(x1.floor() as i64));
            ray.error = (x0 - x0.floor()) * ray.dy;
        }

        if ray.dy == 0.0 {
            ray.y_inc = 0;
            ray.error = f64::NEG_INFINITY;
        } else if y1 > y0 {
            ray.y_inc = 1;
            ray.remaining = ray
                .remaining
                .saturating_add((y1.floor() as i64).saturating_sub(ray.y));
            ray.error -= (y0.floor() + 1.0 - y0) * ray.dx;
        } else {
            ray.y_inc = -1;
            ray.remaining = ray
                .remaining
                .saturating_add(ray.y.saturating_sub(y1.floor() as i64));
            ray.error -= (y0 - y0.floor()) * ray.dx;
        }
        ray
    }

    fn in_bounds(&self) -> bool {
        self.x >= 0 && self.y >= 0 && self.x < self.width && self.y < self.height
    }
}

impl Iterator for RayIterator {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<(usize, usize)> {
        if self.remaining <= 0 || !self.in_bounds() {
            self.remaining = 0;
            return None;
        }
        let cell = (self.x as usize, self.y as usize);

        if self.error > 0.0 {
            self.y += self.y_inc;
            self.error -= self.dx;
        } else {
            self.x += self.x_inc;
            self.error += self.dy;
        }
        self.remaining -= 1;

        Some(cell)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining.max(0) as usize))
    }
}

impl FusedIterator for RayIterator {}
