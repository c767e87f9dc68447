//! Gaussian smoothing used to turn a thresholded occupancy grid into a likelihood field.
//!
//! The blur is separable: a horizontal pass followed by a vertical pass with the same 1-D
//! kernel. Samples outside the grid contribute nothing (zero padding, no renormalization), so
//! cells close to the border come out slightly darker than interior cells.

/// Generate a normalized 1-D Gaussian kernel with `2 * radius + 1` taps.
///
/// # Arguments
/// * `sigma` - standard deviation in cells
/// * `radius` - number of taps on each side of the center
///
/// # Returns
/// * A symmetric kernel whose taps sum to one. A non-positive or non-finite `sigma` gives the
///   identity kernel (a single centered one).
///
/// # Example
/// ```rust
/// use gridslam::kernel::gaussian_kernel;
///
/// let kernel = gaussian_kernel(1.0, 3);
/// assert_eq!(kernel.len(), 7);
/// assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-12);
/// ```
pub fn gaussian_kernel(sigma: f64, radius: usize) -> Vec<f64> {
    let size = 2 * radius + 1;
    if !(sigma > 0.0 && sigma.is_finite()) {
        let mut identity = vec![0.0; size];
        identity[radius] = 1.0;
        return identity;
    }
    let coeff = 2.0 * sigma * sigma;
    let mut values: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / coeff).exp()
        })
        .collect();
    let total: f64 = values.iter().sum();
    for v in values.iter_mut() {
        *v /= total;
    }
    values
}

/// Kernel radius covering three standard deviations
pub fn kernel_radius(sigma: f64) -> usize {
    if sigma > 0.0 && sigma.is_finite() {
        (3.0 * sigma).ceil() as usize
    } else {
        0
    }
}

/// Blur a row-major `width` x `height` buffer with a separable kernel.
///
/// `input` and `output` must both hold `width * height` values; `kernel` must have odd length.
pub fn separable_blur(
    input: &[f64],
    output: &mut [f64],
    width: usize,
    height: usize,
    kernel: &[f64],
) {
    debug_assert_eq!(input.len(), width * height);
    debug_assert_eq!(output.len(), width * height);
    debug_assert_eq!(kernel.len() % 2, 1);

    let k = (kernel.len() / 2) as i64;
    let (w, h) = (width as i64, height as i64);
    let mut horizontal = vec![0.0; input.len()];

    for y in 0..h {
        let row = y * w;
        for x in 0..w {
            let mut total = 0.0;
            for i in -k..=k {
                let x2 = x + i;
                if x2 >= 0 && x2 < w {
                    total += kernel[(i + k) as usize] * input[(row + x2) as usize];
                }
            }
            horizontal[(row + x) as usize] = total;
        }
    }

    for y in 0..h {
        for x in 0..w {
            let mut total = 0.0;
            for i in -k..=k {
                let y2 = y + i;
                if y2 >= 0 && y2 < h {
                    total += kernel[(i + k) as usize] * horizontal[(x + y2 * w) as usize];
                }
            }
            output[(x + y * w) as usize] = total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_kernel_is_symmetric_and_normalized() {
        let kernel = gaussian_kernel(1.5, 5);
        assert_eq!(kernel.len(), 11);
        assert_approx_eq!(kernel.iter().sum::<f64>(), 1.0, 1e-12);
        for i in 0..5 {
            assert_approx_eq!(kernel[i], kernel[10 - i], 1e-15);
            assert!(kernel[i] < kernel[i + 1]);
        }
    }
    #[test]
    fn test_degenerate_sigma_gives_identity() {
        assert_eq!(gaussian_kernel(0.0, 1), vec![0.0, 1.0, 0.0]);
        assert_eq!(gaussian_kernel(f64::NAN, 0), vec![1.0]);
        assert_eq!(kernel_radius(0.0), 0);
    }
    #[test]
    fn test_kernel_radius() {
        assert_eq!(kernel_radius(1.0), 3);
        assert_eq!(kernel_radius(1.1), 4);
    }
    #[test]
    fn test_blur_preserves_constant_interior() {
        let (w, h) = (15, 15);
        let input = vec![0.5; w * h];
        let mut output = vec![0.0; w * h];
        let kernel = gaussian_kernel(1.0, 3);
        separable_blur(&input, &mut output, w, h, &kernel);
        assert_approx_eq!(output[7 + 7 * w], 0.5, 1e-12);
        // zero padding darkens the corners
        assert!(output[0] < 0.5);
    }
    #[test]
    fn test_blur_spreads_single_cell() {
        let (w, h) = (9, 9);
        let mut input = vec![0.0; w * h];
        input[4 + 4 * w] = 1.0;
        let mut output = vec![0.0; w * h];
        let kernel = gaussian_kernel(1.0, 3);
        separable_blur(&input, &mut output, w, h, &kernel);
        assert_approx_eq!(output.iter().sum::<f64>(), 1.0, 1e-12);
        assert_approx_eq!(output[4 + 4 * w], kernel[3] * kernel[3], 1e-15);
        assert_approx_eq!(output[5 + 4 * w], output[4 + 5 * w], 1e-15);
        assert!(output[4 + 4 * w] > output[5 + 4 * w]);
    }
    #[test]
    fn test_identity_kernel_copies_input() {
        let input: Vec<f64> = (0..12).map(|v| v as f64).collect();
        let mut output = vec![0.0; 12];
        separable_blur(&input, &mut output, 4, 3, &[1.0]);
        assert_eq!(input, output);
    }
}
