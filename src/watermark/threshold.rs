//! Gaussian adaptive threshold over an 8-bit plane.
//!
//! Binarizes each pixel against a Gaussian-weighted local mean minus a
//! constant offset, with replicated borders. Window 11 / offset 2 are the
//! extraction defaults.

/// `mask[i] = src[i] > gauss_mean(window)[i] - offset`
pub fn adaptive_threshold(
    src: &[u8],
    width: usize,
    height: usize,
    window: usize,
    offset: f64,
) -> Vec<bool> {
    assert_eq!(src.len(), width * height, "plane length mismatch");
    assert!(window % 2 == 1 && window > 1, "window must be odd and > 1");

    let kernel = gaussian_kernel(window);
    let half = window / 2;

    // separable blur with replicate border: rows, then columns
    let mut rows = vec![0.0f64; src.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = clamp_index(x as isize + k as isize - half as isize, width);
                acc += weight * src[y * width + sx] as f64;
            }
            rows[y * width + x] = acc;
        }
    }

    let mut mask = vec![false; src.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = clamp_index(y as isize + k as isize - half as isize, height);
                acc += weight * rows[sy * width + x];
            }
            mask[y * width + x] = src[y * width + x] as f64 > acc - offset;
        }
    }
    mask
}

/// Normalized 1-D Gaussian, sigma chosen from the window the way image
/// libraries derive it: `0.3 * ((n - 1) * 0.5 - 1) + 0.8`.
fn gaussian_kernel(window: usize) -> Vec<f64> {
    let sigma = 0.3 * ((window as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (window / 2) as isize;
    let mut kernel: Vec<f64> = (-half..=half)
        .map(|i| (-((i * i) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}
