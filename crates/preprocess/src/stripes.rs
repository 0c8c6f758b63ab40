//! Frequency-domain stripe removal.
//!
//! Periodic acquisition stripes show up as isolated peaks in the 2-D
//! spectrum. The stripe period is estimated from the 1-D spectrum of the
//! summed intensity profile, then the corresponding harmonics are notched
//! out of the full spectrum before transforming back.

use ndarray::Array2;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::fmt;
use std::str::FromStr;

use crate::PreprocessError;

/// Lowest profile-spectrum bin considered when locating the stripe
/// frequency; bins below this are dominated by the illumination envelope.
const FIRST_HARMONIC_MIN_BIN: usize = 10;
/// Radius of the notch zeroed around each harmonic peak.
const NOTCH_RADIUS: f64 = 5.0;

/// Orientation of the stripes to remove.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StripeDirection {
    /// Stripes run along image rows, repeating down the plane.
    Horizontal,
    /// Stripes run along image columns, repeating across the plane.
    Vertical,
}

impl fmt::Display for StripeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StripeDirection::Horizontal => write!(f, "horizontal"),
            StripeDirection::Vertical => write!(f, "vertical"),
        }
    }
}

impl FromStr for StripeDirection {
    type Err = PreprocessError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "horizontal" => Ok(StripeDirection::Horizontal),
            "vertical" => Ok(StripeDirection::Vertical),
            other => Err(PreprocessError::UnsupportedStripeDirection(
                other.to_string(),
            )),
        }
    }
}

/// Remove periodic stripes from a plane.
///
/// Returns the plane unchanged when it is too small to estimate a stripe
/// frequency or when no harmonic fits inside the spectrum.
#[must_use]
pub fn remove_stripes(plane: Array2<f64>, direction: StripeDirection) -> Array2<f64> {
    let (rows, cols) = plane.dim();
    if rows == 0 || cols == 0 {
        return plane;
    }

    let profile = match direction {
        StripeDirection::Horizontal => plane.sum_axis(ndarray::Axis(1)).to_vec(),
        StripeDirection::Vertical => plane.sum_axis(ndarray::Axis(0)).to_vec(),
    };
    let Some(first_harmonic) = first_harmonic(&profile) else {
        return plane;
    };

    let mut planner = FftPlanner::new();
    let mut spectrum = forward_fft2(&plane, &mut planner);
    let norm = (rows * cols) as f64;
    for bin in spectrum.iter_mut() {
        *bin /= norm;
    }

    let mut spectrum = fftshift(&spectrum, rows, cols);
    let center = (rows / 2, cols / 2);
    for (u, v) in harmonic_points(center, first_harmonic, direction, (rows, cols)) {
        notch(&mut spectrum, rows, cols, u, v);
    }
    let mut spectrum = ifftshift(&spectrum, rows, cols);

    inverse_fft2(&mut spectrum, rows, cols, &mut planner);
    Array2::from_shape_fn((rows, cols), |(r, c)| spectrum[r * cols + c].norm())
}

/// Index of the dominant bin in the profile spectrum, ignoring the
/// low-frequency envelope.
fn first_harmonic(profile: &[f64]) -> Option<usize> {
    let len = profile.len();
    let half = len / 2;
    if half < FIRST_HARMONIC_MIN_BIN + 1 {
        return None;
    }

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(len);
    let mut buffer: Vec<Complex<f64>> = profile.iter().map(|&v| Complex::new(v, 0.0)).collect();
    fft.process(&mut buffer);

    let mut best_bin = FIRST_HARMONIC_MIN_BIN;
    let mut best_magnitude = f64::NEG_INFINITY;
    for bin in FIRST_HARMONIC_MIN_BIN..=half {
        let magnitude = buffer[bin].norm() / len as f64;
        if magnitude > best_magnitude {
            best_magnitude = magnitude;
            best_bin = bin;
        }
    }
    Some(best_bin)
}

/// Shifted-spectrum coordinates of the harmonic peaks to suppress.
fn harmonic_points(
    center: (usize, usize),
    first_harmonic: usize,
    direction: StripeDirection,
    shape: (usize, usize),
) -> Vec<(isize, isize)> {
    let (center_u, center_v) = (center.0 as isize, center.1 as isize);
    let step = first_harmonic as isize;
    let along = match direction {
        StripeDirection::Horizontal => center.0,
        StripeDirection::Vertical => center.1,
    };
    let count = (along / first_harmonic) as isize;

    let mut points = Vec::new();
    for k in 1..count {
        let offset = k * step;
        match direction {
            StripeDirection::Horizontal => {
                points.push((center_u + offset, center_v));
                points.push((center_u - offset, center_v));
            }
            StripeDirection::Vertical => {
                points.push((center_u, center_v + offset));
                points.push((center_u, center_v - offset));
            }
        }
    }
    let (rows, cols) = (shape.0 as isize, shape.1 as isize);
    points.retain(|&(u, v)| u >= 0 && u < rows && v >= 0 && v < cols);
    points
}

/// Zero every bin within [`NOTCH_RADIUS`] of the given peak.
fn notch(spectrum: &mut [Complex<f64>], rows: usize, cols: usize, peak_u: isize, peak_v: isize) {
    let radius = NOTCH_RADIUS.ceil() as isize;
    let radius_sq = NOTCH_RADIUS * NOTCH_RADIUS;
    for du in -radius..=radius {
        for dv in -radius..=radius {
            let u = peak_u + du;
            let v = peak_v + dv;
            if u < 0 || u >= rows as isize || v < 0 || v >= cols as isize {
                continue;
            }
            let dist_sq = (du * du + dv * dv) as f64;
            if dist_sq <= radius_sq {
                spectrum[u as usize * cols + v as usize] = Complex::new(0.0, 0.0);
            }
        }
    }
}

fn forward_fft2(plane: &Array2<f64>, planner: &mut FftPlanner<f64>) -> Vec<Complex<f64>> {
    let (rows, cols) = plane.dim();
    let mut buffer: Vec<Complex<f64>> = plane.iter().map(|&v| Complex::new(v, 0.0)).collect();

    let row_fft = planner.plan_fft_forward(cols);
    for row in buffer.chunks_exact_mut(cols) {
        row_fft.process(row);
    }

    let col_fft = planner.plan_fft_forward(rows);
    let mut column = vec![Complex::new(0.0, 0.0); rows];
    for c in 0..cols {
        for r in 0..rows {
            column[r] = buffer[r * cols + c];
        }
        col_fft.process(&mut column);
        for r in 0..rows {
            buffer[r * cols + c] = column[r];
        }
    }
    buffer
}

fn inverse_fft2(buffer: &mut [Complex<f64>], rows: usize, cols: usize, planner: &mut FftPlanner<f64>) {
    let row_fft = planner.plan_fft_inverse(cols);
    for row in buffer.chunks_exact_mut(cols) {
        row_fft.process(row);
    }

    let col_fft = planner.plan_fft_inverse(rows);
    let mut column = vec![Complex::new(0.0, 0.0); rows];
    for c in 0..cols {
        for r in 0..rows {
            column[r] = buffer[r * cols + c];
        }
        col_fft.process(&mut column);
        for r in 0..rows {
            buffer[r * cols + c] = column[r];
        }
    }
}

fn roll2(
    buffer: &[Complex<f64>],
    rows: usize,
    cols: usize,
    shift_u: usize,
    shift_v: usize,
) -> Vec<Complex<f64>> {
    let mut out = vec![Complex::new(0.0, 0.0); buffer.len()];
    for r in 0..rows {
        let rr = (r + shift_u) % rows;
        for c in 0..cols {
            let cc = (c + shift_v) % cols;
            out[rr * cols + cc] = buffer[r * cols + c];
        }
    }
    out
}

/// Move the zero-frequency bin to the spectrum center.
fn fftshift(buffer: &[Complex<f64>], rows: usize, cols: usize) -> Vec<Complex<f64>> {
    roll2(buffer, rows, cols, rows / 2, cols / 2)
}

/// Undo [`fftshift`].
fn ifftshift(buffer: &[Complex<f64>], rows: usize, cols: usize) -> Vec<Complex<f64>> {
    roll2(buffer, rows, cols, rows - rows / 2, cols - cols / 2)
}
