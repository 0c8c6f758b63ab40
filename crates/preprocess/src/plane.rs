//! Per-plane filters: despeckle, pseudo-flatfield and the iterative
//! foreground mask.
//!
//! Everything operates on `f64` planes and preserves shape. Neighborhood
//! operations clamp at the plane border.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use ndarray::Array2;
use std::collections::HashSet;

use crate::stripes::{remove_stripes, StripeDirection};

/// Radius of the despeckle structuring element
pub const DESPECKLE_RADIUS: usize = 2;
/// Sigma of the flatfield estimation blur
pub const FLATFIELD_SIGMA: f64 = 5.0;
/// Radius of the mask-opening structuring element
const MASK_OPENING_RADIUS: usize = 3;
/// Iteration cap for the threshold search
const MAX_ITERATIONS: u32 = 100;
/// Background-fraction window the mask must land in, in percent
const MIN_PERCENT_ZEROS: f64 = 20.0;
const MAX_PERCENT_ZEROS: f64 = 95.0;
/// Relative threshold adjustment per iteration
const THRESHOLD_STEP: f64 = 0.15;

/// Offsets of a disk-shaped structuring element of the given radius.
fn disk_offsets(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if dy * dy + dx * dx <= r * r {
                offsets.push((dy, dx));
            }
        }
    }
    offsets
}

fn clamp_index(value: isize, len: usize) -> usize {
    value.clamp(0, len as isize - 1) as usize
}

fn min_filter(plane: &Array2<f64>, offsets: &[(isize, isize)]) -> Array2<f64> {
    let (rows, cols) = plane.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let mut out = f64::INFINITY;
        for &(dy, dx) in offsets {
            let rr = clamp_index(r as isize + dy, rows);
            let cc = clamp_index(c as isize + dx, cols);
            out = out.min(plane[[rr, cc]]);
        }
        out
    })
}

fn max_filter(plane: &Array2<f64>, offsets: &[(isize, isize)]) -> Array2<f64> {
    let (rows, cols) = plane.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let mut out = f64::NEG_INFINITY;
        for &(dy, dx) in offsets {
            let rr = clamp_index(r as isize + dy, rows);
            let cc = clamp_index(c as isize + dx, cols);
            out = out.max(plane[[rr, cc]]);
        }
        out
    })
}

/// Despeckle a plane with a grayscale opening (erosion then dilation)
/// using a disk structuring element.
///
/// Bright features smaller than the disk are removed; larger structure
/// survives.
#[must_use]
pub fn despeckle(plane: Array2<f64>, radius: usize) -> Array2<f64> {
    let offsets = disk_offsets(radius);
    let eroded = min_filter(&plane, &offsets);
    max_filter(&eroded, &offsets)
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma).round() as isize;
    let mut kernel = Vec::with_capacity((2 * radius + 1) as usize);
    let denom = 2.0 * sigma * sigma;
    for i in -radius..=radius {
        kernel.push((-((i * i) as f64) / denom).exp());
    }
    let sum: f64 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

fn reflect_index(index: isize, len: usize) -> usize {
    let len = len as isize;
    let mut i = index;
    // Half-sample symmetric reflection, repeated for huge kernels.
    loop {
        if i < 0 {
            i = -i - 1;
        } else if i >= len {
            i = 2 * len - i - 1;
        } else {
            return i as usize;
        }
    }
}

/// Separable Gaussian blur with reflected boundaries.
fn gaussian_blur(plane: &Array2<f64>, sigma: f64) -> Array2<f64> {
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;
    let (rows, cols) = plane.dim();

    let mut horizontal = Array2::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let cc = reflect_index(c as isize + k as isize - radius, cols);
                acc += weight * plane[[r, cc]];
            }
            horizontal[[r, c]] = acc;
        }
    }

    let mut out = Array2::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let rr = reflect_index(r as isize + k as isize - radius, rows);
                acc += weight * horizontal[[rr, c]];
            }
            out[[r, c]] = acc;
        }
    }
    out
}

/// Pseudo-flatfield correction: divide the plane by a heavily blurred
/// copy of itself plus one.
///
/// Corrects slow illumination gradients without touching fine detail.
/// The output is a non-negative ratio image.
#[must_use]
pub fn pseudo_flatfield(plane: Array2<f64>, sigma: f64) -> Array2<f64> {
    let blurred = gaussian_blur(&plane, sigma);
    let mut out = plane;
    out.zip_mut_with(&blurred, |v, b| *v /= b + 1.0);
    out
}

/// Default per-plane pipeline: despeckle then pseudo-flatfield.
#[must_use]
pub fn filter_plane(plane: Array2<f64>) -> Array2<f64> {
    let plane = despeckle(plane, DESPECKLE_RADIUS);
    pseudo_flatfield(plane, FLATFIELD_SIGMA)
}

/// Alternate pipeline for striped acquisition modalities: stripe removal,
/// then everything outside the iterated foreground mask is zeroed.
#[must_use]
pub fn filter_plane_striped(
    plane: Array2<f64>,
    direction: StripeDirection,
    max_components: usize,
) -> Array2<f64> {
    let mut plane = remove_stripes(plane, direction);
    let mask = iterative_background_mask(&plane, max_components);
    plane.zip_mut_with(&mask, |v, m| {
        if *m == 0 {
            *v = 0.0;
        }
    });
    plane
}

/// Triangle threshold over a 256-bin histogram.
///
/// Returns `None` for a degenerate histogram (empty or constant plane, or
/// a peak coinciding with the histogram end), mirroring the cases where
/// the textbook formulation has no defined maximum.
fn triangle_threshold(plane: &Array2<f64>) -> Option<f64> {
    const NBINS: usize = 256;

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in plane.iter() {
        min = min.min(v);
        max = max.max(v);
    }
    if !(max > min) {
        return None;
    }
    let span = max - min;
    let bin_width = span / NBINS as f64;

    let mut hist = vec![0u64; NBINS];
    for &v in plane.iter() {
        let bin = (((v - min) / span) * NBINS as f64) as usize;
        hist[bin.min(NBINS - 1)] += 1;
    }

    let mut arg_peak = 0usize;
    for (i, &count) in hist.iter().enumerate() {
        if count > hist[arg_peak] {
            arg_peak = i;
        }
    }
    let peak_height = hist[arg_peak];

    let arg_low = hist.iter().position(|&c| c > 0)?;
    let arg_high = hist.iter().rposition(|&c| c > 0)?;
    if arg_low == arg_high {
        return Some(min + (arg_low as f64 + 0.5) * bin_width);
    }

    // Work on the side of the peak with the longer tail.
    let flip = arg_peak - arg_low < arg_high - arg_peak;
    let (hist, arg_low, arg_peak) = if flip {
        let mut reversed = hist;
        reversed.reverse();
        (reversed, NBINS - arg_high - 1, NBINS - arg_peak - 1)
    } else {
        (hist, arg_low, arg_peak)
    };

    let width = arg_peak - arg_low;
    if width == 0 {
        return None;
    }

    let norm = ((peak_height * peak_height) as f64 + (width * width) as f64).sqrt();
    let peak_scaled = peak_height as f64 / norm;
    let width_scaled = width as f64 / norm;

    let mut best_x = 0usize;
    let mut best_length = f64::NEG_INFINITY;
    for x in 0..width {
        let length = peak_scaled * x as f64 - width_scaled * hist[x + arg_low] as f64;
        if length > best_length {
            best_length = length;
            best_x = x;
        }
    }
    let mut arg_level = best_x + arg_low;
    if flip {
        arg_level = NBINS - arg_level - 1;
    }
    Some(min + (arg_level as f64 + 0.5) * bin_width)
}

fn mask_to_gray(mask: &Array2<u8>, invert: bool) -> GrayImage {
    let (rows, cols) = mask.dim();
    GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        let on = mask[[y as usize, x as usize]] != 0;
        if on != invert {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Fill enclosed background regions: any zero region with no path to the
/// plane border becomes foreground.
fn fill_holes(mask: &Array2<u8>) -> Array2<u8> {
    let (rows, cols) = mask.dim();
    let inverted = mask_to_gray(mask, true);
    let labels = connected_components(&inverted, Connectivity::Four, Luma([0u8]));

    let mut border_labels: HashSet<u32> = HashSet::new();
    for x in 0..cols as u32 {
        for y in [0, rows as u32 - 1] {
            let label = labels.get_pixel(x, y).0[0];
            if label != 0 {
                border_labels.insert(label);
            }
        }
    }
    for y in 0..rows as u32 {
        for x in [0, cols as u32 - 1] {
            let label = labels.get_pixel(x, y).0[0];
            if label != 0 {
                border_labels.insert(label);
            }
        }
    }

    Array2::from_shape_fn((rows, cols), |(r, c)| {
        if mask[[r, c]] != 0 {
            1
        } else {
            let label = labels.get_pixel(c as u32, r as u32).0[0];
            u8::from(label != 0 && !border_labels.contains(&label))
        }
    })
}

fn binary_opening(mask: &Array2<u8>, radius: usize) -> Array2<u8> {
    let offsets = disk_offsets(radius);
    let (rows, cols) = mask.dim();
    let eroded = Array2::from_shape_fn((rows, cols), |(r, c)| {
        for &(dy, dx) in &offsets {
            let rr = clamp_index(r as isize + dy, rows);
            let cc = clamp_index(c as isize + dx, cols);
            if mask[[rr, cc]] == 0 {
                return 0u8;
            }
        }
        1u8
    });
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        for &(dy, dx) in &offsets {
            let rr = clamp_index(r as isize + dy, rows);
            let cc = clamp_index(c as isize + dx, cols);
            if eroded[[rr, cc]] != 0 {
                return 1u8;
            }
        }
        0u8
    })
}

fn compute_mask(plane: &Array2<f64>, threshold: f64) -> Array2<u8> {
    let mask = plane.mapv(|v| u8::from(v > threshold));
    let filled = fill_holes(&mask);
    binary_opening(&filled, MASK_OPENING_RADIUS)
}

/// Keep the largest 8-connected components of the mask.
fn keep_largest_components(mask: &Array2<u8>, max_components: usize) -> Array2<u8> {
    let gray = mask_to_gray(mask, false);
    let labels = connected_components(&gray, Connectivity::Eight, Luma([0u8]));

    let mut areas: std::collections::HashMap<u32, u64> = std::collections::HashMap::new();
    for pixel in labels.pixels() {
        let label = pixel.0[0];
        if label != 0 {
            *areas.entry(label).or_insert(0) += 1;
        }
    }
    let mut by_area: Vec<(u32, u64)> = areas.into_iter().collect();
    by_area.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let kept: HashSet<u32> = by_area
        .into_iter()
        .take(max_components)
        .map(|(label, _)| label)
        .collect();

    let (rows, cols) = mask.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let label = labels.get_pixel(c as u32, r as u32).0[0];
        u8::from(label != 0 && kept.contains(&label))
    })
}

/// Foreground/background mask by iterative threshold adjustment.
///
/// Starts from the triangle threshold and walks it up or down in 15%
/// steps until the background fraction lands inside the
/// [`MIN_PERCENT_ZEROS`], [`MAX_PERCENT_ZEROS`] window; each candidate
/// mask is hole-filled and opened with a disk of radius 3. Convergence
/// keeps the `max_components` largest components; a degenerate histogram
/// or more than 100 iterations yields an all-zero mask.
#[must_use]
pub fn iterative_background_mask(plane: &Array2<f64>, max_components: usize) -> Array2<u8> {
    let (rows, cols) = plane.dim();
    let zeros = || Array2::<u8>::zeros((rows, cols));
    let img_pixels = (rows * cols) as f64;
    if img_pixels == 0.0 {
        return zeros();
    }

    let Some(mut threshold) = triangle_threshold(plane) else {
        return zeros();
    };

    let mut percent_zeros = 0.0;
    let mut iteration = 0u32;
    let mut mask = zeros();

    while percent_zeros < MIN_PERCENT_ZEROS {
        if iteration > MAX_ITERATIONS {
            return zeros();
        }
        threshold += THRESHOLD_STEP * threshold;
        mask = compute_mask(plane, threshold);
        percent_zeros = background_percent(&mask, img_pixels);
        iteration += 1;
    }

    while percent_zeros > MAX_PERCENT_ZEROS {
        if iteration > MAX_ITERATIONS {
            return zeros();
        }
        threshold -= THRESHOLD_STEP * threshold;
        mask = compute_mask(plane, threshold);
        percent_zeros = background_percent(&mask, img_pixels);
        iteration += 1;
    }

    keep_largest_components(&mask, max_components)
}

fn background_percent(mask: &Array2<u8>, img_pixels: f64) -> f64 {
    let zeros = mask.iter().filter(|&&v| v == 0).count() as f64;
    zeros / img_pixels * 100.0
}
