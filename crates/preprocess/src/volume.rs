//! Whole-volume filtering: plane-wise dispatch and 16-bit rescale.

use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;
use tracing::debug;

use crate::plane::{filter_plane, filter_plane_striped};
use crate::{PreprocessingMode, PreprocessorConfig};

/// Filter a volume for registration and rescale it to the full `u16`
/// range.
///
/// `Default` mode filters each plane along the last axis, `Striped` mode
/// filters each plane along the first axis, `Skip` only rescales.
#[must_use]
pub fn filter_volume(volume: Array3<f64>, config: &PreprocessorConfig) -> Array3<u16> {
    let filtered = match config.mode {
        PreprocessingMode::Skip => {
            debug!("preprocessing skipped, rescaling only");
            volume
        }
        PreprocessingMode::Striped => {
            debug!(
                direction = %config.stripe_direction,
                "filtering planes with stripe removal"
            );
            let direction = config.stripe_direction;
            let max_components = config.mask_max_components;
            map_planes(volume, Axis(0), config.parallel, move |plane| {
                filter_plane_striped(plane, direction, max_components)
            })
        }
        PreprocessingMode::Default => {
            debug!("filtering planes with despeckle and flatfield");
            map_planes(volume, Axis(2), config.parallel, filter_plane)
        }
    };
    rescale_to_u16(&filtered)
}

/// Apply `filter` to every plane along `axis`, keeping plane order.
fn map_planes<F>(volume: Array3<f64>, axis: Axis, parallel: bool, filter: F) -> Array3<f64>
where
    F: Fn(Array2<f64>) -> Array2<f64> + Sync + Send,
{
    if volume.len_of(axis) == 0 {
        return volume;
    }

    let planes: Vec<Array2<f64>> = volume.axis_iter(axis).map(|p| p.to_owned()).collect();
    let filtered: Vec<Array2<f64>> = if parallel {
        planes.into_par_iter().map(&filter).collect()
    } else {
        planes.into_iter().map(&filter).collect()
    };

    let mut out = Array3::zeros(volume.raw_dim());
    for (i, plane) in filtered.into_iter().enumerate() {
        out.index_axis_mut(axis, i).assign(&plane);
    }
    out
}

/// Scale the volume linearly so its value range spans the full `u16`
/// range, rounding to nearest. A constant volume maps to all zeros.
#[must_use]
pub fn rescale_to_u16(volume: &Array3<f64>) -> Array3<u16> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in volume.iter() {
        min = min.min(v);
        max = max.max(v);
    }
    if !(max > min) {
        return Array3::zeros(volume.raw_dim());
    }
    let span = max - min;
    volume.mapv(|v| ((v - min) / span * f64::from(u16::MAX)).round() as u16)
}
