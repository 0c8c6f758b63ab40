//! Raw sample loading with the pre-registration diagnostics.
//!
//! Accepts a NIfTI file, a multi-page TIFF, or a directory of 2-D TIFF
//! planes (stacked in file-name order). Axis convention for the result:
//! axis 0 = planes (z), axis 1 = rows (y), axis 2 = columns (x).

use std::path::Path;

use ndarray::Array3;
use tracing::debug;

use atlasreg_common::{AtlasRegError, LoadFileError, Result, ScalingFactors};

use crate::nii::load_nii_f64;
use crate::tiff_stack::{read_tiff_planes, stack_planes};

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

fn tiff_files_in(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, &["tif", "tiff"]) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load a volume from any supported source.
pub fn load_any(path: &Path) -> Result<Array3<f64>> {
    if path.is_dir() {
        return load_plane_directory(path);
    }
    if has_extension(path, &["tif", "tiff"]) {
        let planes = read_tiff_planes(path)?;
        if planes.len() == 1 {
            return Err(LoadFileError::SingleTwoDimensionalTiff.into());
        }
        return stack_planes(path, planes);
    }
    if has_extension(path, &["nii", "gz"]) {
        return load_nii_f64(path);
    }
    Err(LoadFileError::UnsupportedFormat(path.to_path_buf()).into())
}

/// Load a volume and resample it into atlas voxel space.
///
/// Scaling factors are sample/atlas voxel-size ratios; z applies to axis
/// 0, y to axis 1, x to axis 2. Resampling is center-aligned nearest
/// index selection per axis.
pub fn load_any_downsampled(path: &Path, scaling: ScalingFactors) -> Result<Array3<f64>> {
    let volume = load_any(path)?;
    Ok(resample_volume(volume, scaling))
}

fn load_plane_directory(dir: &Path) -> Result<Array3<f64>> {
    let files = tiff_files_in(dir)?;
    match files.len() {
        0 => Err(LoadFileError::Unreadable {
            path: dir.to_path_buf(),
            detail: "directory contains no .tiff files".to_string(),
        }
        .into()),
        1 => Err(LoadFileError::FolderWithSingleTiff.into()),
        n => {
            debug!(planes = n, dir = %dir.display(), "loading plane directory");
            let mut planes = Vec::with_capacity(n);
            for file in &files {
                let mut pages = read_tiff_planes(file)?;
                let plane = pages.drain(..).next().ok_or_else(|| {
                    AtlasRegError::from(LoadFileError::Unreadable {
                        path: file.clone(),
                        detail: "file contains no image pages".to_string(),
                    })
                })?;
                planes.push(plane);
            }
            stack_planes(dir, planes)
        }
    }
}

/// Per-axis nearest-index resampling.
#[must_use]
pub fn resample_volume(volume: Array3<f64>, scaling: ScalingFactors) -> Array3<f64> {
    if scaling == ScalingFactors::IDENTITY {
        return volume;
    }
    let (nz, ny, nx) = volume.dim();
    let map_z = axis_index_map(nz, scaling.z);
    let map_y = axis_index_map(ny, scaling.y);
    let map_x = axis_index_map(nx, scaling.x);

    Array3::from_shape_fn((map_z.len(), map_y.len(), map_x.len()), |(z, y, x)| {
        volume[[map_z[z], map_y[y], map_x[x]]]
    })
}

fn axis_index_map(len: usize, factor: f64) -> Vec<usize> {
    if len == 0 || factor <= 0.0 || (factor - 1.0).abs() < f64::EPSILON {
        return (0..len).collect();
    }
    let out_len = ((len as f64 * factor).round() as usize).max(1);
    (0..out_len)
        .map(|i| {
            let src = (i as f64 + 0.5) / factor - 0.5;
            (src.round().max(0.0) as usize).min(len - 1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiff_stack::to_tiff_u16;
    use ndarray::{Array2, Array3};
    use tempfile::tempdir;

    fn write_plane(path: &Path, plane: &Array2<u16>) {
        let (rows, cols) = plane.dim();
        let volume = plane
            .clone()
            .into_shape_with_order((1, rows, cols))
            .unwrap();
        to_tiff_u16(&volume, path).unwrap();
    }

    #[test]
    fn directory_of_planes_loads_in_name_order() {
        let dir = tempdir().unwrap();
        for (index, name) in ["plane_000.tiff", "plane_001.tiff", "plane_002.tiff"]
            .iter()
            .enumerate()
        {
            let plane = Array2::from_elem((4, 6), index as u16);
            write_plane(&dir.path().join(name), &plane);
        }

        let volume = load_any(dir.path()).unwrap();
        assert_eq!(volume.dim(), (3, 4, 6));
        assert_eq!(volume[[0, 0, 0]], 0.0);
        assert_eq!(volume[[1, 0, 0]], 1.0);
        assert_eq!(volume[[2, 3, 5]], 2.0);
    }

    #[test]
    fn folder_with_single_tiff_gets_specific_message() {
        let dir = tempdir().unwrap();
        write_plane(
            &dir.path().join("only.tiff"),
            &Array2::from_elem((4, 4), 1u16),
        );

        let err = load_any(dir.path()).unwrap_err();
        assert!(err
            .to_string()
            .contains("For 3D tiff, pass the full path including filename"));
    }

    #[test]
    fn single_page_tiff_file_gets_specific_message() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flat.tiff");
        write_plane(&path, &Array2::from_elem((4, 4), 1u16));

        let err = load_any(&path).unwrap_err();
        assert!(err
            .to_string()
            .contains("single two dimensional .tiff file"));
    }

    #[test]
    fn mismatched_plane_shapes_are_a_dimension_mismatch() {
        let dir = tempdir().unwrap();
        write_plane(
            &dir.path().join("a.tiff"),
            &Array2::from_elem((4, 4), 0u16),
        );
        write_plane(
            &dir.path().join("b.tiff"),
            &Array2::from_elem((4, 5), 0u16),
        );

        let err = load_any(dir.path()).unwrap_err();
        assert!(err.to_string().contains("same number of pixels"));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("volume.raw");
        std::fs::write(&path, b"not a volume").unwrap();

        let err = load_any(&path).unwrap_err();
        assert!(err.to_string().contains("Unsupported volume format"));
    }

    #[test]
    fn resampling_halves_each_axis() {
        let volume = Array3::from_shape_fn((8, 8, 8), |(z, y, x)| (z * 64 + y * 8 + x) as f64);
        let scaling = ScalingFactors {
            x: 0.5,
            y: 0.5,
            z: 0.5,
        };
        let out = resample_volume(volume, scaling);
        assert_eq!(out.dim(), (4, 4, 4));
    }

    #[test]
    fn identity_scaling_is_untouched() {
        let volume = Array3::from_shape_fn((3, 3, 3), |(z, y, x)| (z + y + x) as f64);
        let out = resample_volume(volume.clone(), ScalingFactors::IDENTITY);
        assert_eq!(out, volume);
    }

    #[test]
    fn resampling_an_empty_axis_stays_empty() {
        let volume = Array3::<f64>::zeros((0, 4, 4));
        let scaling = ScalingFactors {
            x: 0.5,
            y: 0.5,
            z: 0.5,
        };
        let out = resample_volume(volume, scaling);
        assert_eq!(out.dim(), (0, 2, 2));
    }
}
