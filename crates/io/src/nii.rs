//! NIfTI-1 volume read/write.
//!
//! Written volumes carry the atlas voxel size in the header: pixdim and
//! the sform diagonal are the per-axis sizes converted from micrometers
//! to millimeters, which is what the registration toolkit reads back.

use std::path::Path;

use ndarray::{Array3, Array4, Axis, Ix3, Order};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use atlasreg_common::{AtlasRegError, LoadFileError, Result, VoxelSize};

fn read_failure(path: &Path, detail: impl ToString) -> AtlasRegError {
    LoadFileError::Unreadable {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
    .into()
}

fn write_failure(path: &Path, detail: impl ToString) -> AtlasRegError {
    AtlasRegError::WriteFile {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Header carrying voxel sizes in mm on the diagonal.
fn header_for(voxel_size_um: VoxelSize) -> NiftiHeader {
    let dx = (voxel_size_um.x / 1000.0) as f32;
    let dy = (voxel_size_um.y / 1000.0) as f32;
    let dz = (voxel_size_um.z / 1000.0) as f32;
    NiftiHeader {
        pixdim: [1.0, dx, dy, dz, 1.0, 1.0, 1.0, 1.0],
        srow_x: [dx, 0.0, 0.0, 0.0],
        srow_y: [0.0, dy, 0.0, 0.0],
        srow_z: [0.0, 0.0, dz, 0.0],
        sform_code: 2,
        qform_code: 0,
        ..NiftiHeader::default()
    }
}

pub fn load_nii_f64(path: &Path) -> Result<Array3<f64>> {
    let object = ReaderOptions::new()
        .read_file(path)
        .map_err(|e| read_failure(path, e))?;
    let data = object
        .into_volume()
        .into_ndarray::<f64>()
        .map_err(|e| read_failure(path, e))?;
    data.into_dimensionality::<Ix3>()
        .map_err(|e| read_failure(path, format!("expected a 3D volume; {e}")))
}

pub fn load_nii_u32(path: &Path) -> Result<Array3<u32>> {
    let object = ReaderOptions::new()
        .read_file(path)
        .map_err(|e| read_failure(path, e))?;
    let data = object
        .into_volume()
        .into_ndarray::<u32>()
        .map_err(|e| read_failure(path, e))?;
    data.into_dimensionality::<Ix3>()
        .map_err(|e| read_failure(path, format!("expected a 3D volume; {e}")))
}

/// Load a deformation field, which the toolkit writes with trailing
/// component axes (x, y, z, 1, 3). Returns the flattened component list.
pub fn load_nii_components(path: &Path) -> Result<Vec<Array3<f64>>> {
    let object = ReaderOptions::new()
        .read_file(path)
        .map_err(|e| read_failure(path, e))?;
    let data = object
        .into_volume()
        .into_ndarray::<f64>()
        .map_err(|e| read_failure(path, e))?;

    let shape = data.shape().to_vec();
    if shape.len() < 4 {
        return Err(read_failure(
            path,
            format!("expected a component volume, got shape {shape:?}"),
        ));
    }
    let spatial = (shape[0], shape[1], shape[2]);
    let components: usize = shape[3..].iter().product();
    // The reader hands back Fortran-ordered data, so the trailing axes
    // merge column-major.
    let flat = data
        .to_shape((
            (spatial.0, spatial.1, spatial.2, components),
            Order::ColumnMajor,
        ))
        .map_err(|e| read_failure(path, e))?;

    let mut out = Vec::with_capacity(components);
    for c in 0..components {
        out.push(flat.index_axis(Axis(3), c).to_owned());
    }
    Ok(out)
}

pub fn save_nii(volume: &Array3<f64>, voxel_size_um: VoxelSize, path: &Path) -> Result<()> {
    let header = header_for(voxel_size_um);
    nifti::writer::WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(volume)
        .map_err(|e| write_failure(path, e))
}

pub fn save_nii_u16(volume: &Array3<u16>, voxel_size_um: VoxelSize, path: &Path) -> Result<()> {
    let header = header_for(voxel_size_um);
    nifti::writer::WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(volume)
        .map_err(|e| write_failure(path, e))
}

pub fn save_nii_u32(volume: &Array3<u32>, voxel_size_um: VoxelSize, path: &Path) -> Result<()> {
    let header = header_for(voxel_size_um);
    nifti::writer::WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(volume)
        .map_err(|e| write_failure(path, e))
}

/// Write a component volume with the components on a trailing axis,
/// the layout [`load_nii_components`] reads back.
pub fn save_nii_components(
    components: &[Array3<f64>],
    voxel_size_um: VoxelSize,
    path: &Path,
) -> Result<()> {
    let Some(first) = components.first() else {
        return Err(write_failure(path, "no components to write"));
    };
    let (nz, ny, nx) = first.dim();
    let mut stacked = Array4::zeros((nz, ny, nx, components.len()));
    for (index, component) in components.iter().enumerate() {
        if component.dim() != (nz, ny, nx) {
            return Err(write_failure(
                path,
                format!(
                    "component {index} is {:?}, expected {:?}",
                    component.dim(),
                    (nz, ny, nx)
                ),
            ));
        }
        stacked.index_axis_mut(Axis(3), index).assign(component);
    }
    let header = header_for(voxel_size_um);
    nifti::writer::WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&stacked)
        .map_err(|e| write_failure(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use tempfile::tempdir;

    #[test]
    fn f64_round_trip_preserves_shape_and_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("volume.nii");
        let volume =
            Array3::from_shape_fn((3, 4, 5), |(i, j, k)| (i * 20 + j * 5 + k) as f64);

        save_nii(&volume, VoxelSize::new(25.0, 25.0, 25.0), &path).unwrap();
        let loaded = load_nii_f64(&path).unwrap();

        assert_eq!(loaded.shape(), volume.shape());
        assert_eq!(loaded, volume);
    }

    #[test]
    fn u32_round_trip_preserves_labels() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.nii");
        let mut labels = Array3::<u32>::zeros((2, 3, 4));
        labels[[0, 0, 0]] = 42;
        labels[[1, 2, 3]] = 7;

        save_nii_u32(&labels, VoxelSize::new(10.0, 10.0, 10.0), &path).unwrap();
        let loaded = load_nii_u32(&path).unwrap();
        assert_eq!(loaded, labels);
    }

    #[test]
    fn component_volume_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("field.nii");
        let components: Vec<Array3<f64>> = (0..3)
            .map(|c| Array3::from_shape_fn((2, 3, 4), |(z, y, x)| (c * 100 + z * 12 + y * 4 + x) as f64))
            .collect();

        save_nii_components(&components, VoxelSize::new(25.0, 25.0, 25.0), &path).unwrap();
        let loaded = load_nii_components(&path).unwrap();

        assert_eq!(loaded.len(), 3);
        for (original, read) in components.iter().zip(&loaded) {
            assert_eq!(read, original);
        }
    }

    #[test]
    fn header_scales_are_millimeters() {
        let header = header_for(VoxelSize::new(25.0, 50.0, 100.0));
        assert!((header.pixdim[1] - 0.025).abs() < 1e-6);
        assert!((header.pixdim[2] - 0.05).abs() < 1e-6);
        assert!((header.pixdim[3] - 0.1).abs() < 1e-6);
        assert_eq!(header.sform_code, 2);
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = load_nii_f64(Path::new("/nonexistent/volume.nii")).unwrap_err();
        assert!(err.to_string().contains("failed to load"));
    }
}
