//! Grayscale TIFF stack read/write (one page per plane).

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array2, Array3};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};

use atlasreg_common::{AtlasRegError, LoadFileError, Result};

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

fn plane_to_f64(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
    }
}

/// Decode every page of a grayscale TIFF as an `(plane, row, col)` plane list.
pub fn read_tiff_planes(path: &Path) -> Result<Vec<Array2<f64>>> {
    let file = File::open(path).map_err(|e| read_failure(path, e))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| read_failure(path, e))?
        .with_limits(tiff::decoder::Limits::unlimited());

    let mut planes = Vec::new();
    loop {
        let (width, height) = decoder.dimensions().map_err(|e| read_failure(path, e))?;
        let data = decoder.read_image().map_err(|e| read_failure(path, e))?;
        let values = plane_to_f64(data);
        let plane = Array2::from_shape_vec((height as usize, width as usize), values)
            .map_err(|e| read_failure(path, e))?;
        planes.push(plane);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(|e| read_failure(path, e))?;
    }
    Ok(planes)
}

/// Load a multi-page TIFF as a volume, planes along the first axis.
pub fn load_tiff_stack(path: &Path) -> Result<Array3<f64>> {
    let planes = read_tiff_planes(path)?;
    stack_planes(path, planes)
}

pub(crate) fn stack_planes(path: &Path, planes: Vec<Array2<f64>>) -> Result<Array3<f64>> {
    let Some(first) = planes.first() else {
        return Err(read_failure(path, "file contains no image pages"));
    };
    let (rows, cols) = first.dim();
    for (index, plane) in planes.iter().enumerate() {
        if plane.dim() != (rows, cols) {
            return Err(LoadFileError::DimensionMismatch {
                path: path.to_path_buf(),
                detail: format!(
                    "plane {index} is {:?}, expected {:?}",
                    plane.dim(),
                    (rows, cols)
                ),
            }
            .into());
        }
    }

    let mut volume = Array3::zeros((planes.len(), rows, cols));
    for (index, plane) in planes.into_iter().enumerate() {
        volume
            .index_axis_mut(ndarray::Axis(0), index)
            .assign(&plane);
    }
    Ok(volume)
}

pub fn to_tiff_u16(volume: &Array3<u16>, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| write_failure(path, e))?;
    let mut encoder =
        TiffEncoder::new(BufWriter::new(file)).map_err(|e| write_failure(path, e))?;
    let (_, rows, cols) = volume.dim();
    for plane in volume.outer_iter() {
        let data: Vec<u16> = plane.iter().copied().collect();
        encoder
            .write_image::<colortype::Gray16>(cols as u32, rows as u32, &data)
            .map_err(|e| write_failure(path, e))?;
    }
    Ok(())
}

pub fn to_tiff_u32(volume: &Array3<u32>, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| write_failure(path, e))?;
    let mut encoder =
        TiffEncoder::new(BufWriter::new(file)).map_err(|e| write_failure(path, e))?;
    let (_, rows, cols) = volume.dim();
    for plane in volume.outer_iter() {
        let data: Vec<u32> = plane.iter().copied().collect();
        encoder
            .write_image::<colortype::Gray32>(cols as u32, rows as u32, &data)
            .map_err(|e| write_failure(path, e))?;
    }
    Ok(())
}

pub fn to_tiff_f64(volume: &Array3<f64>, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| write_failure(path, e))?;
    let mut encoder =
        TiffEncoder::new(BufWriter::new(file)).map_err(|e| write_failure(path, e))?;
    let (_, rows, cols) = volume.dim();
    for plane in volume.outer_iter() {
        let data: Vec<f64> = plane.iter().copied().collect();
        encoder
            .write_image::<colortype::Gray64Float>(cols as u32, rows as u32, &data)
            .map_err(|e| write_failure(path, e))?;
    }
    Ok(())
}

/// Boundary images hold 0/1 and are stored as 8-bit grayscale.
pub fn to_tiff_i8(volume: &Array3<i8>, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| write_failure(path, e))?;
    let mut encoder =
        TiffEncoder::new(BufWriter::new(file)).map_err(|e| write_failure(path, e))?;
    let (_, rows, cols) = volume.dim();
    for plane in volume.outer_iter() {
        let data: Vec<u8> = plane.iter().map(|v| *v as u8).collect();
        encoder
            .write_image::<colortype::Gray8>(cols as u32, rows as u32, &data)
            .map_err(|e| write_failure(path, e))?;
    }
    Ok(())
}
