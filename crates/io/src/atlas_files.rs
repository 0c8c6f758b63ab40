//! Atlas loading from a local directory layout.
//!
//! Expected contents: `reference.nii`, `annotation.nii`, `hemispheres.nii`,
//! `structures.csv` (columns `id,name`) and `metadata.json`. The metadata
//! resolution triple is in array-axis order (plane, row, column spacing in
//! micrometers).

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use atlasreg_common::{Atlas, AtlasRegError, Orientation, Result, StructureLookup, VoxelSize};

use crate::nii::{load_nii_f64, load_nii_u32};

#[derive(Debug, Deserialize)]
struct AtlasMetadata {
    name: String,
    orientation: String,
    resolution: [f64; 3],
}

#[derive(Debug, Deserialize)]
struct StructureRow {
    id: u32,
    name: String,
}

fn load_metadata(path: &Path) -> Result<AtlasMetadata> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| {
        AtlasRegError::Config(format!("invalid atlas metadata {}: {e}", path.display()))
    })
}

fn load_structures(path: &Path) -> Result<StructureLookup> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        AtlasRegError::Config(format!("invalid structure table {}: {e}", path.display()))
    })?;
    let mut lookup = StructureLookup::new();
    for row in reader.deserialize() {
        let row: StructureRow = row.map_err(|e| {
            AtlasRegError::Config(format!("invalid structure row in {}: {e}", path.display()))
        })?;
        lookup.insert(row.id, row.name);
    }
    Ok(lookup)
}

/// Load an atlas from `dir`.
pub fn load_atlas(dir: &Path) -> Result<Atlas> {
    let metadata = load_metadata(&dir.join("metadata.json"))?;
    let orientation = Orientation::parse(&metadata.orientation)?;
    let lookup = load_structures(&dir.join("structures.csv"))?;

    info!(
        atlas = %metadata.name,
        structures = lookup.len(),
        "loading atlas volumes"
    );
    let reference = load_nii_f64(&dir.join("reference.nii"))?;
    let annotation = load_nii_u32(&dir.join("annotation.nii"))?;
    let hemispheres = load_nii_u32(&dir.join("hemispheres.nii"))?;

    let voxel_size = VoxelSize {
        z: metadata.resolution[0],
        y: metadata.resolution[1],
        x: metadata.resolution[2],
    };
    Atlas::new(
        metadata.name,
        reference,
        annotation,
        hemispheres,
        voxel_size,
        orientation,
        lookup,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nii::{save_nii, save_nii_u32};
    use ndarray::Array3;
    use tempfile::tempdir;

    #[test]
    fn loads_a_complete_atlas_directory() {
        let dir = tempdir().unwrap();
        let shape = (4, 4, 4);
        let voxels = VoxelSize::new(25.0, 25.0, 25.0);

        save_nii(&Array3::from_elem(shape, 100.0), voxels, &dir.path().join("reference.nii"))
            .unwrap();
        let mut annotation = Array3::<u32>::zeros(shape);
        annotation[[1, 1, 1]] = 5;
        save_nii_u32(&annotation, voxels, &dir.path().join("annotation.nii")).unwrap();
        save_nii_u32(
            &Array3::from_elem(shape, 1u32),
            voxels,
            &dir.path().join("hemispheres.nii"),
        )
        .unwrap();

        std::fs::write(
            dir.path().join("structures.csv"),
            "id,name\n5,Cerebellum\n8,Cortex\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("metadata.json"),
            r#"{"name":"test_mouse_25um","orientation":"asr","resolution":[25.0,25.0,25.0]}"#,
        )
        .unwrap();

        let atlas = load_atlas(dir.path()).unwrap();
        assert_eq!(atlas.name(), "test_mouse_25um");
        assert_eq!(atlas.annotation()[[1, 1, 1]], 5);
        assert_eq!(atlas.lookup().name(5).unwrap(), "Cerebellum");
        assert_eq!(atlas.orientation().code(), "asr");
        assert_eq!(atlas.voxel_size_um().x, 25.0);
    }

    #[test]
    fn missing_metadata_is_a_config_error() {
        let dir = tempdir().unwrap();
        let err = load_atlas(dir.path()).unwrap_err();
        assert!(matches!(err, AtlasRegError::Io(_)));
    }
}
