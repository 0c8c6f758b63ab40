//! Per-structure volume aggregation
//!
//! Turns a registered annotation volume and its hemisphere mask into a
//! table of physical structure volumes: voxels are split by hemisphere,
//! counted per atlas id, converted to mm³ with the atlas voxel size, and
//! written as one CSV row per structure.
//!
//! Structures the atlas knows about but the registered volume does not
//! contain, and values observed in the volume but missing from the
//! structure reference, are warnings rather than errors.
//!
//! # Example
//! ```
//! use atlasreg_common::{HemisphereConvention, StructureLookup, VoxelSize};
//! use atlasreg_volumes::compute_volumes;
//! use ndarray::Array3;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let lookup = StructureLookup::from_pairs([(7, "Cortex".to_string())]);
//! let labels = Array3::from_elem((1, 2, 2), 7u32);
//! let hemispheres = Array3::from_shape_vec((1, 2, 2), vec![1u32, 1, 2, 2])?;
//!
//! let records = compute_volumes(
//!     &lookup,
//!     VoxelSize::new(10.0, 10.0, 10.0),
//!     &labels,
//!     &hemispheres,
//!     HemisphereConvention::default(),
//! )?;
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].structure_name, "Cortex");
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use atlasreg_common::{HemisphereConvention, StructureLookup, VoxelSize};

/// Errors raised during volume aggregation
#[derive(Error, Debug)]
pub enum VolumesError {
    #[error(
        "Registered atlas shape {labels:?} does not match hemisphere shape {hemispheres:?}"
    )]
    ShapeMismatch {
        labels: Vec<usize>,
        hemispheres: Vec<usize>,
    },

    #[error("Failed to write volume table to {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Physical volume of one structure, split by hemisphere.
/// Serializes to one CSV row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureVolumeRecord {
    pub structure_name: String,
    pub left_volume_mm3: f64,
    pub right_volume_mm3: f64,
    pub total_volume_mm3: f64,
}

/// Split the registered annotation volume into per-hemisphere id lists.
///
/// Voxels where the hemisphere mask holds neither convention value (0 =
/// outside the brain) belong to no side.
pub fn lateralize(
    labels: &Array3<u32>,
    hemispheres: &Array3<u32>,
    convention: HemisphereConvention,
) -> Result<(Vec<u32>, Vec<u32>), VolumesError> {
    if labels.dim() != hemispheres.dim() {
        return Err(VolumesError::ShapeMismatch {
            labels: labels.shape().to_vec(),
            hemispheres: hemispheres.shape().to_vec(),
        });
    }

    let mut left = Vec::new();
    let mut right = Vec::new();
    for (&label, &side) in labels.iter().zip(hemispheres.iter()) {
        if side == convention.left {
            left.push(label);
        } else if side == convention.right {
            right.push(label);
        }
    }
    Ok((left, right))
}

/// Histogram of atlas ids for one hemisphere.
#[must_use]
pub fn counts_per_side(side: &[u32]) -> BTreeMap<u32, u64> {
    let mut counts = BTreeMap::new();
    for &id in side {
        *counts.entry(id).or_insert(0u64) += 1;
    }
    counts
}

/// Compute per-structure volumes in mm³ from the registered annotation
/// volume and hemisphere mask.
///
/// Iterates the structure reference in ascending id order (id 0, outside
/// the brain, is never listed). A side with no observed voxels counts 0
/// with a warning; a record is emitted when the structure was observed on
/// at least one side. Values observed in the volume but absent from the
/// structure reference are warned about once each and skipped.
pub fn compute_volumes(
    lookup: &StructureLookup,
    voxel_size_um: VoxelSize,
    labels: &Array3<u32>,
    hemispheres: &Array3<u32>,
    convention: HemisphereConvention,
) -> Result<Vec<StructureVolumeRecord>, VolumesError> {
    let (left, right) = lateralize(labels, hemispheres, convention)?;
    let left_counts = counts_per_side(&left);
    let right_counts = counts_per_side(&right);
    let voxel_volume = voxel_size_um.voxel_volume_mm3();

    let mut records = Vec::new();
    for id in lookup.ids() {
        let left_count = side_count(&left_counts, id);
        let right_count = side_count(&right_counts, id);
        if left_count + right_count == 0 {
            continue;
        }
        let Ok(name) = lookup.name(id) else {
            continue;
        };
        let left_volume_mm3 = left_count as f64 * voxel_volume;
        let right_volume_mm3 = right_count as f64 * voxel_volume;
        records.push(StructureVolumeRecord {
            structure_name: name.to_string(),
            left_volume_mm3,
            right_volume_mm3,
            total_volume_mm3: left_volume_mm3 + right_volume_mm3,
        });
    }

    let unknown: BTreeSet<u32> = left_counts
        .keys()
        .chain(right_counts.keys())
        .copied()
        .filter(|&id| id != 0 && !lookup.contains(id))
        .collect();
    for id in unknown {
        warn!(
            "Value: {} is not in the atlas structure reference file. \
             Not calculating the volume",
            id
        );
    }

    debug!("Computed volumes for {} structures", records.len());
    Ok(records)
}

fn side_count(counts: &BTreeMap<u32, u64>, id: u32) -> u64 {
    match counts.get(&id) {
        Some(&count) => count,
        None => {
            warn!(
                "Atlas value: {} not found in registered atlas. \
                 Setting registered volume to 0.",
                id
            );
            0
        }
    }
}

/// Write the volume table as CSV with a fixed header, one row per
/// record. An empty record list still produces the header line.
pub fn write_volumes_csv(
    records: &[StructureVolumeRecord],
    path: &Path,
) -> Result<(), VolumesError> {
    let csv_err = |source: csv::Error| VolumesError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err)?;
    writer
        .write_record([
            "structure_name",
            "left_volume_mm3",
            "right_volume_mm3",
            "total_volume_mm3",
        ])
        .map_err(csv_err)?;
    for record in records {
        writer.serialize(record).map_err(csv_err)?;
    }
    writer.flush().map_err(|err| csv_err(err.into()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lookup() -> StructureLookup {
        StructureLookup::from_pairs([
            (2, "Hippocampus".to_string()),
            (7, "Cortex".to_string()),
            (11, "Cerebellum".to_string()),
        ])
    }

    #[test]
    fn lateralize_splits_by_convention() {
        let labels = Array3::from_shape_vec((1, 2, 2), vec![7u32, 7, 2, 2]).unwrap();
        let hemispheres = Array3::from_shape_vec((1, 2, 2), vec![1u32, 2, 1, 0]).unwrap();

        let (left, right) =
            lateralize(&labels, &hemispheres, HemisphereConvention::default()).unwrap();
        assert_eq!(left, vec![7, 2]);
        assert_eq!(right, vec![7]);
    }

    #[test]
    fn lateralize_rejects_shape_mismatch() {
        let labels = Array3::<u32>::zeros((1, 2, 2));
        let hemispheres = Array3::<u32>::zeros((1, 2, 3));

        let err = lateralize(&labels, &hemispheres, HemisphereConvention::default())
            .unwrap_err();
        assert!(matches!(err, VolumesError::ShapeMismatch { .. }));
    }

    #[test]
    fn counts_are_per_id() {
        let counts = counts_per_side(&[7, 7, 2, 7, 0]);
        assert_eq!(counts.get(&7), Some(&3));
        assert_eq!(counts.get(&2), Some(&1));
        assert_eq!(counts.get(&0), Some(&1));
        assert_eq!(counts.get(&11), None);
    }

    #[test]
    fn volumes_match_counts_times_voxel_volume() {
        // 4 voxels of structure 7: 3 left, 1 right.
        let labels = Array3::from_elem((1, 2, 2), 7u32);
        let hemispheres = Array3::from_shape_vec((1, 2, 2), vec![1u32, 1, 1, 2]).unwrap();
        let voxel_size = VoxelSize::new(10.0, 10.0, 10.0);

        let records = compute_volumes(
            &lookup(),
            voxel_size,
            &labels,
            &hemispheres,
            HemisphereConvention::default(),
        )
        .unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.structure_name, "Cortex");
        let voxel_volume = voxel_size.voxel_volume_mm3();
        assert_relative_eq!(record.left_volume_mm3, 3.0 * voxel_volume, epsilon = 1e-9);
        assert_relative_eq!(record.right_volume_mm3, voxel_volume, epsilon = 1e-9);
        assert_relative_eq!(
            record.total_volume_mm3,
            record.left_volume_mm3 + record.right_volume_mm3,
            epsilon = 1e-12
        );
    }

    #[test]
    fn one_sided_structure_still_gets_a_record() {
        let labels = Array3::from_shape_vec((1, 2, 2), vec![2u32, 2, 7, 7]).unwrap();
        // Structure 2 entirely on the left, structure 7 entirely right.
        let hemispheres = Array3::from_shape_vec((1, 2, 2), vec![1u32, 1, 2, 2]).unwrap();

        let records = compute_volumes(
            &lookup(),
            VoxelSize::new(5.0, 5.0, 5.0),
            &labels,
            &hemispheres,
            HemisphereConvention::default(),
        )
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].structure_name, "Hippocampus");
        assert_eq!(records[0].right_volume_mm3, 0.0);
        assert!(records[0].left_volume_mm3 > 0.0);
        assert_eq!(records[1].structure_name, "Cortex");
        assert_eq!(records[1].left_volume_mm3, 0.0);
    }

    #[test]
    fn records_are_ordered_by_id() {
        // All three structures present; lookup order is id-ascending even
        // though the names would sort differently.
        let labels = Array3::from_shape_vec((1, 2, 3), vec![11u32, 7, 2, 11, 7, 2]).unwrap();
        let hemispheres = Array3::from_shape_vec((1, 2, 3), vec![1u32, 1, 1, 2, 2, 2]).unwrap();

        let records = compute_volumes(
            &lookup(),
            VoxelSize::new(1.0, 1.0, 1.0),
            &labels,
            &hemispheres,
            HemisphereConvention::default(),
        )
        .unwrap();

        let names: Vec<&str> = records.iter().map(|r| r.structure_name.as_str()).collect();
        assert_eq!(names, vec!["Hippocampus", "Cortex", "Cerebellum"]);
    }

    #[test]
    fn unknown_observed_id_is_skipped_not_fatal() {
        let labels = Array3::from_shape_vec((1, 2, 2), vec![7u32, 99, 99, 7]).unwrap();
        let hemispheres = Array3::from_elem((1, 2, 2), 1u32);

        let records = compute_volumes(
            &lookup(),
            VoxelSize::new(10.0, 10.0, 10.0),
            &labels,
            &hemispheres,
            HemisphereConvention::default(),
        )
        .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].structure_name, "Cortex");
    }

    #[test]
    fn csv_has_exact_header_and_row_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volumes.csv");
        let records = vec![
            StructureVolumeRecord {
                structure_name: "Hippocampus".to_string(),
                left_volume_mm3: 0.5,
                right_volume_mm3: 0.25,
                total_volume_mm3: 0.75,
            },
            StructureVolumeRecord {
                structure_name: "Cortex".to_string(),
                left_volume_mm3: 1.5,
                right_volume_mm3: 1.5,
                total_volume_mm3: 3.0,
            },
        ];

        write_volumes_csv(&records, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "structure_name,left_volume_mm3,right_volume_mm3,total_volume_mm3"
        );
        assert!(lines.next().unwrap().starts_with("Hippocampus,"));
        assert!(lines.next().unwrap().starts_with("Cortex,"));
        assert_eq!(lines.next(), None);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let parsed: Vec<StructureVolumeRecord> =
            reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn empty_table_still_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volumes.csv");

        write_volumes_csv(&[], &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents.trim_end(),
            "structure_name,left_volume_mm3,right_volume_mm3,total_volume_mm3"
        );
    }
}
