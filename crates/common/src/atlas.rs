//! Atlas data model: reference/annotation/hemisphere volumes plus the
//! structure lookup table.

use std::collections::BTreeMap;

use ndarray::Array3;

use crate::error::AtlasRegError;
use crate::orientation::Orientation;
use crate::types::VoxelSize;

/// Structure id to name lookup.
///
/// Ids are unique and iterated in ascending order; id 0 is reserved for
/// voxels outside the brain and never appears here.
#[derive(Debug, Clone, Default)]
pub struct StructureLookup {
    names: BTreeMap<u32, String>,
}

impl StructureLookup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        let names = pairs
            .into_iter()
            .filter(|(id, _)| *id != 0)
            .map(|(id, name)| (id, name.into()))
            .collect();
        Self { names }
    }

    pub fn insert(&mut self, id: u32, name: impl Into<String>) {
        if id != 0 {
            self.names.insert(id, name.into());
        }
    }

    /// Resolve a structure id to its name.
    pub fn name(&self, id: u32) -> Result<&str, AtlasRegError> {
        self.names
            .get(&id)
            .map(String::as_str)
            .ok_or(AtlasRegError::UnknownAtlasValue(id))
    }

    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.names.contains_key(&id)
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.names.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A reference atlas: intensity volume, integer annotation volume,
/// hemisphere mask, physical resolution and structure lookup.
#[derive(Debug, Clone)]
pub struct Atlas {
    name: String,
    reference: Array3<f64>,
    annotation: Array3<u32>,
    hemispheres: Array3<u32>,
    voxel_size_um: VoxelSize,
    orientation: Orientation,
    lookup: StructureLookup,
}

impl Atlas {
    /// Build an atlas, validating that the three volumes share a shape.
    pub fn new(
        name: impl Into<String>,
        reference: Array3<f64>,
        annotation: Array3<u32>,
        hemispheres: Array3<u32>,
        voxel_size_um: VoxelSize,
        orientation: Orientation,
        lookup: StructureLookup,
    ) -> Result<Self, AtlasRegError> {
        if reference.shape() != annotation.shape() || reference.shape() != hemispheres.shape() {
            return Err(AtlasRegError::Config(format!(
                "atlas volumes disagree on shape: reference {:?}, annotation {:?}, hemispheres {:?}",
                reference.shape(),
                annotation.shape(),
                hemispheres.shape()
            )));
        }
        Ok(Self {
            name: name.into(),
            reference,
            annotation,
            hemispheres,
            voxel_size_um,
            orientation,
            lookup,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn reference(&self) -> &Array3<f64> {
        &self.reference
    }

    #[must_use]
    pub fn annotation(&self) -> &Array3<u32> {
        &self.annotation
    }

    #[must_use]
    pub fn hemispheres(&self) -> &Array3<u32> {
        &self.hemispheres
    }

    #[must_use]
    pub fn voxel_size_um(&self) -> VoxelSize {
        self.voxel_size_um
    }

    #[must_use]
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    #[must_use]
    pub fn lookup(&self) -> &StructureLookup {
        &self.lookup
    }
}
