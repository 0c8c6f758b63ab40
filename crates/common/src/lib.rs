//! Shared types for atlas registration: the volume/atlas data model,
//! scaling and orientation handling, and the error taxonomy used across
//! the workspace.

pub mod atlas;
pub mod error;
pub mod orientation;
pub mod types;

pub use atlas::{Atlas, StructureLookup};
pub use error::{
    AtlasRegError, LoadFileError, RegistrationError, Result, TransformationError,
};
pub use orientation::{remap_volume, Orientation};
pub use types::{HemisphereConvention, ScalingFactors, VoxelSize};
