//! Error taxonomy shared across the registration workspace.
//!
//! Backend failures are wrapped into one of the stage-tagged kinds at the
//! orchestrator boundary; raw subprocess or codec errors never cross into
//! orchestration logic.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for registration operations
pub type Result<T> = std::result::Result<T, AtlasRegError>;

/// Top-level error for a registration run
#[derive(Debug, Error)]
pub enum AtlasRegError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Transformation(#[from] TransformationError),

    #[error(transparent)]
    LoadFile(#[from] LoadFileError),

    /// A label id with no entry in the atlas structure lookup.
    #[error("Atlas value: {0} is not in the structure reference")]
    UnknownAtlasValue(u32),

    #[error("Failed to write {path}: {detail}")]
    WriteFile { path: PathBuf, detail: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while computing or propagating a registration.
///
/// `Segmentation` is the label/hemisphere propagation subtype; both carry
/// the name of the pipeline stage that failed.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Registration failed at stage '{stage}'; {detail}")]
    Registration { stage: String, detail: String },

    #[error("Segmentation failed at stage '{stage}'; {detail}")]
    Segmentation { stage: String, detail: String },
}

impl RegistrationError {
    #[must_use]
    pub fn stage(&self) -> &str {
        match self {
            Self::Registration { stage, .. } | Self::Segmentation { stage, .. } => stage,
        }
    }
}

/// Failure while inverting a transform, mapping to standard space, or
/// exporting the deformation field.
#[derive(Debug, Error)]
#[error("Transformation failed at stage '{stage}'; {detail}")]
pub struct TransformationError {
    pub stage: String,
    pub detail: String,
}

/// Malformed or dimensionally inconsistent input volume.
///
/// Raised before any registration stage executes. The single-plane cases
/// get specific, user-actionable messages; everything else wraps the
/// underlying load failure.
#[derive(Debug, Error)]
pub enum LoadFileError {
    #[error(
        "Attempted to load directory containing a single two dimensional \
         .tiff file. Pass a folder containing 3D tiff file or multiple \
         2D .tiff files."
    )]
    SingleTwoDimensionalTiff,

    #[error(
        "Attempted to load directory containing single .tiff file. \
         For 3D tiff, pass the full path including filename."
    )]
    FolderWithSingleTiff,

    #[error(
        "File at {path} failed to load. Ensure all image files contain \
         the same number of pixels; {detail}"
    )]
    DimensionMismatch { path: PathBuf, detail: String },

    #[error("File at {path} failed to load; {detail}")]
    Unreadable { path: PathBuf, detail: String },

    #[error("Unsupported volume format: {0}")]
    UnsupportedFormat(PathBuf),
}
