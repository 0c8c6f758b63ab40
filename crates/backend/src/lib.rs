//! Registration backend seam for the atlas pipeline
//!
//! The pipeline drives every registration operation through the
//! [`RegistrationBackend`] trait: one forward registration pass (affine
//! then freeform), transform application, and the inverse pass back to
//! atlas space. [`NiftyRegBackend`] is the shipped implementation,
//! running the NiftyReg command-line toolkit as subprocesses.
//!
//! # Features
//! - Backend-agnostic trait the orchestrator is written against
//! - NiftyReg subprocess driver with per-stage log capture
//! - Typed transform artifacts tying stages together
//! - Tunable registration parameter set with sensible defaults
//!
//! # Example
//! ```no_run
//! use atlasreg_backend::{
//!     NiftyRegBackend, NiftyRegPaths, RegistrationBackend, RegistrationParams,
//! };
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let paths = NiftyRegPaths::new(Path::new("output/niftyreg"));
//! let backend = NiftyRegBackend::new(paths, RegistrationParams::default(), None, 0);
//! let affine = backend.register_affine()?;
//! let _freeform = backend.register_freeform(&affine)?;
//! # Ok(())
//! # }
//! ```

pub mod niftyreg;
pub mod params;
pub mod paths;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use niftyreg::NiftyRegBackend;
pub use params::RegistrationParams;
pub use paths::NiftyRegPaths;

/// Errors raised while driving the external registration toolkit
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Registration binary not found: {}", .0.display())]
    MissingBinary(PathBuf),

    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed during '{stage}' ({status}): {stderr_tail}")]
    CommandFailed {
        program: String,
        stage: String,
        status: std::process::ExitStatus,
        stderr_tail: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opaque handle to a computed transform, backed by the toolkit file
/// that parameterizes it (affine matrix text file or control-point
/// image). Created by one stage, consumed read-only by later ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformArtifact(PathBuf);

impl TransformArtifact {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Resampling mode used when a transform is applied to a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Nearest-neighbour, for label volumes
    Nearest,
    /// Trilinear, for intensity volumes
    Linear,
}

impl Interpolation {
    /// Interpolation order understood by the toolkit
    #[must_use]
    pub fn order(self) -> u8 {
        match self {
            Interpolation::Nearest => 0,
            Interpolation::Linear => 1,
        }
    }
}

/// Operations the pipeline needs from a registration toolkit.
///
/// Implementations own their working directory and the locations of the
/// artifacts they produce; the orchestrator only passes artifacts from
/// one operation to the next.
pub trait RegistrationBackend {
    /// Compute the atlas-to-sample affine transform.
    fn register_affine(&self) -> Result<TransformArtifact, BackendError>;

    /// Non-linear refinement initialized from the affine transform,
    /// producing the forward control-point transform.
    fn register_freeform(
        &self,
        affine: &TransformArtifact,
    ) -> Result<TransformArtifact, BackendError>;

    /// Apply a control-point transform to a floating volume, resampling
    /// it onto the sample grid.
    fn propagate(
        &self,
        floating: &Path,
        cpp: &TransformArtifact,
        interpolation: Interpolation,
        out: &Path,
    ) -> Result<(), BackendError>;

    /// Invert the affine transform.
    fn invert_affine(
        &self,
        affine: &TransformArtifact,
    ) -> Result<TransformArtifact, BackendError>;

    /// Freeform registration of the sample onto the atlas, initialized
    /// from the inverted affine, producing the inverse control-point
    /// transform.
    fn register_inverse_freeform(
        &self,
        inverse_affine: &TransformArtifact,
    ) -> Result<TransformArtifact, BackendError>;

    /// Resample a sample-space image onto the atlas grid using the
    /// inverse control-point transform.
    fn transform_to_standard_space(
        &self,
        image: &Path,
        out: &Path,
    ) -> Result<(), BackendError>;

    /// Export the dense deformation field of a control-point transform.
    fn generate_deformation_field(
        &self,
        cpp: &TransformArtifact,
        out: &Path,
    ) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolation_orders() {
        assert_eq!(Interpolation::Nearest.order(), 0);
        assert_eq!(Interpolation::Linear.order(), 1);
    }

    #[test]
    fn artifact_exposes_its_path() {
        let artifact = TransformArtifact::new("/tmp/affine_matrix.txt");
        assert_eq!(artifact.path(), Path::new("/tmp/affine_matrix.txt"));
    }
}
