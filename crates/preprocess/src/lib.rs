//! Plane-wise preprocessing filters applied before registration.
//!
//! Registration works best when fine detail the optimizer could overfit is
//! suppressed first. This crate provides the per-plane transforms
//! (despeckle, pseudo-flatfield, periodic-stripe removal, iterative
//! foreground masking) and the volume-level driver that applies them along
//! a configured axis and rescales the result to 16-bit.
//!
//! # Features
//! - Grayscale despeckle via disk-shaped morphological opening
//! - Pseudo-flatfield correction for slow illumination gradients
//! - FFT notch filtering of periodic stripe artifacts
//! - Iterative triangle-threshold foreground masking
//! - Plane-parallel filtering via rayon (optional)
//!
//! # Example
//! ```
//! use atlasreg_preprocess::{filter_volume, PreprocessorConfig};
//! use ndarray::Array3;
//!
//! let volume = Array3::from_elem((4, 32, 32), 100.0);
//! let config = PreprocessorConfig::default();
//! let filtered = filter_volume(volume, &config);
//! assert_eq!(filtered.dim(), (4, 32, 32));
//! ```

pub mod plane;
pub mod stripes;
pub mod volume;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use atlasreg_common::AtlasRegError;

pub use plane::{despeckle, filter_plane, filter_plane_striped, iterative_background_mask, pseudo_flatfield};
pub use stripes::{remove_stripes, StripeDirection};
pub use volume::{filter_volume, rescale_to_u16};

/// Errors raised while interpreting preprocessing configuration
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Unsupported stripe direction: {0}")]
    UnsupportedStripeDirection(String),

    #[error("Unknown preprocessing mode: {0}")]
    UnknownMode(String),
}

impl From<PreprocessError> for AtlasRegError {
    fn from(err: PreprocessError) -> Self {
        AtlasRegError::Config(err.to_string())
    }
}

/// Which per-plane pipeline the volume driver applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreprocessingMode {
    /// Despeckle + pseudo-flatfield along the last axis
    Default,
    /// No per-plane filtering, cast and rescale only
    Skip,
    /// Stripe removal + background zeroing along the first axis
    Striped,
}

impl std::str::FromStr for PreprocessingMode {
    type Err = PreprocessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "skip" => Ok(Self::Skip),
            "striped" => Ok(Self::Striped),
            other => Err(PreprocessError::UnknownMode(other.to_string())),
        }
    }
}

/// Configuration for the volume preprocessor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessorConfig {
    /// Per-plane pipeline selection
    pub mode: PreprocessingMode,
    /// Stripe orientation for the striped pipeline
    pub stripe_direction: StripeDirection,
    /// Largest connected components kept by the foreground mask (3-5)
    pub mask_max_components: usize,
    /// Filter planes in parallel
    pub parallel: bool,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            mode: PreprocessingMode::Default,
            stripe_direction: StripeDirection::Horizontal,
            mask_max_components: 3,
            parallel: false,
        }
    }
}
