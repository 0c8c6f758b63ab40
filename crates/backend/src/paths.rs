//! Locations of toolkit intermediates inside the backend working
//! directory.

use std::path::{Path, PathBuf};

/// Path registry for every file the toolkit reads or writes.
///
/// All files live in one private working directory owned by a single
/// run; the registry itself never touches the filesystem.
#[derive(Debug, Clone)]
pub struct NiftyRegPaths {
    dir: PathBuf,
    /// Atlas annotation volume handed to the toolkit
    pub annotations: PathBuf,
    /// Atlas hemisphere mask handed to the toolkit
    pub hemispheres: PathBuf,
    /// Filtered atlas reference brain (registration floating image)
    pub brain_filtered: PathBuf,
    /// Downsampled, reoriented sample as given
    pub downsampled: PathBuf,
    /// Filtered downsampled sample (registration reference image)
    pub downsampled_filtered: PathBuf,
    /// Downsampled sample resampled onto the atlas grid
    pub downsampled_standard: PathBuf,
    /// Annotation volume propagated into sample space
    pub registered_atlas: PathBuf,
    /// Hemisphere mask propagated into sample space
    pub registered_hemispheres: PathBuf,
    /// Affine-only resampled atlas brain (registration check image)
    pub affine_registered_atlas_brain: PathBuf,
    /// Freeform resampled atlas brain (registration check image)
    pub freeform_registered_atlas_brain: PathBuf,
    /// Sample resampled onto the atlas (inverse check image)
    pub inverse_freeform_registered_brain: PathBuf,
    /// Forward affine transform matrix
    pub affine_matrix: PathBuf,
    /// Inverted affine transform matrix
    pub invert_affine_matrix: PathBuf,
    /// Forward control-point transform
    pub control_point_file: PathBuf,
    /// Inverse control-point transform
    pub inverse_control_point_file: PathBuf,
    /// Dense deformation field of the forward transform
    pub deformation_field: PathBuf,
}

impl NiftyRegPaths {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let file = |name: &str| dir.join(name);
        Self {
            annotations: file("annotations.nii"),
            hemispheres: file("hemispheres.nii"),
            brain_filtered: file("brain_filtered.nii"),
            downsampled: file("downsampled.nii"),
            downsampled_filtered: file("downsampled_filtered.nii"),
            downsampled_standard: file("downsampled_standard.nii"),
            registered_atlas: file("registered_atlas.nii"),
            registered_hemispheres: file("registered_hemispheres.nii"),
            affine_registered_atlas_brain: file("affine_registered_atlas_brain.nii"),
            freeform_registered_atlas_brain: file("freeform_registered_atlas_brain.nii"),
            inverse_freeform_registered_brain: file("inverse_freeform_registered_brain.nii"),
            affine_matrix: file("affine_matrix.txt"),
            invert_affine_matrix: file("invert_affine_matrix.txt"),
            control_point_file: file("control_point_file.nii"),
            inverse_control_point_file: file("inverse_control_point_file.nii"),
            deformation_field: file("deformation_field.nii"),
            dir,
        }
    }

    /// Backend working directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Downsampled auxiliary channel volume
    #[must_use]
    pub fn downsampled_channel(&self, name: &str) -> PathBuf {
        self.dir.join(format!("downsampled_{name}.nii"))
    }

    /// Auxiliary channel volume resampled onto the atlas grid
    #[must_use]
    pub fn downsampled_standard_channel(&self, name: &str) -> PathBuf {
        self.dir.join(format!("downsampled_standard_{name}.nii"))
    }

    /// Stdout capture file for a toolkit stage
    #[must_use]
    pub fn log_file(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{stage}.log"))
    }

    /// Stderr capture file for a toolkit stage
    #[must_use]
    pub fn err_file(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{stage}.err"))
    }
}
