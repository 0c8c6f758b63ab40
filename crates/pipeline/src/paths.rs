//! Locations of the files a run publishes in its output directory.

use std::path::{Path, PathBuf};

use atlasreg_backend::NiftyRegPaths;

/// Subdirectory holding backend intermediates; removed by the cleanup
/// stage unless the run keeps them for debugging.
pub const BACKEND_SUBDIR: &str = "niftyreg";

/// Path registry for every published output of one registration run.
///
/// The registry never touches the filesystem; the backend intermediates
/// live in their own [`NiftyRegPaths`] registry nested under
/// [`BACKEND_SUBDIR`].
#[derive(Debug, Clone)]
pub struct PipelineArtifactSet {
    output_dir: PathBuf,
    /// Downsampled, reoriented sample
    pub downsampled: PathBuf,
    /// Sample resampled onto the atlas grid
    pub downsampled_standard: PathBuf,
    /// Structure boundary overlay
    pub boundaries: PathBuf,
    /// Hemisphere mask propagated into sample space
    pub hemispheres: PathBuf,
    /// Annotation volume propagated into sample space
    pub annotations: PathBuf,
    /// Deformation field components, one volume per atlas axis
    pub deformation_fields: [PathBuf; 3],
    /// Per-structure volume table
    pub volumes_csv: PathBuf,
    /// Serialized run configuration and tool version
    pub metadata: PathBuf,
    /// Backend intermediates
    pub niftyreg: NiftyRegPaths,
}

impl PipelineArtifactSet {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        let file = |name: &str| output_dir.join(name);
        Self {
            downsampled: file("downsampled.tiff"),
            downsampled_standard: file("downsampled_standard.tiff"),
            boundaries: file("boundaries.tiff"),
            hemispheres: file("hemispheres.tiff"),
            annotations: file("annotations.tiff"),
            deformation_fields: [
                file("deformation_field_0.tiff"),
                file("deformation_field_1.tiff"),
                file("deformation_field_2.tiff"),
            ],
            volumes_csv: file("volumes.csv"),
            metadata: file("atlasreg.json"),
            niftyreg: NiftyRegPaths::new(output_dir.join(BACKEND_SUBDIR)),
            output_dir,
        }
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Downsampled auxiliary channel export
    #[must_use]
    pub fn downsampled_channel(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("downsampled_{name}.tiff"))
    }

    /// Auxiliary channel export in atlas space
    #[must_use]
    pub fn downsampled_standard_channel(&self, name: &str) -> PathBuf {
        self.output_dir
            .join(format!("downsampled_standard_{name}.tiff"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_are_rooted_in_the_run_directory() {
        let artifacts = PipelineArtifactSet::new("/data/run");
        assert_eq!(artifacts.output_dir(), Path::new("/data/run"));
        assert_eq!(artifacts.downsampled, Path::new("/data/run/downsampled.tiff"));
        assert_eq!(artifacts.volumes_csv, Path::new("/data/run/volumes.csv"));
        assert_eq!(artifacts.metadata, Path::new("/data/run/atlasreg.json"));
        assert_eq!(
            artifacts.deformation_fields[2],
            Path::new("/data/run/deformation_field_2.tiff")
        );
    }

    #[test]
    fn backend_files_live_in_the_niftyreg_subdirectory() {
        let artifacts = PipelineArtifactSet::new("/data/run");
        assert_eq!(artifacts.niftyreg.dir(), Path::new("/data/run/niftyreg"));
        assert_eq!(
            artifacts.niftyreg.affine_matrix,
            Path::new("/data/run/niftyreg/affine_matrix.txt")
        );
    }

    #[test]
    fn channel_exports_embed_the_channel_name() {
        let artifacts = PipelineArtifactSet::new("/data/run");
        assert_eq!(
            artifacts.downsampled_channel("red"),
            Path::new("/data/run/downsampled_red.tiff")
        );
        assert_eq!(
            artifacts.downsampled_standard_channel("red"),
            Path::new("/data/run/downsampled_standard_red.tiff")
        );
    }
}
