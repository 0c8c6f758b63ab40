//! Sequential stage driver for one registration run.
//!
//! The orchestrator owns the run: it prepares the working volumes,
//! plays the registration stages against one backend instance, removes
//! the backend intermediates, then derives the volume table, boundary
//! overlay and run metadata from the registered outputs. Stages whose
//! outputs survive from an earlier interrupted run are skipped, so a
//! failed run resumes mid-sequence.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use atlasreg_backend::{
    BackendError, Interpolation, RegistrationBackend, RegistrationParams, TransformArtifact,
};
use atlasreg_common::{
    remap_volume, Atlas, AtlasRegError, HemisphereConvention, LoadFileError, Orientation,
    RegistrationError, Result, ScalingFactors, TransformationError, VoxelSize,
};
use atlasreg_io::{
    load_any_downsampled, load_nii_components, load_nii_f64, load_nii_u32, load_tiff_stack,
    save_nii, save_nii_u16, save_nii_u32, to_tiff_f64, to_tiff_i8, to_tiff_u16, to_tiff_u32,
};
use atlasreg_preprocess::{filter_volume, rescale_to_u16, PreprocessingMode, PreprocessorConfig};
use atlasreg_volumes::{compute_volumes, write_volumes_csv, VolumesError};

use crate::boundaries::boundary_image;
use crate::paths::PipelineArtifactSet;
use crate::tracker::{plan_run, RunPlan, Stage, StageDisposition};

/// One auxiliary channel downsampled and transformed with the sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub path: PathBuf,
}

/// Everything one registration run needs to know.
///
/// Explicit and immutable; serialized verbatim into the run's
/// `atlasreg.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Directory all outputs are written into
    pub output_dir: PathBuf,
    /// Primary sample volume: NIfTI file, TIFF stack, or plane directory
    pub sample_path: PathBuf,
    /// Sample voxel size in micrometers
    pub voxel_size_um: VoxelSize,
    /// Anatomical orientation of the sample data axes
    pub orientation: Orientation,
    /// Atlas directory
    pub atlas_dir: PathBuf,
    /// Backend parameter set
    #[serde(default)]
    pub params: RegistrationParams,
    /// Plane filtering configuration
    #[serde(default)]
    pub preprocessing: PreprocessorConfig,
    /// Hemisphere mask value convention
    #[serde(default)]
    pub hemisphere_convention: HemisphereConvention,
    /// Auxiliary channels registered alongside the primary sample
    #[serde(default)]
    pub additional_channels: Vec<ChannelConfig>,
    /// Directory holding the toolkit binaries; `None` resolves via the
    /// environment
    #[serde(default)]
    pub niftyreg_dir: Option<PathBuf>,
    /// Worker threads handed to the toolkit; 0 keeps its default
    #[serde(default)]
    pub n_threads: u32,
    /// Keep backend intermediates after the run
    #[serde(default)]
    pub debug: bool,
}

/// Contents of the `atlasreg.json` run record
#[derive(Debug, Serialize)]
struct RunMetadata<'a> {
    tool: &'static str,
    version: &'static str,
    atlas: &'a str,
    atlas_orientation: String,
    config: &'a RegistrationConfig,
}

fn registration_failure(stage: &Stage, error: BackendError) -> AtlasRegError {
    RegistrationError::Registration {
        stage: stage.name(),
        detail: error.to_string(),
    }
    .into()
}

fn segmentation_failure(stage: &Stage, error: BackendError) -> AtlasRegError {
    RegistrationError::Segmentation {
        stage: stage.name(),
        detail: error.to_string(),
    }
    .into()
}

fn transformation_failure(stage: &Stage, error: BackendError) -> AtlasRegError {
    TransformationError {
        stage: stage.name(),
        detail: error.to_string(),
    }
    .into()
}

/// Registered label volumes are written as integer TIFF stacks; read
/// them back as label ids.
fn load_label_volume(path: &Path) -> Result<Array3<u32>> {
    let raw = load_tiff_stack(path)?;
    Ok(raw.mapv(|v| v as u32))
}

/// Drives the stage sequence against one backend instance.
pub struct PipelineOrchestrator<B> {
    config: RegistrationConfig,
    atlas: Atlas,
    backend: B,
    artifacts: PipelineArtifactSet,
}

impl<B: RegistrationBackend> PipelineOrchestrator<B> {
    #[must_use]
    pub fn new(config: RegistrationConfig, atlas: Atlas, backend: B) -> Self {
        let artifacts = PipelineArtifactSet::new(&config.output_dir);
        Self {
            config,
            atlas,
            backend,
            artifacts,
        }
    }

    #[must_use]
    pub fn artifacts(&self) -> &PipelineArtifactSet {
        &self.artifacts
    }

    #[must_use]
    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Run every stage, drop the backend intermediates, then derive the
    /// published outputs.
    ///
    /// # Errors
    /// Fails fast on the first stage error; completed artifacts and the
    /// backend directory are left in place so the run can be resumed.
    pub fn run(&self) -> Result<()> {
        fs::create_dir_all(self.artifacts.output_dir())?;
        fs::create_dir_all(self.artifacts.niftyreg.dir())?;

        let channels: Vec<String> = self
            .config
            .additional_channels
            .iter()
            .map(|c| c.name.clone())
            .collect();
        let plan = plan_run(&self.artifacts, &channels, self.config.debug);
        info!(
            pending = plan.pending_count(),
            output = %self.artifacts.output_dir().display(),
            "Starting registration run"
        );

        if self.should_run(&plan, &Stage::Prepare) {
            self.prepare()?;
        }

        let affine = self.affine_stage(&plan)?;
        let forward = self.freeform_stage(&plan, &affine)?;
        self.segment_stage(&plan, &forward)?;
        self.segment_hemispheres_stage(&plan, &forward)?;
        let inverse_affine = self.invert_affine_stage(&plan, &affine)?;
        self.inverse_freeform_stage(&plan, &inverse_affine)?;
        self.standard_space_stage(&plan)?;
        self.deformation_stage(&plan, &forward)?;
        for channel in &self.config.additional_channels {
            self.channel_stage(&plan, channel)?;
        }

        match plan.disposition(&Stage::Cleanup) {
            StageDisposition::Pending => self.cleanup()?,
            StageDisposition::Skip => info!(
                "Keeping backend intermediates in {}",
                self.artifacts.niftyreg.dir().display()
            ),
        }

        self.export_volumes()?;
        self.export_boundaries()?;
        self.export_metadata()?;

        info!(
            "Registration complete. Results can be found here: {}",
            self.artifacts.output_dir().display()
        );
        Ok(())
    }

    fn should_run(&self, plan: &RunPlan, stage: &Stage) -> bool {
        if plan.is_pending(stage) {
            true
        } else {
            info!("Skipping stage '{stage}': outputs already exist");
            false
        }
    }

    fn scaling(&self) -> ScalingFactors {
        ScalingFactors::between(self.config.voxel_size_um, self.atlas.voxel_size_um())
    }

    fn prepare(&self) -> Result<()> {
        info!("Preparing volumes for registration");
        let backend_paths = &self.artifacts.niftyreg;
        let atlas_voxels = self.atlas.voxel_size_um();

        save_nii_u32(self.atlas.annotation(), atlas_voxels, &backend_paths.annotations)?;
        save_nii_u32(self.atlas.hemispheres(), atlas_voxels, &backend_paths.hemispheres)?;

        // The atlas reference always gets the default filter; the
        // configured mode applies to the sample only.
        let reference_config = PreprocessorConfig {
            mode: PreprocessingMode::Default,
            ..self.config.preprocessing.clone()
        };
        let reference = filter_volume(self.atlas.reference().clone(), &reference_config);
        save_nii_u16(&reference, atlas_voxels, &backend_paths.brain_filtered)?;

        info!("Loading raw image data");
        let sample = load_any_downsampled(&self.config.sample_path, self.scaling())?;
        let sample = remap_volume(sample, self.config.orientation, self.atlas.orientation());
        save_nii(&sample, atlas_voxels, &backend_paths.downsampled)?;
        to_tiff_u16(&rescale_to_u16(&sample), &self.artifacts.downsampled)?;

        debug!(shape = ?sample.dim(), "Filtering downsampled sample");
        let filtered = filter_volume(sample, &self.config.preprocessing);
        save_nii_u16(&filtered, atlas_voxels, &backend_paths.downsampled_filtered)?;
        Ok(())
    }

    fn affine_stage(&self, plan: &RunPlan) -> Result<TransformArtifact> {
        let stage = Stage::Affine;
        if !self.should_run(plan, &stage) {
            return Ok(TransformArtifact::new(
                &self.artifacts.niftyreg.affine_matrix,
            ));
        }
        info!("Starting affine registration");
        self.backend
            .register_affine()
            .map_err(|e| registration_failure(&stage, e))
    }

    fn freeform_stage(&self, plan: &RunPlan, affine: &TransformArtifact) -> Result<TransformArtifact> {
        let stage = Stage::Freeform;
        if !self.should_run(plan, &stage) {
            return Ok(TransformArtifact::new(
                &self.artifacts.niftyreg.control_point_file,
            ));
        }
        info!("Starting freeform registration");
        self.backend
            .register_freeform(affine)
            .map_err(|e| registration_failure(&stage, e))
    }

    fn segment_stage(&self, plan: &RunPlan, forward: &TransformArtifact) -> Result<()> {
        let stage = Stage::Segment;
        if !self.should_run(plan, &stage) {
            return Ok(());
        }
        info!("Starting segmentation");
        let backend_paths = &self.artifacts.niftyreg;
        self.backend
            .propagate(
                &backend_paths.annotations,
                forward,
                Interpolation::Nearest,
                &backend_paths.registered_atlas,
            )
            .map_err(|e| segmentation_failure(&stage, e))?;

        let labels = load_nii_u32(&backend_paths.registered_atlas)?;
        to_tiff_u32(&labels, &self.artifacts.annotations)
    }

    fn segment_hemispheres_stage(&self, plan: &RunPlan, forward: &TransformArtifact) -> Result<()> {
        let stage = Stage::SegmentHemispheres;
        if !self.should_run(plan, &stage) {
            return Ok(());
        }
        info!("Segmenting hemispheres");
        let backend_paths = &self.artifacts.niftyreg;
        self.backend
            .propagate(
                &backend_paths.hemispheres,
                forward,
                Interpolation::Nearest,
                &backend_paths.registered_hemispheres,
            )
            .map_err(|e| segmentation_failure(&stage, e))?;

        let mask = load_nii_u32(&backend_paths.registered_hemispheres)?;
        to_tiff_u32(&mask, &self.artifacts.hemispheres)
    }

    fn invert_affine_stage(
        &self,
        plan: &RunPlan,
        affine: &TransformArtifact,
    ) -> Result<TransformArtifact> {
        let stage = Stage::InverseAffine;
        if !self.should_run(plan, &stage) {
            return Ok(TransformArtifact::new(
                &self.artifacts.niftyreg.invert_affine_matrix,
            ));
        }
        info!("Generating inverse (sample to atlas) transforms");
        self.backend
            .invert_affine(affine)
            .map_err(|e| registration_failure(&stage, e))
    }

    fn inverse_freeform_stage(
        &self,
        plan: &RunPlan,
        inverse_affine: &TransformArtifact,
    ) -> Result<TransformArtifact> {
        let stage = Stage::InverseFreeform;
        if !self.should_run(plan, &stage) {
            return Ok(TransformArtifact::new(
                &self.artifacts.niftyreg.inverse_control_point_file,
            ));
        }
        info!("Starting inverse freeform registration");
        self.backend
            .register_inverse_freeform(inverse_affine)
            .map_err(|e| registration_failure(&stage, e))
    }

    fn standard_space_stage(&self, plan: &RunPlan) -> Result<()> {
        let stage = Stage::StandardSpaceTransform;
        if !self.should_run(plan, &stage) {
            return Ok(());
        }
        info!("Transforming image to standard space");
        let backend_paths = &self.artifacts.niftyreg;
        self.backend
            .transform_to_standard_space(
                &backend_paths.downsampled,
                &backend_paths.downsampled_standard,
            )
            .map_err(|e| transformation_failure(&stage, e))?;

        let standard = load_nii_f64(&backend_paths.downsampled_standard)?;
        to_tiff_u16(&rescale_to_u16(&standard), &self.artifacts.downsampled_standard)
    }

    fn deformation_stage(&self, plan: &RunPlan, forward: &TransformArtifact) -> Result<()> {
        let stage = Stage::DeformationField;
        if !self.should_run(plan, &stage) {
            return Ok(());
        }
        let backend_paths = &self.artifacts.niftyreg;
        self.backend
            .generate_deformation_field(forward, &backend_paths.deformation_field)
            .map_err(|e| transformation_failure(&stage, e))?;

        let components = load_nii_components(&backend_paths.deformation_field)?;
        if components.len() < 3 {
            return Err(TransformationError {
                stage: stage.name(),
                detail: format!(
                    "deformation field has {} components, expected 3",
                    components.len()
                ),
            }
            .into());
        }
        for (component, path) in components.iter().zip(&self.artifacts.deformation_fields) {
            to_tiff_f64(component, path)?;
        }
        Ok(())
    }

    fn channel_stage(&self, plan: &RunPlan, channel: &ChannelConfig) -> Result<()> {
        let stage = Stage::AdditionalChannel(channel.name.clone());
        if !self.should_run(plan, &stage) {
            return Ok(());
        }
        info!("Processing additional channel: {}", channel.name);

        let volume = load_any_downsampled(&channel.path, self.scaling())?;
        let volume = remap_volume(volume, self.config.orientation, self.atlas.orientation());
        let volume = rescale_to_u16(&volume);

        let backend_paths = &self.artifacts.niftyreg;
        let channel_nii = backend_paths.downsampled_channel(&channel.name);
        let standard_nii = backend_paths.downsampled_standard_channel(&channel.name);
        save_nii_u16(&volume, self.atlas.voxel_size_um(), &channel_nii)?;
        to_tiff_u16(&volume, &self.artifacts.downsampled_channel(&channel.name))?;

        info!("Transforming channel '{}' to standard space", channel.name);
        self.backend
            .transform_to_standard_space(&channel_nii, &standard_nii)
            .map_err(|e| transformation_failure(&stage, e))?;

        let standard = load_nii_f64(&standard_nii)?;
        to_tiff_u16(
            &rescale_to_u16(&standard),
            &self.artifacts.downsampled_standard_channel(&channel.name),
        )
    }

    fn export_volumes(&self) -> Result<()> {
        info!("Calculating volumes of each brain area");
        let labels = load_label_volume(&self.artifacts.annotations)?;
        let hemispheres = load_label_volume(&self.artifacts.hemispheres)?;
        let records = compute_volumes(
            self.atlas.lookup(),
            self.atlas.voxel_size_um(),
            &labels,
            &hemispheres,
            self.config.hemisphere_convention,
        )
        .map_err(|e| self.volumes_failure(e))?;
        write_volumes_csv(&records, &self.artifacts.volumes_csv).map_err(|e| self.volumes_failure(e))
    }

    fn volumes_failure(&self, error: VolumesError) -> AtlasRegError {
        match error {
            VolumesError::ShapeMismatch { .. } => LoadFileError::DimensionMismatch {
                path: self.artifacts.hemispheres.clone(),
                detail: error.to_string(),
            }
            .into(),
            VolumesError::Csv { path, source } => AtlasRegError::WriteFile {
                path,
                detail: source.to_string(),
            },
        }
    }

    fn export_boundaries(&self) -> Result<()> {
        info!("Generating boundary image");
        let labels = load_label_volume(&self.artifacts.annotations)?;
        let image = boundary_image(&labels);
        debug!("Saving segmentation boundary image");
        to_tiff_i8(&image, &self.artifacts.boundaries)
    }

    fn export_metadata(&self) -> Result<()> {
        let metadata = RunMetadata {
            tool: "atlasreg",
            version: env!("CARGO_PKG_VERSION"),
            atlas: self.atlas.name(),
            atlas_orientation: self.atlas.orientation().code(),
            config: &self.config,
        };
        let write_failure = |detail: String| AtlasRegError::WriteFile {
            path: self.artifacts.metadata.clone(),
            detail,
        };
        let text =
            serde_json::to_string_pretty(&metadata).map_err(|e| write_failure(e.to_string()))?;
        fs::write(&self.artifacts.metadata, text).map_err(|e| write_failure(e.to_string()))?;
        debug!("Wrote run metadata to {}", self.artifacts.metadata.display());
        Ok(())
    }

    fn cleanup(&self) -> Result<()> {
        info!("Deleting intermediate registration files");
        let dir = self.artifacts.niftyreg.dir();
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> RegistrationConfig {
        RegistrationConfig {
            output_dir: PathBuf::from("/data/run"),
            sample_path: PathBuf::from("/data/brain"),
            voxel_size_um: VoxelSize::new(25.0, 25.0, 50.0),
            orientation: Orientation::parse("psl").unwrap(),
            atlas_dir: PathBuf::from("/data/atlas"),
            params: RegistrationParams::default(),
            preprocessing: PreprocessorConfig::default(),
            hemisphere_convention: HemisphereConvention::default(),
            additional_channels: vec![ChannelConfig {
                name: "red".to_string(),
                path: PathBuf::from("/data/red"),
            }],
            niftyreg_dir: None,
            n_threads: 4,
            debug: false,
        }
    }

    #[test]
    fn configuration_round_trips_through_json() {
        let config = sample_config();
        let text = serde_json::to_string(&config).unwrap();
        let back: RegistrationConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.output_dir, config.output_dir);
        assert_eq!(back.orientation.code(), "psl");
        assert_eq!(back.additional_channels[0].name, "red");
        assert_eq!(back.n_threads, 4);
    }

    #[test]
    fn minimal_configuration_fills_defaults() {
        let text = r#"{
            "output_dir": "/data/run",
            "sample_path": "/data/brain.tiff",
            "voxel_size_um": {"x": 10.0, "y": 10.0, "z": 10.0},
            "orientation": "asr",
            "atlas_dir": "/data/atlas"
        }"#;
        let config: RegistrationConfig = serde_json::from_str(text).unwrap();
        assert_eq!(config.n_threads, 0);
        assert!(!config.debug);
        assert!(config.additional_channels.is_empty());
        assert_eq!(config.hemisphere_convention, HemisphereConvention::default());
        assert_eq!(config.params.affine_n_steps, RegistrationParams::default().affine_n_steps);
    }

    #[test]
    fn backend_failures_map_to_stage_tagged_kinds() {
        let spawn = || BackendError::Spawn {
            program: "reg_aladin".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };

        match registration_failure(&Stage::Affine, spawn()) {
            AtlasRegError::Registration(RegistrationError::Registration { stage, .. }) => {
                assert_eq!(stage, "affine");
            }
            other => panic!("unexpected: {other:?}"),
        }

        match segmentation_failure(&Stage::SegmentHemispheres, spawn()) {
            AtlasRegError::Registration(RegistrationError::Segmentation { stage, .. }) => {
                assert_eq!(stage, "segment_hemispheres");
            }
            other => panic!("unexpected: {other:?}"),
        }

        match transformation_failure(&Stage::DeformationField, spawn()) {
            AtlasRegError::Transformation(e) => assert_eq!(e.stage, "deformation"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
