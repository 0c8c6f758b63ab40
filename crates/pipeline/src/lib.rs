//! Registration pipeline: stage planning, orchestration, and the
//! outputs derived after registration.
//!
//! # Features
//! - Artifact-existence stage planning, so interrupted runs resume
//! - Strictly sequential orchestrator generic over the backend
//! - Structure volume table, boundary overlay, and run metadata export
//! - Single-writer output directory with backend intermediates under
//!   `niftyreg/`
//!
//! # Example
//! ```no_run
//! use atlasreg_backend::NiftyRegBackend;
//! use atlasreg_common::{HemisphereConvention, Orientation, VoxelSize};
//! use atlasreg_io::load_atlas;
//! use atlasreg_pipeline::{PipelineArtifactSet, PipelineOrchestrator, RegistrationConfig};
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let atlas = load_atlas(Path::new("atlas/allen_mouse_25um"))?;
//! let config = RegistrationConfig {
//!     output_dir: PathBuf::from("registration"),
//!     sample_path: PathBuf::from("brain.tiff"),
//!     voxel_size_um: VoxelSize::new(2.0, 2.0, 5.0),
//!     orientation: Orientation::parse("psl")?,
//!     atlas_dir: PathBuf::from("atlas/allen_mouse_25um"),
//!     params: Default::default(),
//!     preprocessing: Default::default(),
//!     hemisphere_convention: HemisphereConvention::default(),
//!     additional_channels: Vec::new(),
//!     niftyreg_dir: None,
//!     n_threads: 4,
//!     debug: false,
//! };
//! let artifacts = PipelineArtifactSet::new(&config.output_dir);
//! let backend = NiftyRegBackend::new(
//!     artifacts.niftyreg.clone(),
//!     config.params.clone(),
//!     config.niftyreg_dir.clone(),
//!     config.n_threads,
//! );
//! PipelineOrchestrator::new(config, atlas, backend).run()?;
//! # Ok(())
//! # }
//! ```

pub mod boundaries;
pub mod orchestrator;
pub mod paths;
pub mod tracker;

pub use boundaries::boundary_image;
pub use orchestrator::{ChannelConfig, PipelineOrchestrator, RegistrationConfig};
pub use paths::{PipelineArtifactSet, BACKEND_SUBDIR};
pub use tracker::{plan_run, RunPlan, Stage, StageDisposition};
