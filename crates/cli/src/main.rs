//! Command-line entry point for atlas registration runs.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use atlasreg_backend::{NiftyRegBackend, RegistrationParams};
use atlasreg_common::{HemisphereConvention, Orientation, VoxelSize};
use atlasreg_io::load_atlas;
use atlasreg_pipeline::{
    ChannelConfig, PipelineArtifactSet, PipelineOrchestrator, RegistrationConfig,
};
use atlasreg_preprocess::{PreprocessingMode, PreprocessorConfig, StripeDirection};

mod parser;

use parser::parse_channel;

#[derive(Parser)]
#[command(
    name = "atlasreg",
    version,
    about = "Register 3D brain volumes to a reference atlas",
    long_about = "Register a whole-brain microscopy volume to a reference atlas:\n\
                  downsample and filter the sample, compute the forward and inverse\n\
                  registrations with NiftyReg, propagate the atlas annotation and\n\
                  hemisphere volumes into sample space, and derive per-structure\n\
                  volumes and a boundary overlay.",
    after_help = "EXAMPLES:\n  \
                  # Register a TIFF stack against a local atlas\n  \
                  atlasreg --output-dir out --sample brain.tiff \\\n      \
                  --voxel-size-x 2 --voxel-size-y 2 --voxel-size-z 5 \\\n      \
                  --orientation psl --atlas atlas/allen_mouse_25um\n\n  \
                  # Keep intermediates and register a second channel\n  \
                  atlasreg --output-dir out --sample brain/ --debug \\\n      \
                  --voxel-size-x 2 --voxel-size-y 2 --voxel-size-z 5 \\\n      \
                  --orientation psl --atlas atlas/allen_mouse_25um \\\n      \
                  --additional-channel red=/data/red_channel"
)]
struct Cli {
    /// Directory all outputs are written into
    #[arg(long, value_name = "DIR")]
    output_dir: PathBuf,

    /// Sample volume: NIfTI file, multi-page TIFF, or directory of 2D TIFF planes
    #[arg(long, value_name = "PATH")]
    sample: PathBuf,

    /// Sample voxel size along x in micrometers
    #[arg(long, value_name = "UM")]
    voxel_size_x: f64,

    /// Sample voxel size along y in micrometers
    #[arg(long, value_name = "UM")]
    voxel_size_y: f64,

    /// Sample voxel size along z in micrometers
    #[arg(long, value_name = "UM")]
    voxel_size_z: f64,

    /// Anatomical orientation code of the sample axes (e.g. psl, asr)
    #[arg(long, value_name = "CODE")]
    orientation: String,

    /// Atlas directory
    #[arg(long, value_name = "DIR")]
    atlas: PathBuf,

    /// Plane filtering mode: default, skip, or striped
    #[arg(long, default_value = "default", value_name = "MODE")]
    preprocessing: String,

    /// Stripe axis for the striped mode: horizontal or vertical
    #[arg(long, default_value = "horizontal", value_name = "DIRECTION")]
    stripe_direction: String,

    /// Pyramid levels used by the affine step
    #[arg(long, default_value_t = 6)]
    affine_n_steps: u32,

    /// Pyramid levels the affine step actually optimizes
    #[arg(long, default_value_t = 5)]
    affine_use_n_steps: u32,

    /// Pyramid levels used by the freeform step
    #[arg(long, default_value_t = 6)]
    freeform_n_steps: u32,

    /// Pyramid levels the freeform step actually optimizes
    #[arg(long, default_value_t = 4)]
    freeform_use_n_steps: u32,

    /// Bending-energy penalty weight regularizing the deformation
    #[arg(long, default_value_t = 0.95)]
    bending_energy_weight: f64,

    /// Control-point grid spacing; negative values are voxel units
    #[arg(long, default_value_t = -10, allow_negative_numbers = true)]
    grid_spacing: i32,

    /// Gaussian smoothing sigma for the reference image
    #[arg(long, default_value_t = -1.0, allow_negative_numbers = true)]
    smoothing_sigma_reference: f64,

    /// Gaussian smoothing sigma for the floating image
    #[arg(long, default_value_t = -1.0, allow_negative_numbers = true)]
    smoothing_sigma_floating: f64,

    /// Joint-histogram bins for the reference image
    #[arg(long, default_value_t = 128)]
    histogram_bins_reference: u32,

    /// Joint-histogram bins for the floating image
    #[arg(long, default_value_t = 128)]
    histogram_bins_floating: u32,

    /// Auxiliary channel to downsample and transform, as NAME=PATH
    #[arg(long = "additional-channel", value_name = "NAME=PATH", value_parser = parse_channel)]
    additional_channels: Vec<ChannelConfig>,

    /// Directory holding the NiftyReg binaries
    #[arg(long, value_name = "DIR")]
    niftyreg_dir: Option<PathBuf>,

    /// Worker threads handed to the toolkit (0 = toolkit default)
    #[arg(long, default_value_t = 0)]
    n_threads: u32,

    /// Keep backend intermediates for inspection
    #[arg(long)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(cli: &Cli) -> Result<RegistrationConfig> {
    let orientation = Orientation::parse(&cli.orientation)?;
    let mode: PreprocessingMode = cli.preprocessing.parse()?;
    let stripe_direction: StripeDirection = cli.stripe_direction.parse()?;

    let params = RegistrationParams {
        affine_n_steps: cli.affine_n_steps,
        affine_use_n_steps: cli.affine_use_n_steps,
        freeform_n_steps: cli.freeform_n_steps,
        freeform_use_n_steps: cli.freeform_use_n_steps,
        bending_energy_weight: cli.bending_energy_weight,
        grid_spacing: cli.grid_spacing,
        smoothing_sigma_reference: cli.smoothing_sigma_reference,
        smoothing_sigma_floating: cli.smoothing_sigma_floating,
        histogram_n_bins_reference: cli.histogram_bins_reference,
        histogram_n_bins_floating: cli.histogram_bins_floating,
    };

    let preprocessing = PreprocessorConfig {
        mode,
        stripe_direction,
        parallel: cli.n_threads > 1,
        ..PreprocessorConfig::default()
    };

    Ok(RegistrationConfig {
        output_dir: cli.output_dir.clone(),
        sample_path: cli.sample.clone(),
        voxel_size_um: VoxelSize::new(cli.voxel_size_x, cli.voxel_size_y, cli.voxel_size_z),
        orientation,
        atlas_dir: cli.atlas.clone(),
        params,
        preprocessing,
        hemisphere_convention: HemisphereConvention::default(),
        additional_channels: cli.additional_channels.clone(),
        niftyreg_dir: cli.niftyreg_dir.clone(),
        n_threads: cli.n_threads,
        debug: cli.debug,
    })
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = build_config(&cli)?;
    let atlas = load_atlas(&config.atlas_dir)
        .with_context(|| format!("Failed to load atlas from {}", config.atlas_dir.display()))?;

    let artifacts = PipelineArtifactSet::new(&config.output_dir);
    let backend = NiftyRegBackend::new(
        artifacts.niftyreg.clone(),
        config.params.clone(),
        config.niftyreg_dir.clone(),
        config.n_threads,
    );

    PipelineOrchestrator::new(config, atlas, backend).run()?;
    Ok(())
}
