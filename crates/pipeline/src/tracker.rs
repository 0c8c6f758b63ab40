//! Stage planning for resumable runs.
//!
//! Each stage declares the artifact files that mark it complete. A plan
//! is computed once, before anything executes: a stage whose artifacts
//! all exist is skipped, everything else runs. Ordering is the only
//! dependency information; the plan is never re-evaluated mid-run.

use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use crate::paths::PipelineArtifactSet;

/// A pipeline stage, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Save atlas volumes and the raw/filtered sample for the backend
    Prepare,
    /// Affine registration of the atlas onto the sample
    Affine,
    /// Freeform refinement of the affine result
    Freeform,
    /// Propagate the annotation volume into sample space
    Segment,
    /// Propagate the hemisphere mask into sample space
    SegmentHemispheres,
    /// Invert the affine transform
    InverseAffine,
    /// Freeform registration of the sample back onto the atlas
    InverseFreeform,
    /// Resample the sample onto the atlas grid
    StandardSpaceTransform,
    /// Export the dense deformation field
    DeformationField,
    /// Downsample and transform one auxiliary channel
    AdditionalChannel(String),
    /// Remove backend intermediates
    Cleanup,
}

impl Stage {
    /// Stage name used in logs and error reports
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Prepare => "prepare".to_string(),
            Self::Affine => "affine".to_string(),
            Self::Freeform => "freeform".to_string(),
            Self::Segment => "segment".to_string(),
            Self::SegmentHemispheres => "segment_hemispheres".to_string(),
            Self::InverseAffine => "invert_affine".to_string(),
            Self::InverseFreeform => "inverse_freeform".to_string(),
            Self::StandardSpaceTransform => "standard_space".to_string(),
            Self::DeformationField => "deformation".to_string(),
            Self::AdditionalChannel(name) => format!("channel_{name}"),
            Self::Cleanup => "cleanup".to_string(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Verdict for one planned stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageDisposition {
    /// Stage must run
    Pending,
    /// Stage outputs already exist, or cleanup is suppressed
    Skip,
}

/// Immutable execution plan, computed once before the run starts
#[derive(Debug, Clone)]
pub struct RunPlan {
    entries: Vec<(Stage, StageDisposition)>,
}

impl RunPlan {
    /// Verdict for a stage. Stages outside the plan run unconditionally.
    #[must_use]
    pub fn disposition(&self, stage: &Stage) -> StageDisposition {
        self.entries
            .iter()
            .find(|(planned, _)| planned == stage)
            .map_or(StageDisposition::Pending, |(_, disposition)| *disposition)
    }

    #[must_use]
    pub fn is_pending(&self, stage: &Stage) -> bool {
        self.disposition(stage) == StageDisposition::Pending
    }

    /// Planned stages in execution order
    pub fn entries(&self) -> impl Iterator<Item = &(Stage, StageDisposition)> {
        self.entries.iter()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, d)| *d == StageDisposition::Pending)
            .count()
    }
}

/// Files that must all exist for a stage to be considered complete.
///
/// `Cleanup` declares none; its verdict comes from the debug flag.
#[must_use]
pub fn stage_artifacts(stage: &Stage, artifacts: &PipelineArtifactSet) -> Vec<PathBuf> {
    let backend = &artifacts.niftyreg;
    match stage {
        Stage::Prepare => vec![
            backend.annotations.clone(),
            backend.hemispheres.clone(),
            backend.brain_filtered.clone(),
            backend.downsampled.clone(),
            backend.downsampled_filtered.clone(),
            artifacts.downsampled.clone(),
        ],
        Stage::Affine => vec![
            backend.affine_matrix.clone(),
            backend.affine_registered_atlas_brain.clone(),
        ],
        Stage::Freeform => vec![
            backend.control_point_file.clone(),
            backend.freeform_registered_atlas_brain.clone(),
        ],
        Stage::Segment => vec![backend.registered_atlas.clone(), artifacts.annotations.clone()],
        Stage::SegmentHemispheres => vec![
            backend.registered_hemispheres.clone(),
            artifacts.hemispheres.clone(),
        ],
        Stage::InverseAffine => vec![backend.invert_affine_matrix.clone()],
        Stage::InverseFreeform => vec![
            backend.inverse_control_point_file.clone(),
            backend.inverse_freeform_registered_brain.clone(),
        ],
        Stage::StandardSpaceTransform => vec![
            backend.downsampled_standard.clone(),
            artifacts.downsampled_standard.clone(),
        ],
        Stage::DeformationField => {
            let mut files = vec![backend.deformation_field.clone()];
            files.extend(artifacts.deformation_fields.iter().cloned());
            files
        }
        Stage::AdditionalChannel(name) => vec![
            artifacts.downsampled_channel(name),
            artifacts.downsampled_standard_channel(name),
        ],
        Stage::Cleanup => Vec::new(),
    }
}

/// Plan one run over the fixed stage sequence plus the configured
/// auxiliary channels.
#[must_use]
pub fn plan_run(artifacts: &PipelineArtifactSet, channels: &[String], debug: bool) -> RunPlan {
    let mut stages = vec![
        Stage::Prepare,
        Stage::Affine,
        Stage::Freeform,
        Stage::Segment,
        Stage::SegmentHemispheres,
        Stage::InverseAffine,
        Stage::InverseFreeform,
        Stage::StandardSpaceTransform,
        Stage::DeformationField,
    ];
    stages.extend(channels.iter().cloned().map(Stage::AdditionalChannel));
    stages.push(Stage::Cleanup);

    let entries = stages
        .into_iter()
        .map(|stage| {
            let disposition = if stage == Stage::Cleanup {
                if debug {
                    StageDisposition::Skip
                } else {
                    StageDisposition::Pending
                }
            } else {
                let files = stage_artifacts(&stage, artifacts);
                if files.iter().all(|file| file.exists()) {
                    debug!("Stage '{stage}' already has its outputs");
                    StageDisposition::Skip
                } else {
                    StageDisposition::Pending
                }
            };
            (stage, disposition)
        })
        .collect();
    RunPlan { entries }
}
