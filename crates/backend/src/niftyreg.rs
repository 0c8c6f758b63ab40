//! NiftyReg subprocess driver.
//!
//! Assembles and runs the four toolkit binaries (`reg_aladin`,
//! `reg_f3d`, `reg_resample`, `reg_transform`), capturing each child's
//! stdout and stderr into per-stage `.log` / `.err` files in the backend
//! working directory.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::params::RegistrationParams;
use crate::paths::NiftyRegPaths;
use crate::{BackendError, Interpolation, RegistrationBackend, TransformArtifact};

const AFFINE_PROGRAM: &str = "reg_aladin";
const FREEFORM_PROGRAM: &str = "reg_f3d";
const RESAMPLE_PROGRAM: &str = "reg_resample";
const TRANSFORM_PROGRAM: &str = "reg_transform";

/// Environment variable pointing at a NiftyReg installation directory
const NIFTYREG_DIR_ENV: &str = "NIFTYREG_DIR";

/// Lines of child stderr carried into error messages
const STDERR_TAIL_LINES: usize = 5;

/// Subprocess-driven NiftyReg implementation of [`RegistrationBackend`]
#[derive(Debug)]
pub struct NiftyRegBackend {
    paths: NiftyRegPaths,
    params: RegistrationParams,
    binary_dir: Option<PathBuf>,
    n_threads: u32,
}

impl NiftyRegBackend {
    /// Build a backend over the given working paths and parameters.
    ///
    /// `binary_dir` pins the toolkit installation; otherwise the
    /// `NIFTYREG_DIR` environment variable is consulted, then bare
    /// program names are left to `PATH` resolution. `n_threads = 0`
    /// leaves thread scheduling to the toolkit.
    #[must_use]
    pub fn new(
        paths: NiftyRegPaths,
        params: RegistrationParams,
        binary_dir: Option<PathBuf>,
        n_threads: u32,
    ) -> Self {
        Self {
            paths,
            params,
            binary_dir,
            n_threads,
        }
    }

    /// Working paths this backend reads and writes
    #[must_use]
    pub fn paths(&self) -> &NiftyRegPaths {
        &self.paths
    }

    fn program(&self, name: &str) -> PathBuf {
        if let Some(dir) = &self.binary_dir {
            return dir.join(name);
        }
        if let Ok(dir) = std::env::var(NIFTYREG_DIR_ENV) {
            return PathBuf::from(dir).join(name);
        }
        PathBuf::from(name)
    }

    fn omp_args(&self) -> Vec<OsString> {
        if self.n_threads > 0 {
            vec!["-omp".into(), self.n_threads.to_string().into()]
        } else {
            Vec::new()
        }
    }

    fn affine_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> =
            self.params.affine_args().into_iter().map(Into::into).collect();
        push_flag(&mut args, "-flo", &self.paths.brain_filtered);
        push_flag(&mut args, "-ref", &self.paths.downsampled_filtered);
        push_flag(&mut args, "-aff", &self.paths.affine_matrix);
        push_flag(&mut args, "-res", &self.paths.affine_registered_atlas_brain);
        args.extend(self.omp_args());
        args
    }

    fn freeform_args(
        &self,
        init_affine: &Path,
        floating: &Path,
        reference: &Path,
        cpp: &Path,
        resampled: &Path,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = self
            .params
            .freeform_args()
            .into_iter()
            .map(Into::into)
            .collect();
        push_flag(&mut args, "-aff", init_affine);
        push_flag(&mut args, "-flo", floating);
        push_flag(&mut args, "-ref", reference);
        push_flag(&mut args, "-cpp", cpp);
        push_flag(&mut args, "-res", resampled);
        args.extend(self.omp_args());
        args
    }

    fn resample_args(
        &self,
        cpp: &Path,
        floating: &Path,
        reference: &Path,
        interpolation: Interpolation,
        out: &Path,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> =
            vec!["-inter".into(), interpolation.order().to_string().into()];
        push_flag(&mut args, "-cpp", cpp);
        push_flag(&mut args, "-flo", floating);
        push_flag(&mut args, "-ref", reference);
        push_flag(&mut args, "-res", out);
        args
    }

    fn invert_affine_args(&self, affine: &Path) -> Vec<OsString> {
        vec![
            "-invAff".into(),
            affine.into(),
            self.paths.invert_affine_matrix.clone().into(),
        ]
    }

    fn deformation_args(&self, cpp: &Path, out: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        push_flag(&mut args, "-def", cpp);
        args.push(out.into());
        push_flag(&mut args, "-ref", &self.paths.downsampled_filtered);
        args
    }

    /// Run one toolkit invocation, capturing stdout and stderr into the
    /// stage's log files.
    fn run(&self, stage: &str, program_name: &str, args: &[OsString]) -> Result<(), BackendError> {
        let program = self.program(program_name);
        debug!("Running {} for '{}': {:?}", program.display(), stage, args);

        let output = Command::new(&program)
            .args(args)
            .output()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => BackendError::MissingBinary(program.clone()),
                _ => BackendError::Spawn {
                    program: program.display().to_string(),
                    source: err,
                },
            })?;

        fs::write(self.paths.log_file(stage), &output.stdout)?;
        fs::write(self.paths.err_file(stage), &output.stderr)?;

        if !output.status.success() {
            return Err(BackendError::CommandFailed {
                program: program_name.to_string(),
                stage: stage.to_string(),
                status: output.status,
                stderr_tail: stderr_tail(&output.stderr),
            });
        }
        Ok(())
    }
}

impl RegistrationBackend for NiftyRegBackend {
    fn register_affine(&self) -> Result<TransformArtifact, BackendError> {
        self.run("affine", AFFINE_PROGRAM, &self.affine_args())?;
        Ok(TransformArtifact::new(self.paths.affine_matrix.clone()))
    }

    fn register_freeform(
        &self,
        affine: &TransformArtifact,
    ) -> Result<TransformArtifact, BackendError> {
        let args = self.freeform_args(
            affine.path(),
            &self.paths.brain_filtered,
            &self.paths.downsampled_filtered,
            &self.paths.control_point_file,
            &self.paths.freeform_registered_atlas_brain,
        );
        self.run("freeform", FREEFORM_PROGRAM, &args)?;
        Ok(TransformArtifact::new(self.paths.control_point_file.clone()))
    }

    fn propagate(
        &self,
        floating: &Path,
        cpp: &TransformArtifact,
        interpolation: Interpolation,
        out: &Path,
    ) -> Result<(), BackendError> {
        let args = self.resample_args(
            cpp.path(),
            floating,
            &self.paths.downsampled_filtered,
            interpolation,
            out,
        );
        self.run("segment", RESAMPLE_PROGRAM, &args)
    }

    fn invert_affine(
        &self,
        affine: &TransformArtifact,
    ) -> Result<TransformArtifact, BackendError> {
        debug!("Generating inverse affine transform");
        self.run(
            "invert_affine",
            TRANSFORM_PROGRAM,
            &self.invert_affine_args(affine.path()),
        )?;
        Ok(TransformArtifact::new(
            self.paths.invert_affine_matrix.clone(),
        ))
    }

    fn register_inverse_freeform(
        &self,
        inverse_affine: &TransformArtifact,
    ) -> Result<TransformArtifact, BackendError> {
        debug!("Registering the sample to the atlas");
        let args = self.freeform_args(
            inverse_affine.path(),
            &self.paths.downsampled_filtered,
            &self.paths.brain_filtered,
            &self.paths.inverse_control_point_file,
            &self.paths.inverse_freeform_registered_brain,
        );
        self.run("inverse_freeform", FREEFORM_PROGRAM, &args)?;
        Ok(TransformArtifact::new(
            self.paths.inverse_control_point_file.clone(),
        ))
    }

    fn transform_to_standard_space(
        &self,
        image: &Path,
        out: &Path,
    ) -> Result<(), BackendError> {
        let args = self.resample_args(
            &self.paths.inverse_control_point_file,
            image,
            &self.paths.brain_filtered,
            Interpolation::Nearest,
            out,
        );
        self.run("inverse_transform", RESAMPLE_PROGRAM, &args)
    }

    fn generate_deformation_field(
        &self,
        cpp: &TransformArtifact,
        out: &Path,
    ) -> Result<(), BackendError> {
        info!("Generating deformation field");
        self.run(
            "deformation",
            TRANSFORM_PROGRAM,
            &self.deformation_args(cpp.path(), out),
        )
    }
}

fn push_flag(args: &mut Vec<OsString>, flag: &str, value: impl AsRef<OsStr>) {
    args.push(flag.into());
    args.push(value.as_ref().to_os_string());
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(n_threads: u32) -> NiftyRegBackend {
        NiftyRegBackend::new(
            NiftyRegPaths::new("/work"),
            RegistrationParams::default(),
            None,
            n_threads,
        )
    }

    fn as_strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_affine_command_shape() {
        let args = as_strings(&backend(0).affine_args());
        assert_eq!(
            args,
            vec![
                "-ln",
                "6",
                "-lp",
                "5",
                "-flo",
                "/work/brain_filtered.nii",
                "-ref",
                "/work/downsampled_filtered.nii",
                "-aff",
                "/work/affine_matrix.txt",
                "-res",
                "/work/affine_registered_atlas_brain.nii",
            ]
        );
    }

    #[test]
    fn test_omp_flag_appended_when_threads_set() {
        let args = as_strings(&backend(4).affine_args());
        assert_eq!(&args[args.len() - 2..], &["-omp", "4"]);

        let args = as_strings(&backend(0).affine_args());
        assert!(!args.contains(&"-omp".to_string()));
    }

    #[test]
    fn test_freeform_command_shape() {
        let b = backend(0);
        let args = as_strings(&b.freeform_args(
            &b.paths.affine_matrix,
            &b.paths.brain_filtered,
            &b.paths.downsampled_filtered,
            &b.paths.control_point_file,
            &b.paths.freeform_registered_atlas_brain,
        ));
        assert_eq!(
            args,
            vec![
                "-ln",
                "6",
                "-lp",
                "4",
                "-sx",
                "-10",
                "-be",
                "0.95",
                "-smooR",
                "-1",
                "-smooF",
                "-1",
                "--rbn",
                "128",
                "--fbn",
                "128",
                "-aff",
                "/work/affine_matrix.txt",
                "-flo",
                "/work/brain_filtered.nii",
                "-ref",
                "/work/downsampled_filtered.nii",
                "-cpp",
                "/work/control_point_file.nii",
                "-res",
                "/work/freeform_registered_atlas_brain.nii",
            ]
        );
    }

    #[test]
    fn test_resample_interpolation_order() {
        let b = backend(0);
        let nearest = as_strings(&b.resample_args(
            &b.paths.control_point_file,
            Path::new("/work/annotations.nii"),
            &b.paths.downsampled_filtered,
            Interpolation::Nearest,
            Path::new("/work/registered_atlas.nii"),
        ));
        assert_eq!(
            nearest,
            vec![
                "-inter",
                "0",
                "-cpp",
                "/work/control_point_file.nii",
                "-flo",
                "/work/annotations.nii",
                "-ref",
                "/work/downsampled_filtered.nii",
                "-res",
                "/work/registered_atlas.nii",
            ]
        );

        let linear = as_strings(&b.resample_args(
            &b.paths.control_point_file,
            Path::new("/f.nii"),
            &b.paths.downsampled_filtered,
            Interpolation::Linear,
            Path::new("/o.nii"),
        ));
        assert_eq!(&linear[..2], &["-inter", "1"]);
    }

    #[test]
    fn test_invert_affine_is_positional() {
        let b = backend(0);
        let args = as_strings(&b.invert_affine_args(&b.paths.affine_matrix));
        assert_eq!(
            args,
            vec![
                "-invAff",
                "/work/affine_matrix.txt",
                "/work/invert_affine_matrix.txt",
            ]
        );
    }

    #[test]
    fn test_deformation_command_shape() {
        let b = backend(0);
        let args = as_strings(&b.deformation_args(
            &b.paths.control_point_file,
            Path::new("/work/deformation_field.nii"),
        ));
        assert_eq!(
            args,
            vec![
                "-def",
                "/work/control_point_file.nii",
                "/work/deformation_field.nii",
                "-ref",
                "/work/downsampled_filtered.nii",
            ]
        );
    }

    #[test]
    fn test_explicit_binary_dir_wins() {
        let b = NiftyRegBackend::new(
            NiftyRegPaths::new("/work"),
            RegistrationParams::default(),
            Some(PathBuf::from("/opt/niftyreg/bin")),
            0,
        );
        assert_eq!(
            b.program(AFFINE_PROGRAM),
            Path::new("/opt/niftyreg/bin/reg_aladin")
        );
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr = b"line1\nline2\nline3\nline4\nline5\nline6\nline7";
        assert_eq!(stderr_tail(stderr), "line3 | line4 | line5 | line6 | line7");
        assert_eq!(stderr_tail(b"only"), "only");
        assert_eq!(stderr_tail(b""), "");
    }
}
