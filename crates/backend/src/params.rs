//! Numeric options forwarded to the registration binaries.

use serde::{Deserialize, Serialize};

/// Registration parameter set.
///
/// Defaults are the values tuned for whole-brain microscopy volumes.
/// Negative grid spacing and smoothing sigmas are passed through
/// unchanged; the toolkit interprets negatives as voxel units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationParams {
    /// Pyramid levels used by the affine step
    pub affine_n_steps: u32,
    /// Pyramid levels the affine step actually optimizes
    pub affine_use_n_steps: u32,
    /// Pyramid levels used by the freeform step
    pub freeform_n_steps: u32,
    /// Pyramid levels the freeform step actually optimizes
    pub freeform_use_n_steps: u32,
    /// Bending-energy penalty weight regularizing the deformation
    pub bending_energy_weight: f64,
    /// Control-point grid spacing along the first axis
    pub grid_spacing: i32,
    /// Gaussian smoothing sigma for the reference image
    pub smoothing_sigma_reference: f64,
    /// Gaussian smoothing sigma for the floating image
    pub smoothing_sigma_floating: f64,
    /// Joint-histogram bins for the reference image
    pub histogram_n_bins_reference: u32,
    /// Joint-histogram bins for the floating image
    pub histogram_n_bins_floating: u32,
}

impl Default for RegistrationParams {
    fn default() -> Self {
        Self {
            affine_n_steps: 6,
            affine_use_n_steps: 5,
            freeform_n_steps: 6,
            freeform_use_n_steps: 4,
            bending_energy_weight: 0.95,
            grid_spacing: -10,
            smoothing_sigma_reference: -1.0,
            smoothing_sigma_floating: -1.0,
            histogram_n_bins_reference: 128,
            histogram_n_bins_floating: 128,
        }
    }
}

impl RegistrationParams {
    /// Affine program options, in command-line order.
    #[must_use]
    pub fn affine_args(&self) -> Vec<String> {
        vec![
            "-ln".into(),
            self.affine_n_steps.to_string(),
            "-lp".into(),
            self.affine_use_n_steps.to_string(),
        ]
    }

    /// Freeform program options, in command-line order.
    #[must_use]
    pub fn freeform_args(&self) -> Vec<String> {
        vec![
            "-ln".into(),
            self.freeform_n_steps.to_string(),
            "-lp".into(),
            self.freeform_use_n_steps.to_string(),
            "-sx".into(),
            self.grid_spacing.to_string(),
            "-be".into(),
            self.bending_energy_weight.to_string(),
            "-smooR".into(),
            self.smoothing_sigma_reference.to_string(),
            "-smooF".into(),
            self.smoothing_sigma_floating.to_string(),
            "--rbn".into(),
            self.histogram_n_bins_reference.to_string(),
            "--fbn".into(),
            self.histogram_n_bins_floating.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = RegistrationParams::default();
        assert_eq!(params.affine_n_steps, 6);
        assert_eq!(params.affine_use_n_steps, 5);
        assert_eq!(params.freeform_n_steps, 6);
        assert_eq!(params.freeform_use_n_steps, 4);
        assert_eq!(params.bending_energy_weight, 0.95);
        assert_eq!(params.grid_spacing, -10);
        assert_eq!(params.histogram_n_bins_reference, 128);
        assert_eq!(params.histogram_n_bins_floating, 128);
    }

    #[test]
    fn test_affine_args_order() {
        let args = RegistrationParams::default().affine_args();
        assert_eq!(args, vec!["-ln", "6", "-lp", "5"]);
    }

    #[test]
    fn test_freeform_args_order() {
        let args = RegistrationParams::default().freeform_args();
        assert_eq!(
            args,
            vec![
                "-ln", "6", "-lp", "4", "-sx", "-10", "-be", "0.95", "-smooR", "-1", "-smooF",
                "-1", "--rbn", "128", "--fbn", "128",
            ]
        );
    }
}
