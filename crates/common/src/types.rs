//! Physical voxel geometry and run-wide numeric conventions.

use serde::{Deserialize, Serialize};

/// Decimal places kept when deriving per-axis scaling factors
pub const SCALING_ROUNDING_DECIMALS: u32 = 5;

/// Physical voxel size in micrometers, one value per axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelSize {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl VoxelSize {
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Volume of one voxel in cubic millimeters.
    #[must_use]
    pub fn voxel_volume_mm3(&self) -> f64 {
        (self.x * self.y * self.z) / 1000_f64.powi(3)
    }
}

/// Per-axis ratio of sample voxel size to atlas voxel size.
///
/// Computed once per run and immutable afterward; used to resample the
/// sample volume into atlas voxel space before registration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingFactors {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl ScalingFactors {
    pub const IDENTITY: Self = Self {
        x: 1.0,
        y: 1.0,
        z: 1.0,
    };

    #[must_use]
    pub fn between(sample: VoxelSize, atlas: VoxelSize) -> Self {
        Self {
            x: round_decimals(sample.x / atlas.x, SCALING_ROUNDING_DECIMALS),
            y: round_decimals(sample.y / atlas.y, SCALING_ROUNDING_DECIMALS),
            z: round_decimals(sample.z / atlas.z, SCALING_ROUNDING_DECIMALS),
        }
    }
}

fn round_decimals(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Which integer marks each hemisphere in the hemisphere-mask volume.
///
/// The canonical convention is left = 1, right = 2; 0 always means
/// outside the brain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HemisphereConvention {
    pub left: u32,
    pub right: u32,
}

impl Default for HemisphereConvention {
    fn default() -> Self {
        Self { left: 1, right: 2 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voxel_volume_converts_to_mm3() {
        let size = VoxelSize::new(10.0, 10.0, 10.0);
        assert!((size.voxel_volume_mm3() - 1e-6).abs() < 1e-18);

        let size = VoxelSize::new(25.0, 25.0, 50.0);
        let expected = 25.0 * 25.0 * 50.0 / 1e9;
        assert!((size.voxel_volume_mm3() - expected).abs() < 1e-18);
    }

    #[test]
    fn scaling_factors_round_to_five_decimals() {
        let sample = VoxelSize::new(2.0, 2.0, 5.0);
        let atlas = VoxelSize::new(3.0, 3.0, 3.0);
        let scaling = ScalingFactors::between(sample, atlas);
        assert_eq!(scaling.x, 0.66667);
        assert_eq!(scaling.y, 0.66667);
        assert_eq!(scaling.z, 1.66667);
    }

    #[test]
    fn identity_scaling_for_matching_resolution() {
        let res = VoxelSize::new(25.0, 25.0, 25.0);
        assert_eq!(ScalingFactors::between(res, res), ScalingFactors::IDENTITY);
    }

    #[test]
    fn default_hemisphere_convention() {
        let convention = HemisphereConvention::default();
        assert_eq!(convention.left, 1);
        assert_eq!(convention.right, 2);
    }
}
