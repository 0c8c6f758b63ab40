//! Narrow volume I/O seam for the registration pipeline.
//!
//! Wraps the `nifti` and `tiff` codec crates behind a handful of typed
//! load/save calls. The only logic that lives here is shape validation,
//! the load-failure diagnostics raised before registration starts, and
//! nearest-index downsampling applied at load time.

pub mod atlas_files;
pub mod load;
pub mod nii;
pub mod tiff_stack;

pub use atlas_files::load_atlas;
pub use load::{load_any, load_any_downsampled};
pub use nii::{
    load_nii_components, load_nii_f64, load_nii_u32, save_nii, save_nii_components, save_nii_u16,
    save_nii_u32,
};
pub use tiff_stack::{load_tiff_stack, to_tiff_f64, to_tiff_i8, to_tiff_u16, to_tiff_u32};
