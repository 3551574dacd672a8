//! Defacing: removal of facial features from anatomical images.
//!
//! A [`Defacer`] derives a defacing mask from a brain mask; applying that mask to the
//! skull-on images zeroes the face while keeping the brain intact.

mod quickshear;

pub use quickshear::QuickshearDefacer;

use crate::PreprocessResult;
use std::fmt::Debug;
use std::path::Path;

pub trait Defacer: Debug {
    /// Computes a defacing mask from `brain_mask` and writes it to `defacing_mask`.
    fn deface(&self, brain_mask: &Path, defacing_mask: &Path) -> PreprocessResult<()>;

    /// Zeroes the voxels removed by `mask` in `input_image`.
    fn apply_mask(
        &self,
        input_image: &Path,
        mask: &Path,
        defaced_image: &Path,
    ) -> PreprocessResult<()> {
        crate::image::apply_mask(input_image, mask, defaced_image)
    }
}
