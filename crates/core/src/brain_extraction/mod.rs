//! Brain extraction (skull stripping).
//!
//! A [`BrainExtractor`] produces a skull-stripped image together with a binary brain mask for
//! the center modality. The mask is then propagated to the co-registered modalities with
//! [`BrainExtractor::apply_mask`].

mod hd_bet;

pub use hd_bet::{HdBetExtractor, HdBetMode};

use crate::command::ToolEnv;
use crate::PreprocessResult;
use std::fmt::Debug;
use std::path::Path;

pub trait BrainExtractor: Debug {
    /// Extracts the brain from `input_image`, writing the masked image and the mask.
    fn extract(
        &self,
        input_image: &Path,
        masked_image: &Path,
        brain_mask: &Path,
        log_file: &Path,
        env: &ToolEnv,
    ) -> PreprocessResult<()>;

    /// Zeroes everything outside `mask` in `input_image`.
    fn apply_mask(
        &self,
        input_image: &Path,
        mask: &Path,
        masked_image: &Path,
    ) -> PreprocessResult<()> {
        crate::image::apply_mask(input_image, mask, masked_image)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::image::test_support::write_volume;
    use crate::PreprocessError;
    use ndarray::{s, Array3};

    pub const SHAPE: (usize, usize, usize) = (4, 20, 20);

    /// Brain occupying `y` 5..15 and `z` 8..18 of a [`SHAPE`] volume.
    pub fn brain_cube() -> Array3<f32> {
        let mut cube = Array3::zeros(SHAPE);
        cube.slice_mut(s![.., 5..15, 8..18]).fill(1.0);
        cube
    }

    /// Writes [`brain_cube`] as the mask and masks the input with it.
    #[derive(Debug)]
    pub struct CubeExtractor;

    impl BrainExtractor for CubeExtractor {
        fn extract(
            &self,
            input_image: &Path,
            masked_image: &Path,
            brain_mask: &Path,
            _log_file: &Path,
            _env: &ToolEnv,
        ) -> PreprocessResult<()> {
            write_volume(brain_mask, brain_cube());
            self.apply_mask(input_image, brain_mask, masked_image)
        }
    }

    #[derive(Debug)]
    pub struct FailingExtractor;

    impl BrainExtractor for FailingExtractor {
        fn extract(
            &self,
            _input_image: &Path,
            _masked_image: &Path,
            _brain_mask: &Path,
            _log_file: &Path,
            _env: &ToolEnv,
        ) -> PreprocessResult<()> {
            Err(PreprocessError::InvalidInput("no brain found".into()))
        }
    }
}
