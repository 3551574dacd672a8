//! Intensity normalization strategies.

mod percentile;
mod windowing;

pub use percentile::PercentileNormalizer;
pub use windowing::WindowingNormalizer;

use crate::image::NiftiVolume;
use crate::PreprocessResult;
use ndarray::Array3;
use std::fmt::Debug;
use std::path::Path;

/// Maps voxel intensities of a volume onto a normalized range.
pub trait Normalizer: Debug {
    fn normalize(&self, image: &Array3<f32>) -> Array3<f32>;

    /// Reads `input`, normalizes it and writes the result with the input's geometry.
    fn normalize_file(&self, input: &Path, output: &Path) -> PreprocessResult<()> {
        let volume = NiftiVolume::read(input)?;
        let normalized = self.normalize(&volume.data);
        NiftiVolume::with_header(&volume.header, normalized).write(output)
    }
}
