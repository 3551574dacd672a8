use super::Normalizer;
use crate::{PreprocessError, PreprocessResult};
use ndarray::Array3;

/// Clips intensities to a fixed window and rescales it onto `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowingNormalizer {
    center: f64,
    width: f64,
}

impl WindowingNormalizer {
    pub fn new(center: f64, width: f64) -> PreprocessResult<Self> {
        if !center.is_finite() || !width.is_finite() || width <= 0.0 {
            return Err(PreprocessError::InvalidConfig(format!(
                "window needs a finite center and a positive width, got {center} and {width}"
            )));
        }
        Ok(Self { center, width })
    }
}

impl Normalizer for WindowingNormalizer {
    fn normalize(&self, image: &Array3<f32>) -> Array3<f32> {
        let low = self.center - self.width / 2.0;
        image.mapv(|v| ((v as f64 - low) / self.width).clamp(0.0, 1.0) as f32)
    }
}
