use super::Normalizer;
use crate::{PreprocessError, PreprocessResult};
use brainles_types::Percentile;
use ndarray::Array3;

/// Rescales intensities between two percentiles of the volume.
///
/// Values are mapped with `clip((x - lo) / (hi - lo), 0, 1)` and then stretched onto
/// `[lower_limit, upper_limit]`, where `lo`/`hi` are the percentiles computed over every
/// voxel with linear interpolation between order statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct PercentileNormalizer {
    lower_percentile: Percentile,
    upper_percentile: Percentile,
    lower_limit: f64,
    upper_limit: f64,
}

impl PercentileNormalizer {
    pub fn new(
        lower_percentile: Percentile,
        upper_percentile: Percentile,
        lower_limit: f64,
        upper_limit: f64,
    ) -> PreprocessResult<Self> {
        if lower_percentile > upper_percentile {
            return Err(PreprocessError::InvalidConfig(format!(
                "lower percentile {lower_percentile} exceeds upper percentile {upper_percentile}"
            )));
        }
        if !lower_limit.is_finite() || !upper_limit.is_finite() {
            return Err(PreprocessError::InvalidConfig(
                "normalization limits must be finite".into(),
            ));
        }

        Ok(Self {
            lower_percentile,
            upper_percentile,
            lower_limit,
            upper_limit,
        })
    }

    pub fn lower_percentile(&self) -> Percentile {
        self.lower_percentile
    }

    pub fn upper_percentile(&self) -> Percentile {
        self.upper_percentile
    }

    pub fn limits(&self) -> (f64, f64) {
        (self.lower_limit, self.upper_limit)
    }
}

impl Default for PercentileNormalizer {
    /// 0.1–99.9 percentile clipped onto `[0, 1]`.
    fn default() -> Self {
        Self {
            lower_percentile: Percentile::DEFAULT_LOWER,
            upper_percentile: Percentile::DEFAULT_UPPER,
            lower_limit: 0.0,
            upper_limit: 1.0,
        }
    }
}

impl Normalizer for PercentileNormalizer {
    fn normalize(&self, image: &Array3<f32>) -> Array3<f32> {
        let mut sorted: Vec<f64> = image
            .iter()
            .map(|&v| v as f64)
            .filter(|v| !v.is_nan())
            .collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let lower = percentile(&sorted, self.lower_percentile);
        let upper = percentile(&sorted, self.upper_percentile);
        let range = upper - lower;
        let span = self.upper_limit - self.lower_limit;

        image.mapv(|v| {
            let unit = if range > 0.0 {
                ((v as f64 - lower) / range).clamp(0.0, 1.0)
            } else {
                0.0
            };
            (unit * span + self.lower_limit) as f32
        })
    }
}

/// Percentile of sorted data with linear interpolation between closest ranks.
fn percentile(sorted: &[f64], p: Percentile) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = p.fraction() * (n - 1) as f64;
            let below = rank.floor() as usize;
            let above = (below + 1).min(n - 1);
            let weight = rank - below as f64;
            sorted[below] + (sorted[above] - sorted[below]) * weight
        }
    }
}
