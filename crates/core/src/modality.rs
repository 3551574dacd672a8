//! Image channels of a subject.
//!
//! A [`Modality`] tracks where its image currently lives while the pipeline runs: it starts at
//! the input file and moves into the working folder after every stage that rewrites it.

use crate::constants::{NIFTI_GZ_EXTENSION, NORMALIZATION_DIR_NAME};
use crate::image::copy_image;
use crate::normalization::Normalizer;
use crate::PreprocessResult;
use brainles_types::NonEmptyText;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A named image channel (`t1`, `t2`, `flair`, ...) and the outputs requested for it.
#[derive(Clone, Debug)]
pub struct Modality {
    name: NonEmptyText,
    input_path: PathBuf,
    normalizer: Option<Arc<dyn Normalizer>>,
    normalized_skull_output_path: Option<PathBuf>,
    normalized_bet_output_path: Option<PathBuf>,
    normalized_defaced_output_path: Option<PathBuf>,
    current: PathBuf,
}

impl Modality {
    /// Creates a modality with no normalizer and no outputs.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` if `name` is empty or contains a path separator.
    pub fn new(name: &str, input_path: impl Into<PathBuf>) -> PreprocessResult<Self> {
        let input_path = input_path.into();
        Ok(Self {
            name: NonEmptyText::new(name)?,
            current: input_path.clone(),
            input_path,
            normalizer: None,
            normalized_skull_output_path: None,
            normalized_bet_output_path: None,
            normalized_defaced_output_path: None,
        })
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn with_normalized_skull_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.normalized_skull_output_path = Some(path.into());
        self
    }

    pub fn with_normalized_bet_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.normalized_bet_output_path = Some(path.into());
        self
    }

    pub fn with_normalized_defaced_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.normalized_defaced_output_path = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn normalizer(&self) -> Option<&dyn Normalizer> {
        self.normalizer.as_deref()
    }

    pub fn normalized_skull_output_path(&self) -> Option<&Path> {
        self.normalized_skull_output_path.as_deref()
    }

    pub fn normalized_bet_output_path(&self) -> Option<&Path> {
        self.normalized_bet_output_path.as_deref()
    }

    pub fn normalized_defaced_output_path(&self) -> Option<&Path> {
        self.normalized_defaced_output_path.as_deref()
    }

    /// Path of the most recent version of this image.
    pub fn current(&self) -> &Path {
        &self.current
    }

    pub(crate) fn set_current(&mut self, path: PathBuf) {
        self.current = path;
    }

    /// Normalizes the current image into `<work_dir>/normalization`, if a normalizer is set.
    pub(crate) fn normalize(&mut self, work_dir: &Path) -> PreprocessResult<()> {
        let Some(normalizer) = &self.normalizer else {
            return Ok(());
        };

        let output = work_dir
            .join(NORMALIZATION_DIR_NAME)
            .join(format!("{}__normalized.{NIFTI_GZ_EXTENSION}", self.name));
        tracing::debug!("normalizing {} into {}", self.name, output.display());
        normalizer.normalize_file(&self.current, &output)?;
        self.current = output;
        Ok(())
    }

    /// Copies the current image to `destination` when one was requested.
    pub(crate) fn save_current(&self, destination: Option<&Path>) -> PreprocessResult<()> {
        match destination {
            Some(path) => copy_image(&self.current, path),
            None => Ok(()),
        }
    }
}

/// The modality every other modality is registered onto.
///
/// Brain extraction and defacing run on this image; their masks are what gets propagated to
/// the moving modalities.
#[derive(Clone, Debug)]
pub struct CenterModality {
    modality: Modality,
    bet_mask_output_path: Option<PathBuf>,
    defacing_mask_output_path: Option<PathBuf>,
}

impl CenterModality {
    pub fn new(modality: Modality) -> Self {
        Self {
            modality,
            bet_mask_output_path: None,
            defacing_mask_output_path: None,
        }
    }

    pub fn with_bet_mask_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.bet_mask_output_path = Some(path.into());
        self
    }

    pub fn with_defacing_mask_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.defacing_mask_output_path = Some(path.into());
        self
    }

    pub fn bet_mask_output_path(&self) -> Option<&Path> {
        self.bet_mask_output_path.as_deref()
    }

    pub fn defacing_mask_output_path(&self) -> Option<&Path> {
        self.defacing_mask_output_path.as_deref()
    }

    pub fn modality(&self) -> &Modality {
        &self.modality
    }

    pub(crate) fn modality_mut(&mut self) -> &mut Modality {
        &mut self.modality
    }
}

impl std::ops::Deref for CenterModality {
    type Target = Modality;

    fn deref(&self) -> &Self::Target {
        &self.modality
    }
}
