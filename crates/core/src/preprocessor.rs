//! Per-subject preprocessing pipeline.
//!
//! Stages run strictly in sequence and the first failure aborts the subject:
//! normalization, co-registration onto the center modality (optionally followed by atlas
//! registration), brain extraction and defacing. Intermediate images are written to a working
//! folder; only the requested output paths are copied out.

use crate::brain_extraction::BrainExtractor;
use crate::command::ToolEnv;
use crate::constants::{
    ATLAS_REGISTRATION_DIR_NAME, BRAIN_EXTRACTION_DIR_NAME, COREGISTRATION_DIR_NAME,
    DEFACING_DIR_NAME, NIFTI_GZ_EXTENSION, NORMALIZATION_DIR_NAME,
};
use crate::defacing::Defacer;
use crate::image::copy_image;
use crate::modality::{CenterModality, Modality};
use crate::registration::Registrator;
use crate::{PreprocessError, PreprocessResult};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Working folder of a run: either a configured folder that is kept, or a temporary one that
/// is removed on drop.
enum WorkDir {
    Kept(PathBuf),
    Temporary(TempDir),
}

impl WorkDir {
    fn create(temp_folder: Option<&Path>) -> PreprocessResult<Self> {
        let work = match temp_folder {
            Some(folder) => Self::Kept(folder.to_path_buf()),
            None => Self::Temporary(
                tempfile::Builder::new()
                    .prefix("brainles_")
                    .tempdir()
                    .map_err(PreprocessError::TempDir)?,
            ),
        };

        for name in [
            NORMALIZATION_DIR_NAME,
            COREGISTRATION_DIR_NAME,
            ATLAS_REGISTRATION_DIR_NAME,
            BRAIN_EXTRACTION_DIR_NAME,
            DEFACING_DIR_NAME,
        ] {
            let dir = work.path().join(name);
            std::fs::create_dir_all(&dir)
                .map_err(|source| PreprocessError::DirCreation { path: dir, source })?;
        }
        Ok(work)
    }

    fn path(&self) -> &Path {
        match self {
            Self::Kept(path) => path,
            Self::Temporary(dir) => dir.path(),
        }
    }
}

fn nifti_name(stem: &str) -> String {
    format!("{stem}.{NIFTI_GZ_EXTENSION}")
}

/// Runs the pipeline for one subject with injected strategies.
#[derive(Debug)]
pub struct Preprocessor {
    center: CenterModality,
    moving: Vec<Modality>,
    registrator: Box<dyn Registrator>,
    brain_extractor: Box<dyn BrainExtractor>,
    defacer: Box<dyn Defacer>,
    atlas_image: Option<PathBuf>,
    temp_folder: Option<PathBuf>,
    tool_env: ToolEnv,
}

impl Preprocessor {
    pub fn new(
        center: CenterModality,
        moving: Vec<Modality>,
        registrator: Box<dyn Registrator>,
        brain_extractor: Box<dyn BrainExtractor>,
        defacer: Box<dyn Defacer>,
    ) -> Self {
        Self {
            center,
            moving,
            registrator,
            brain_extractor,
            defacer,
            atlas_image: None,
            temp_folder: None,
            tool_env: ToolEnv::default(),
        }
    }

    /// Registers the center modality to this atlas after co-registration.
    pub fn with_atlas_image(mut self, atlas_image: impl Into<PathBuf>) -> Self {
        self.atlas_image = Some(atlas_image.into());
        self
    }

    /// Keeps intermediate files in `folder` instead of a temporary directory.
    pub fn with_temp_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.temp_folder = Some(folder.into());
        self
    }

    pub fn with_tool_env(mut self, tool_env: ToolEnv) -> Self {
        self.tool_env = tool_env;
        self
    }

    pub fn center(&self) -> &CenterModality {
        &self.center
    }

    pub fn moving(&self) -> &[Modality] {
        &self.moving
    }

    /// Runs every stage for the subject.
    pub fn run(mut self) -> PreprocessResult<()> {
        let work = WorkDir::create(self.temp_folder.as_deref())?;
        let work_dir = work.path();
        tracing::debug!("working folder: {}", work_dir.display());

        self.normalize(work_dir)?;
        self.coregister(&work_dir.join(COREGISTRATION_DIR_NAME))?;
        if let Some(atlas) = self.atlas_image.clone() {
            self.register_to_atlas(&atlas, &work_dir.join(ATLAS_REGISTRATION_DIR_NAME))?;
        }

        self.center
            .save_current(self.center.normalized_skull_output_path())?;
        for modality in &self.moving {
            modality.save_current(modality.normalized_skull_output_path())?;
        }

        let skull_images: Vec<PathBuf> = std::iter::once(self.center.current())
            .chain(self.moving.iter().map(Modality::current))
            .map(Path::to_path_buf)
            .collect();

        let brain_mask = self.extract_brain(&work_dir.join(BRAIN_EXTRACTION_DIR_NAME))?;
        self.deface(
            &brain_mask,
            &skull_images,
            &work_dir.join(DEFACING_DIR_NAME),
        )?;

        Ok(())
    }

    fn normalize(&mut self, work_dir: &Path) -> PreprocessResult<()> {
        tracing::info!("normalizing {} modalities", self.moving.len() + 1);
        self.center.modality_mut().normalize(work_dir)?;
        for modality in &mut self.moving {
            modality.normalize(work_dir)?;
        }
        Ok(())
    }

    fn coregister(&mut self, dir: &Path) -> PreprocessResult<()> {
        let fixed = self.center.current().to_path_buf();

        for modality in &mut self.moving {
            let name = modality.name().to_string();
            tracing::info!("co-registering {} onto {}", name, self.center.name());

            let transformed = dir.join(nifti_name(&format!("co__{name}")));
            self.registrator.register(
                &fixed,
                modality.current(),
                &transformed,
                &dir.join(format!("M__{name}")),
                &dir.join(format!("co__{name}.log")),
            )?;
            modality.set_current(transformed);
        }
        Ok(())
    }

    fn register_to_atlas(&mut self, atlas: &Path, dir: &Path) -> PreprocessResult<()> {
        let center = self.center.name().to_string();
        tracing::info!("registering {} to atlas {}", center, atlas.display());

        let matrix = dir.join(format!("M__atlas__{center}"));
        let transformed = dir.join(nifti_name(&format!("atlas__{center}")));
        self.registrator.register(
            atlas,
            self.center.current(),
            &transformed,
            &matrix,
            &dir.join(format!("atlas__{center}.log")),
        )?;
        self.center.modality_mut().set_current(transformed);

        for modality in &mut self.moving {
            let name = modality.name().to_string();
            tracing::info!("transforming {} to atlas space", name);

            let transformed = dir.join(nifti_name(&format!("atlas__{name}")));
            self.registrator.transform(
                atlas,
                modality.current(),
                &transformed,
                &matrix,
                &dir.join(format!("atlas__{name}.log")),
            )?;
            modality.set_current(transformed);
        }
        Ok(())
    }

    /// Skull-strips the center and propagates its mask; returns the brain mask path.
    fn extract_brain(&mut self, dir: &Path) -> PreprocessResult<PathBuf> {
        let center = self.center.name().to_string();
        tracing::info!("extracting brain from {}", center);

        let masked = dir.join(nifti_name(&format!("{center}__bet")));
        let brain_mask = dir.join(nifti_name(&format!("{center}__brain_mask")));
        self.brain_extractor.extract(
            self.center.current(),
            &masked,
            &brain_mask,
            &dir.join(format!("{center}__bet.log")),
            &self.tool_env,
        )?;
        self.center.modality_mut().set_current(masked);

        if let Some(output) = self.center.bet_mask_output_path() {
            copy_image(&brain_mask, output)?;
        }
        self.center
            .save_current(self.center.normalized_bet_output_path())?;

        for modality in &mut self.moving {
            let masked = dir.join(nifti_name(&format!("{}__bet", modality.name())));
            self.brain_extractor
                .apply_mask(modality.current(), &brain_mask, &masked)?;
            modality.set_current(masked);
            modality.save_current(modality.normalized_bet_output_path())?;
        }

        Ok(brain_mask)
    }

    /// Defaces the skull-on images. `skull_images` holds the center first, then the moving
    /// modalities in order.
    fn deface(
        &mut self,
        brain_mask: &Path,
        skull_images: &[PathBuf],
        dir: &Path,
    ) -> PreprocessResult<()> {
        let center = self.center.name().to_string();
        tracing::info!("defacing {}", center);

        let defacing_mask = dir.join(nifti_name(&format!("{center}__defacing_mask")));
        self.defacer.deface(brain_mask, &defacing_mask)?;
        if let Some(output) = self.center.defacing_mask_output_path() {
            copy_image(&defacing_mask, output)?;
        }

        let modalities =
            std::iter::once(self.center.modality_mut()).chain(self.moving.iter_mut());
        for (modality, skull) in modalities.zip(skull_images) {
            let defaced = dir.join(nifti_name(&format!("{}__defaced", modality.name())));
            self.defacer.apply_mask(skull, &defacing_mask, &defaced)?;
            modality.set_current(defaced);
            modality.save_current(modality.normalized_defaced_output_path())?;
        }
        Ok(())
    }
}
