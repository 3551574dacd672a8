//! Subject batch driver.
//!
//! Every immediate subdirectory of the data folder is one subject holding the four input
//! modalities. Subjects run one after the other in name order; the first failure aborts the
//! whole batch.

use crate::brain_extraction::HdBetExtractor;
use crate::command::ToolEnv;
use crate::config::{InputFiles, PipelineConfig, ToolPaths};
use crate::constants::NIFTI_GZ_EXTENSION;
use crate::defacing::QuickshearDefacer;
use crate::modality::{CenterModality, Modality};
use crate::normalization::Normalizer;
use crate::preprocessor::Preprocessor;
use crate::{PreprocessError, PreprocessResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Input and output locations of one subject.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectLayout {
    name: String,
    t1c: PathBuf,
    t1: PathBuf,
    t2: PathBuf,
    flair: PathBuf,
    output_folder: PathBuf,
}

impl SubjectLayout {
    pub fn new(
        subject_dir: &Path,
        output_folder: &Path,
        files: &InputFiles,
    ) -> PreprocessResult<Self> {
        let name = subject_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                PreprocessError::InvalidInput(format!(
                    "subject folder has no name: {}",
                    subject_dir.display()
                ))
            })?;

        Ok(Self {
            name,
            t1c: subject_dir.join(&files.t1c),
            t1: subject_dir.join(&files.t1),
            t2: subject_dir.join(&files.t2),
            flair: subject_dir.join(&files.flair),
            output_folder: output_folder.to_path_buf(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> [&Path; 4] {
        [&self.t1c, &self.t1, &self.t2, &self.flair]
    }

    /// `<output_folder>/<subject>_<suffix>.nii.gz`
    pub fn output(&self, suffix: &str) -> PathBuf {
        self.output_folder
            .join(format!("{}_{suffix}.{NIFTI_GZ_EXTENSION}", self.name))
    }

    /// Fails with `MissingInputFile` for the first input that does not exist.
    pub fn check_inputs(&self) -> PreprocessResult<()> {
        match self.inputs().into_iter().find(|path| !path.is_file()) {
            Some(missing) => Err(PreprocessError::MissingInputFile(missing.to_path_buf())),
            None => Ok(()),
        }
    }

    /// The t1c center modality with its outputs.
    pub fn center_modality(
        &self,
        normalizer: Arc<dyn Normalizer>,
    ) -> PreprocessResult<CenterModality> {
        let modality = Modality::new("t1c", &self.t1c)?
            .with_normalizer(normalizer)
            .with_normalized_skull_output(self.output("t1c_normalized_skull"))
            .with_normalized_bet_output(self.output("t1c_normalized_bet"))
            .with_normalized_defaced_output(self.output("t1c_normalized_defaced"));

        Ok(CenterModality::new(modality)
            .with_bet_mask_output(self.output("t1c_bet_mask"))
            .with_defacing_mask_output(self.output("t1c_defacing_mask")))
    }

    /// The t1, t2 and flair moving modalities; only their brain-extracted images are kept.
    pub fn moving_modalities(
        &self,
        normalizer: Arc<dyn Normalizer>,
    ) -> PreprocessResult<Vec<Modality>> {
        [
            ("t1", &self.t1, "t1"),
            ("t2", &self.t2, "t2"),
            ("flair", &self.flair, "fla"),
        ]
        .into_iter()
        .map(|(name, input, prefix)| {
            let bet_output = self.output(&format!("{prefix}_normalized_bet"));
            Ok(Modality::new(name, input)?
                .with_normalizer(normalizer.clone())
                .with_normalized_bet_output(bet_output))
        })
        .collect()
    }
}

/// Immediate subdirectories of `data_folder`, sorted by name.
fn subject_dirs(data_folder: &Path) -> PreprocessResult<Vec<PathBuf>> {
    let read_err = |source| PreprocessError::ReadDir {
        path: data_folder.to_path_buf(),
        source,
    };

    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(data_folder).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Preprocesses every subject in `data_folder`, writing flat outputs into `output_folder`.
///
/// Each subject gets a percentile normalizer, the configured registration backend, HD-BET and
/// Quickshear.
pub fn process_all_subjects_in_folder(
    data_folder: &Path,
    output_folder: &Path,
    config: &PipelineConfig,
    tools: &ToolPaths,
) -> PreprocessResult<()> {
    config.validate()?;
    let backend = config.backend()?;
    let normalizer: Arc<dyn Normalizer> = Arc::new(config.normalizer()?);
    let tool_env = ToolEnv {
        cuda_visible_devices: config.limit_cuda_visible_devices.clone(),
    };

    process_all_subjects_in_folder_with(data_folder, output_folder, &config.input_files, |layout| {
        let mut preprocessor = Preprocessor::new(
            layout.center_modality(normalizer.clone())?,
            layout.moving_modalities(normalizer.clone())?,
            backend.registrator(tools),
            Box::new(HdBetExtractor::new(
                tools.hd_bet.clone(),
                config.hd_bet_mode,
                config.hd_bet_tta,
                config.hd_bet_device.clone(),
            )),
            Box::new(QuickshearDefacer::new(config.defacing_buffer)),
        )
        .with_tool_env(tool_env.clone());

        if let Some(atlas) = &config.atlas_image {
            preprocessor = preprocessor.with_atlas_image(atlas);
        }
        if let Some(temp) = &config.temp_folder {
            preprocessor = preprocessor.with_temp_folder(temp.join(layout.name()));
        }
        Ok(preprocessor)
    })
}

/// [`process_all_subjects_in_folder`] with a caller-supplied preprocessor per subject.
pub fn process_all_subjects_in_folder_with<F>(
    data_folder: &Path,
    output_folder: &Path,
    input_files: &InputFiles,
    mut preprocessor_for: F,
) -> PreprocessResult<()>
where
    F: FnMut(&SubjectLayout) -> PreprocessResult<Preprocessor>,
{
    let subjects = subject_dirs(data_folder)?;
    std::fs::create_dir_all(output_folder).map_err(|source| PreprocessError::DirCreation {
        path: output_folder.to_path_buf(),
        source,
    })?;

    for subject_dir in &subjects {
        let layout = SubjectLayout::new(subject_dir, output_folder, input_files)?;
        tracing::info!("Processing subject: {}", layout.name());

        layout.check_inputs()?;
        preprocessor_for(&layout)?.run()?;

        tracing::info!("Finished processing subject: {}", layout.name());
    }

    tracing::info!("processed {} subjects", subjects.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain_extraction::test_support::{CubeExtractor, FailingExtractor, SHAPE};
    use crate::brain_extraction::BrainExtractor;
    use crate::image::test_support::write_volume;
    use crate::normalization::PercentileNormalizer;
    use crate::registration::test_support::RecordingRegistrator;
    use ndarray::Array3;
    use tempfile::TempDir;

    fn write_subject(data: &Path, name: &str, files: &[&str]) {
        let dir = data.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        for file in files {
            let image = Array3::from_shape_fn(SHAPE, |(x, y, z)| (x + y + z) as f32);
            write_volume(&dir.join(file), image);
        }
    }

    const ALL_INPUTS: [&str; 4] = ["T1C.nii.gz", "T1.nii.gz", "T2.nii.gz", "FLAIR.nii.gz"];

    fn preprocessor(
        layout: &SubjectLayout,
        extractor: Box<dyn BrainExtractor>,
    ) -> PreprocessResult<Preprocessor> {
        let normalizer: Arc<dyn Normalizer> = Arc::new(PercentileNormalizer::default());
        Ok(Preprocessor::new(
            layout.center_modality(normalizer.clone())?,
            layout.moving_modalities(normalizer)?,
            Box::new(RecordingRegistrator::copying()),
            extractor,
            Box::new(QuickshearDefacer::new(2.0)),
        ))
    }

    #[test]
    fn layout_derives_flat_output_names() {
        let layout = SubjectLayout::new(
            Path::new("/data/sub-01"),
            Path::new("/out"),
            &InputFiles::default(),
        )
        .unwrap();

        assert_eq!(layout.name(), "sub-01");
        assert_eq!(layout.inputs()[0], Path::new("/data/sub-01/T1C.nii.gz"));
        assert_eq!(layout.inputs()[3], Path::new("/data/sub-01/FLAIR.nii.gz"));

        let normalizer: Arc<dyn Normalizer> = Arc::new(PercentileNormalizer::default());
        let center = layout.center_modality(normalizer.clone()).unwrap();
        assert_eq!(center.name(), "t1c");
        assert_eq!(
            center.normalized_skull_output_path(),
            Some(Path::new("/out/sub-01_t1c_normalized_skull.nii.gz"))
        );
        assert_eq!(
            center.defacing_mask_output_path(),
            Some(Path::new("/out/sub-01_t1c_defacing_mask.nii.gz"))
        );

        let moving = layout.moving_modalities(normalizer).unwrap();
        let names: Vec<_> = moving.iter().map(Modality::name).collect();
        assert_eq!(names, ["t1", "t2", "flair"]);
        assert_eq!(
            moving[2].normalized_bet_output_path(),
            Some(Path::new("/out/sub-01_fla_normalized_bet.nii.gz"))
        );
        assert!(moving
            .iter()
            .all(|m| m.normalized_skull_output_path().is_none()));
    }

    #[test]
    fn subjects_run_in_name_order_and_write_outputs() {
        let dir = TempDir::new().expect("tempdir");
        let data = dir.path().join("data");
        write_subject(&data, "sub-b", &ALL_INPUTS);
        write_subject(&data, "sub-a", &ALL_INPUTS);
        std::fs::write(data.join("README.txt"), "not a subject").unwrap();
        let out = dir.path().join("results").join("flat");

        let mut seen = Vec::new();
        process_all_subjects_in_folder_with(&data, &out, &InputFiles::default(), |layout| {
            seen.push(layout.name().to_string());
            preprocessor(layout, Box::new(CubeExtractor))
        })
        .expect("batch succeeds");

        assert_eq!(seen, ["sub-a", "sub-b"]);
        for subject in ["sub-a", "sub-b"] {
            for suffix in [
                "t1c_normalized_skull",
                "t1c_normalized_bet",
                "t1c_normalized_defaced",
                "t1c_bet_mask",
                "t1c_defacing_mask",
                "t1_normalized_bet",
                "t2_normalized_bet",
                "fla_normalized_bet",
            ] {
                let path = out.join(format!("{subject}_{suffix}.nii.gz"));
                assert!(path.exists(), "missing {}", path.display());
            }
        }
    }

    #[test]
    fn missing_input_is_reported_before_the_pipeline() {
        let dir = TempDir::new().expect("tempdir");
        write_subject(dir.path(), "sub-01", &["T1C.nii.gz", "T1.nii.gz", "FLAIR.nii.gz"]);

        let mut built = 0;
        let err = process_all_subjects_in_folder_with(
            dir.path(),
            &dir.path().join("out"),
            &InputFiles::default(),
            |layout| {
                built += 1;
                preprocessor(layout, Box::new(CubeExtractor))
            },
        )
        .expect_err("T2 is missing");

        assert_eq!(built, 0);
        let PreprocessError::MissingInputFile(missing) = err else {
            panic!("expected a missing input, got {err:?}");
        };
        assert!(missing.ends_with("sub-01/T2.nii.gz"));
    }

    #[test]
    fn first_failing_subject_aborts_the_batch() {
        let dir = TempDir::new().expect("tempdir");
        let data = dir.path().join("data");
        write_subject(&data, "sub-01", &ALL_INPUTS);
        write_subject(&data, "sub-02", &ALL_INPUTS);

        let mut seen = Vec::new();
        let err = process_all_subjects_in_folder_with(
            &data,
            &dir.path().join("out"),
            &InputFiles::default(),
            |layout| {
                seen.push(layout.name().to_string());
                preprocessor(layout, Box::new(FailingExtractor))
            },
        )
        .expect_err("extraction fails");

        assert!(matches!(err, PreprocessError::InvalidInput(_)));
        assert_eq!(seen, ["sub-01"]);
    }

    #[test]
    fn unknown_backend_fails_before_any_subject() {
        let dir = TempDir::new().expect("tempdir");
        let config = PipelineConfig {
            registration_backend: "elastix".into(),
            ..PipelineConfig::default()
        };

        let err = process_all_subjects_in_folder(
            dir.path(),
            &dir.path().join("out"),
            &config,
            &ToolPaths::default(),
        )
        .expect_err("backend is not implemented");
        assert!(matches!(
            err,
            PreprocessError::BackendNotImplemented(ref b) if b == "elastix"
        ));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn missing_data_folder_is_a_read_error() {
        let dir = TempDir::new().expect("tempdir");
        let err = process_all_subjects_in_folder(
            &dir.path().join("nope"),
            &dir.path().join("out"),
            &PipelineConfig::default(),
            &ToolPaths::default(),
        )
        .expect_err("no data folder");
        assert!(matches!(err, PreprocessError::ReadDir { .. }));
    }
}
