//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the batch driver.
//! The library never reads process-wide environment variables itself; binaries read them and
//! hand the raw values to the constructors here.

use crate::brain_extraction::HdBetMode;
use crate::constants::{
    ANTS_APPLY_TRANSFORMS, ANTS_REGISTRATION, DEFAULT_BATCH_REGISTRATION_BACKEND,
    DEFAULT_CUDA_VISIBLE_DEVICES, DEFAULT_DEFACING_BUFFER, FLAIR_FILENAME, HD_BET, REG_ALADIN,
    REG_RESAMPLE, T1C_FILENAME, T1_FILENAME, T2_FILENAME,
};
use crate::normalization::PercentileNormalizer;
use crate::registration::RegistrationBackend;
use crate::{PreprocessError, PreprocessResult};
use brainles_types::Percentile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Locations of the external binaries.
///
/// Defaults to bare names, which are looked up on `PATH` when spawned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolPaths {
    pub reg_aladin: PathBuf,
    pub reg_resample: PathBuf,
    pub ants_registration: PathBuf,
    pub ants_apply_transforms: PathBuf,
    pub hd_bet: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            reg_aladin: PathBuf::from(REG_ALADIN),
            reg_resample: PathBuf::from(REG_RESAMPLE),
            ants_registration: PathBuf::from(ANTS_REGISTRATION),
            ants_apply_transforms: PathBuf::from(ANTS_APPLY_TRANSFORMS),
            hd_bet: PathBuf::from(HD_BET),
        }
    }
}

impl ToolPaths {
    /// Resolve tool locations from optional raw values (typically environment variables).
    ///
    /// `niftyreg_dir` and `ants_dir` are directories holding the respective binaries;
    /// `hd_bet` is the path of the `hd-bet` executable. Empty or whitespace values are
    /// treated as absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a given directory does not exist.
    pub fn from_env_values(
        niftyreg_dir: Option<String>,
        ants_dir: Option<String>,
        hd_bet: Option<String>,
    ) -> PreprocessResult<Self> {
        fn non_empty(value: Option<String>) -> Option<PathBuf> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        }

        fn existing_dir(dir: PathBuf, what: &str) -> PreprocessResult<PathBuf> {
            if dir.is_dir() {
                Ok(dir)
            } else {
                Err(PreprocessError::InvalidConfig(format!(
                    "{what} directory does not exist: {}",
                    dir.display()
                )))
            }
        }

        let mut tools = Self::default();

        if let Some(dir) = non_empty(niftyreg_dir) {
            let dir = existing_dir(dir, "NiftyReg")?;
            tools.reg_aladin = dir.join(REG_ALADIN);
            tools.reg_resample = dir.join(REG_RESAMPLE);
        }

        if let Some(dir) = non_empty(ants_dir) {
            let dir = existing_dir(dir, "ANTs")?;
            tools.ants_registration = dir.join(ANTS_REGISTRATION);
            tools.ants_apply_transforms = dir.join(ANTS_APPLY_TRANSFORMS);
        }

        if let Some(hd_bet) = non_empty(hd_bet) {
            tools.hd_bet = hd_bet;
        }

        Ok(tools)
    }

    /// Every configured tool with its binary name, in a stable order.
    pub fn all(&self) -> [(&'static str, &Path); 5] {
        [
            (REG_ALADIN, self.reg_aladin.as_path()),
            (REG_RESAMPLE, self.reg_resample.as_path()),
            (ANTS_REGISTRATION, self.ants_registration.as_path()),
            (ANTS_APPLY_TRANSFORMS, self.ants_apply_transforms.as_path()),
            (HD_BET, self.hd_bet.as_path()),
        ]
    }
}

/// Fixed input file names expected inside each subject folder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputFiles {
    pub t1c: String,
    pub t1: String,
    pub t2: String,
    pub flair: String,
}

impl Default for InputFiles {
    fn default() -> Self {
        Self {
            t1c: T1C_FILENAME.into(),
            t1: T1_FILENAME.into(),
            t2: T2_FILENAME.into(),
            flair: FLAIR_FILENAME.into(),
        }
    }
}

/// Pipeline settings for a batch run, loadable from YAML.
///
/// Every field has a default so a config file only needs to name what it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Registration backend name (`niftyreg` or `ants`).
    pub registration_backend: String,
    pub lower_percentile: Percentile,
    pub upper_percentile: Percentile,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub hd_bet_mode: HdBetMode,
    pub hd_bet_tta: bool,
    /// HD-BET `-device` argument: a GPU index or `cpu`.
    pub hd_bet_device: String,
    /// Passed to GPU tools as `CUDA_VISIBLE_DEVICES`; `null` leaves the variable alone.
    pub limit_cuda_visible_devices: Option<String>,
    /// Quickshear buffer in voxels.
    pub defacing_buffer: f64,
    /// Optional atlas the center modality is registered to after co-registration.
    pub atlas_image: Option<PathBuf>,
    /// Keep intermediate files here instead of a temporary directory.
    pub temp_folder: Option<PathBuf>,
    pub input_files: InputFiles,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            registration_backend: DEFAULT_BATCH_REGISTRATION_BACKEND.into(),
            lower_percentile: Percentile::DEFAULT_LOWER,
            upper_percentile: Percentile::DEFAULT_UPPER,
            lower_limit: 0.0,
            upper_limit: 1.0,
            hd_bet_mode: HdBetMode::Accurate,
            hd_bet_tta: true,
            hd_bet_device: "0".into(),
            limit_cuda_visible_devices: Some(DEFAULT_CUDA_VISIBLE_DEVICES.into()),
            defacing_buffer: DEFAULT_DEFACING_BUFFER,
            atlas_image: None,
            temp_folder: None,
            input_files: InputFiles::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a YAML configuration file.
    pub fn load(path: &Path) -> PreprocessResult<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| PreprocessError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
        let config: Self =
            serde_yaml::from_str(&contents).map_err(|source| PreprocessError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot enforce on its own.
    pub fn validate(&self) -> PreprocessResult<()> {
        self.backend()?;
        self.normalizer()?;

        if !self.defacing_buffer.is_finite() || self.defacing_buffer < 0.0 {
            return Err(PreprocessError::InvalidConfig(format!(
                "defacing_buffer must be a non-negative number, got {}",
                self.defacing_buffer
            )));
        }

        if self.hd_bet_device.trim().is_empty() {
            return Err(PreprocessError::InvalidConfig(
                "hd_bet_device cannot be empty".into(),
            ));
        }

        let files = &self.input_files;
        for name in [&files.t1c, &files.t1, &files.t2, &files.flair] {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                return Err(PreprocessError::InvalidConfig(format!(
                    "input file name must be a plain file name, got {name:?}"
                )));
            }
        }

        if let Some(atlas) = &self.atlas_image {
            if !atlas.is_file() {
                return Err(PreprocessError::InvalidConfig(format!(
                    "atlas image does not exist: {}",
                    atlas.display()
                )));
            }
        }

        Ok(())
    }

    pub fn backend(&self) -> PreprocessResult<RegistrationBackend> {
        self.registration_backend.parse()
    }

    pub fn normalizer(&self) -> PreprocessResult<PercentileNormalizer> {
        PercentileNormalizer::new(
            self.lower_percentile,
            self.upper_percentile,
            self.lower_limit,
            self.upper_limit,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_reference_batch_script() {
        let config = PipelineConfig::default();
        assert_eq!(config.registration_backend, "ants");
        assert_eq!(config.backend().unwrap(), RegistrationBackend::Ants);
        assert_eq!(config.limit_cuda_visible_devices.as_deref(), Some("0"));
        assert_eq!(config.lower_percentile.value(), 0.1);
        assert_eq!(config.upper_percentile.value(), 99.9);
        assert_eq!((config.lower_limit, config.upper_limit), (0.0, 1.0));
        assert_eq!(config.input_files.t1c, "T1C.nii.gz");
        assert_eq!(config.input_files.flair, "FLAIR.nii.gz");
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn null_gpu_selection_leaves_devices_unset() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(&path, "limit_cuda_visible_devices: null\n").unwrap();

        let config = PipelineConfig::load(&path).expect("valid config");
        assert_eq!(config.limit_cuda_visible_devices, None);
        assert_eq!(config.registration_backend, "ants");
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("pipeline.yaml");
        let yaml = "registration_backend: niftyreg\n\
                    limit_cuda_visible_devices: \"1\"\n\
                    hd_bet_mode: fast\n";
        std::fs::write(&path, yaml).unwrap();

        let config = PipelineConfig::load(&path).expect("valid config");
        assert_eq!(config.backend().unwrap(), RegistrationBackend::NiftyReg);
        assert_eq!(config.limit_cuda_visible_devices.as_deref(), Some("1"));
        assert_eq!(config.hd_bet_mode, HdBetMode::Fast);
        assert_eq!(config.defacing_buffer, 10.0);
    }

    #[test]
    fn unknown_backend_is_not_implemented() {
        let config = PipelineConfig {
            registration_backend: "elastix".into(),
            ..PipelineConfig::default()
        };
        let err = config.validate().expect_err("unknown backend");
        assert!(matches!(
            err,
            PreprocessError::BackendNotImplemented(ref b) if b == "elastix"
        ));
    }

    #[test]
    fn unknown_fields_and_bad_percentiles_fail_to_parse() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("pipeline.yaml");

        std::fs::write(&path, "registration_backed: ants\n").unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(PreprocessError::ConfigParse { .. })
        ));

        std::fs::write(&path, "upper_percentile: 120\n").unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(PreprocessError::ConfigParse { .. })
        ));
    }

    #[test]
    fn validate_rejects_nested_input_names() {
        let mut config = PipelineConfig::default();
        config.input_files.t2 = "anat/T2.nii.gz".into();
        assert!(matches!(
            config.validate(),
            Err(PreprocessError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_config_file_is_a_read_error() {
        let err = PipelineConfig::load(Path::new("/nonexistent/brainles.yaml"))
            .expect_err("missing file");
        assert!(matches!(err, PreprocessError::ConfigRead { .. }));
    }

    #[test]
    fn tool_paths_from_env_values() {
        let dir = TempDir::new().expect("tempdir");
        let niftyreg = dir.path().to_string_lossy().into_owned();

        let tools = ToolPaths::from_env_values(
            Some(niftyreg),
            Some("  ".into()),
            Some("/opt/hd-bet".into()),
        )
        .expect("valid values");
        assert_eq!(tools.reg_aladin, dir.path().join("reg_aladin"));
        assert_eq!(tools.reg_resample, dir.path().join("reg_resample"));
        assert_eq!(tools.ants_registration, PathBuf::from("antsRegistration"));
        assert_eq!(tools.hd_bet, PathBuf::from("/opt/hd-bet"));

        let err = ToolPaths::from_env_values(None, Some("/nonexistent/ants".into()), None)
            .expect_err("missing directory");
        assert!(matches!(err, PreprocessError::InvalidConfig(_)));
    }
}
