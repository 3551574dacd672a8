use super::BrainExtractor;
use crate::command::{ensure_output, ToolCommand, ToolEnv};
use crate::constants::{HD_BET, NIFTI_GZ_EXTENSION};
use crate::image::create_parent;
use crate::{PreprocessError, PreprocessResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// HD-BET inference mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HdBetMode {
    /// Ensemble of five models.
    #[default]
    Accurate,
    /// Single model.
    Fast,
}

impl HdBetMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accurate => "accurate",
            Self::Fast => "fast",
        }
    }
}

impl std::str::FromStr for HdBetMode {
    type Err = PreprocessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accurate" => Ok(Self::Accurate),
            "fast" => Ok(Self::Fast),
            other => Err(PreprocessError::InvalidConfig(format!(
                "unknown HD-BET mode: {other}"
            ))),
        }
    }
}

/// Brain extraction with the HD-BET command line tool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HdBetExtractor {
    hd_bet: PathBuf,
    mode: HdBetMode,
    tta: bool,
    device: String,
}

impl Default for HdBetExtractor {
    fn default() -> Self {
        Self {
            hd_bet: PathBuf::from(HD_BET),
            mode: HdBetMode::Accurate,
            tta: true,
            device: "0".into(),
        }
    }
}

impl HdBetExtractor {
    pub fn new(hd_bet: PathBuf, mode: HdBetMode, tta: bool, device: impl Into<String>) -> Self {
        Self {
            hd_bet,
            mode,
            tta,
            device: device.into(),
        }
    }

    fn command(&self, input_image: &Path, masked_image: &Path, env: &ToolEnv) -> ToolCommand {
        ToolCommand::new(&self.hd_bet)
            .arg("-i")
            .arg(input_image)
            .arg("-o")
            .arg(masked_image)
            .args(["-device", self.device.as_str()])
            .args(["-mode", self.mode.as_str()])
            .args(["-tta", if self.tta { "1" } else { "0" }])
            .args(["-s", "1"])
            .tool_env(env)
    }
}

/// Where HD-BET writes the mask for a given masked image: `<stem>_mask.nii.gz`.
fn mask_written_by_hd_bet(masked_image: &Path) -> PathBuf {
    let name = masked_image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(&format!(".{NIFTI_GZ_EXTENSION}"))
        .or_else(|| name.strip_suffix(".nii"))
        .unwrap_or(&name);
    masked_image.with_file_name(format!("{stem}_mask.{NIFTI_GZ_EXTENSION}"))
}

impl BrainExtractor for HdBetExtractor {
    fn extract(
        &self,
        input_image: &Path,
        masked_image: &Path,
        brain_mask: &Path,
        log_file: &Path,
        env: &ToolEnv,
    ) -> PreprocessResult<()> {
        self.command(input_image, masked_image, env)
            .run_logged(log_file)?;
        ensure_output(HD_BET, masked_image)?;

        let written = mask_written_by_hd_bet(masked_image);
        ensure_output(HD_BET, &written)?;
        if written != brain_mask {
            create_parent(brain_mask)?;
            std::fs::rename(&written, brain_mask).map_err(|source| PreprocessError::FileMove {
                from: written.clone(),
                to: brain_mask.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }
}
