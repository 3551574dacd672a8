use super::{matrix_with_extension, Registrator};
use crate::command::{ensure_output, ToolCommand};
use crate::constants::{ANTS_APPLY_TRANSFORMS, ANTS_REGISTRATION};
use crate::{PreprocessError, PreprocessResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// File name suffix `antsRegistration` gives the affine of a single rigid stage.
const GENERIC_AFFINE_SUFFIX: &str = "0GenericAffine.mat";

/// Rigid registration with ANTs, mutual information metric.
///
/// `antsRegistration` names its matrix after the output prefix; it is renamed to the requested
/// matrix path (with `.mat` appended when missing) once the tool finishes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AntsRegistrator {
    ants_registration: PathBuf,
    ants_apply_transforms: PathBuf,
}

impl AntsRegistrator {
    pub fn new(ants_registration: PathBuf, ants_apply_transforms: PathBuf) -> Self {
        Self {
            ants_registration,
            ants_apply_transforms,
        }
    }

    fn registration_command(
        &self,
        fixed_image: &Path,
        moving_image: &Path,
        transformed_image: &Path,
        prefix: &Path,
    ) -> ToolCommand {
        let fixed = fixed_image.display();
        let moving = moving_image.display();

        ToolCommand::new(&self.ants_registration)
            .args(["-d", "3"])
            .arg("-o")
            .arg(format!("[{},{}]", prefix.display(), transformed_image.display()))
            .arg("-r")
            .arg(format!("[{fixed},{moving},1]"))
            .arg("-m")
            .arg(format!("MI[{fixed},{moving},1,32,Regular,0.25]"))
            .args(["-t", "Rigid[0.1]"])
            .args(["-c", "[1000x500x250x0,1e-6,10]"])
            .args(["-f", "6x4x2x1"])
            .args(["-s", "3x2x1x0vox"])
    }

    fn transformation_command(
        &self,
        fixed_image: &Path,
        moving_image: &Path,
        transformed_image: &Path,
        matrix: &Path,
    ) -> ToolCommand {
        ToolCommand::new(&self.ants_apply_transforms)
            .args(["-d", "3"])
            .arg("-i")
            .arg(moving_image)
            .arg("-r")
            .arg(fixed_image)
            .arg("-o")
            .arg(transformed_image)
            .arg("-t")
            .arg(matrix)
    }
}

impl Default for AntsRegistrator {
    fn default() -> Self {
        Self::new(
            PathBuf::from(ANTS_REGISTRATION),
            PathBuf::from(ANTS_APPLY_TRANSFORMS),
        )
    }
}

/// Output prefix for a matrix path: the path without its extension plus `_`.
fn output_prefix(matrix: &Path) -> PathBuf {
    let mut prefix = OsString::from(matrix.with_extension("").as_os_str());
    prefix.push("_");
    PathBuf::from(prefix)
}

fn generated_matrix(prefix: &Path) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(GENERIC_AFFINE_SUFFIX);
    PathBuf::from(name)
}

impl Registrator for AntsRegistrator {
    fn register(
        &self,
        fixed_image: &Path,
        moving_image: &Path,
        transformed_image: &Path,
        matrix: &Path,
        log_file: &Path,
    ) -> PreprocessResult<()> {
        let matrix = matrix_with_extension(matrix, "mat");
        let prefix = output_prefix(&matrix);

        self.registration_command(fixed_image, moving_image, transformed_image, &prefix)
            .run_logged(log_file)?;
        ensure_output(ANTS_REGISTRATION, transformed_image)?;

        let generated = generated_matrix(&prefix);
        ensure_output(ANTS_REGISTRATION, &generated)?;
        std::fs::rename(&generated, &matrix).map_err(|source| PreprocessError::FileMove {
            from: generated.clone(),
            to: matrix.clone(),
            source,
        })
    }

    fn transform(
        &self,
        fixed_image: &Path,
        moving_image: &Path,
        transformed_image: &Path,
        matrix: &Path,
        log_file: &Path,
    ) -> PreprocessResult<()> {
        let matrix = matrix_with_extension(matrix, "mat");
        self.transformation_command(fixed_image, moving_image, transformed_image, &matrix)
            .run_logged(log_file)?;
        ensure_output(ANTS_APPLY_TRANSFORMS, transformed_image)
    }
}
