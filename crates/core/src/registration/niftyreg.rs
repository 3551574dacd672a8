use super::{matrix_with_extension, Registrator};
use crate::command::{ensure_output, ToolCommand};
use crate::constants::{REG_ALADIN, REG_RESAMPLE};
use crate::PreprocessResult;
use std::path::{Path, PathBuf};

/// Rigid registration with NiftyReg (`reg_aladin` / `reg_resample`).
///
/// Matrices are plain-text affine files; `.txt` is appended when the given matrix path has no
/// extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NiftyRegRegistrator {
    reg_aladin: PathBuf,
    reg_resample: PathBuf,
}

impl NiftyRegRegistrator {
    pub fn new(reg_aladin: PathBuf, reg_resample: PathBuf) -> Self {
        Self {
            reg_aladin,
            reg_resample,
        }
    }

    fn registration_command(
        &self,
        fixed_image: &Path,
        moving_image: &Path,
        transformed_image: &Path,
        matrix: &Path,
    ) -> ToolCommand {
        ToolCommand::new(&self.reg_aladin)
            .arg("-ref")
            .arg(fixed_image)
            .arg("-flo")
            .arg(moving_image)
            .arg("-res")
            .arg(transformed_image)
            .arg("-aff")
            .arg(matrix)
            .arg("-rigOnly")
    }

    fn transformation_command(
        &self,
        fixed_image: &Path,
        moving_image: &Path,
        transformed_image: &Path,
        matrix: &Path,
    ) -> ToolCommand {
        ToolCommand::new(&self.reg_resample)
            .arg("-ref")
            .arg(fixed_image)
            .arg("-flo")
            .arg(moving_image)
            .arg("-trans")
            .arg(matrix)
            .arg("-res")
            .arg(transformed_image)
    }
}

impl Default for NiftyRegRegistrator {
    fn default() -> Self {
        Self::new(PathBuf::from(REG_ALADIN), PathBuf::from(REG_RESAMPLE))
    }
}

impl Registrator for NiftyRegRegistrator {
    fn register(
        &self,
        fixed_image: &Path,
        moving_image: &Path,
        transformed_image: &Path,
        matrix: &Path,
        log_file: &Path,
    ) -> PreprocessResult<()> {
        let matrix = matrix_with_extension(matrix, "txt");
        self.registration_command(fixed_image, moving_image, transformed_image, &matrix)
            .run_logged(log_file)?;
        ensure_output(REG_ALADIN, transformed_image)?;
        ensure_output(REG_ALADIN, &matrix)
    }

    fn transform(
        &self,
        fixed_image: &Path,
        moving_image: &Path,
        transformed_image: &Path,
        matrix: &Path,
        log_file: &Path,
    ) -> PreprocessResult<()> {
        let matrix = matrix_with_extension(matrix, "txt");
        self.transformation_command(fixed_image, moving_image, transformed_image, &matrix)
            .run_logged(log_file)?;
        ensure_output(REG_RESAMPLE, transformed_image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PreprocessError;
    use tempfile::TempDir;

    #[test]
    fn registration_is_rigid_reg_aladin() {
        let cmd = NiftyRegRegistrator::default().registration_command(
            Path::new("f.nii.gz"),
            Path::new("m.nii.gz"),
            Path::new("t.nii.gz"),
            Path::new("M.txt"),
        );
        assert_eq!(cmd.program(), Path::new("reg_aladin"));
        assert_eq!(
            cmd.arg_strings(),
            [
                "-ref", "f.nii.gz", "-flo", "m.nii.gz", "-res", "t.nii.gz", "-aff", "M.txt",
                "-rigOnly"
            ]
        );
    }

    #[test]
    fn transformation_resamples_with_matrix() {
        let registrator = NiftyRegRegistrator::new(
            PathBuf::from("/opt/niftyreg/reg_aladin"),
            PathBuf::from("/opt/niftyreg/reg_resample"),
        );
        let cmd = registrator.transformation_command(
            Path::new("f.nii.gz"),
            Path::new("m.nii.gz"),
            Path::new("t.nii.gz"),
            Path::new("M.txt"),
        );
        assert_eq!(cmd.program(), Path::new("/opt/niftyreg/reg_resample"));
        assert_eq!(
            cmd.arg_strings(),
            ["-ref", "f.nii.gz", "-flo", "m.nii.gz", "-trans", "M.txt", "-res", "t.nii.gz"]
        );
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let dir = TempDir::new().expect("tempdir");
        let registrator = NiftyRegRegistrator::new(
            dir.path().join("no-reg_aladin"),
            dir.path().join("no-reg_resample"),
        );

        let err = registrator
            .register(
                Path::new("f.nii.gz"),
                Path::new("m.nii.gz"),
                &dir.path().join("t.nii.gz"),
                &dir.path().join("M"),
                &dir.path().join("reg.log"),
            )
            .expect_err("binary does not exist");
        assert!(matches!(err, PreprocessError::ToolSpawn { .. }));
        assert!(dir.path().join("reg.log").exists());
    }

    #[cfg(unix)]
    #[test]
    fn clean_exit_without_output_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let registrator =
            NiftyRegRegistrator::new(PathBuf::from("true"), PathBuf::from("true"));

        let err = registrator
            .transform(
                Path::new("f.nii.gz"),
                Path::new("m.nii.gz"),
                &dir.path().join("t.nii.gz"),
                &dir.path().join("M"),
                &dir.path().join("reg.log"),
            )
            .expect_err("nothing was written");
        let PreprocessError::MissingToolOutput { tool, .. } = err else {
            panic!("expected a missing output, got {err:?}");
        };
        assert_eq!(tool, "reg_resample");
    }
}
