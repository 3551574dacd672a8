//! Registration strategies and the backend dispatch shim.
//!
//! A [`Registrator`] aligns a moving image onto a fixed image (`register`) or applies a
//! previously computed transform to another image (`transform`). The actual mathematics lives
//! in the external tools; implementations only build and run their command lines.

mod ants;
mod niftyreg;

pub use ants::AntsRegistrator;
pub use niftyreg::NiftyRegRegistrator;

use crate::config::ToolPaths;
use crate::{PreprocessError, PreprocessResult};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Registration interface implemented by every backend.
///
/// Both operations take the same five paths: the fixed (reference) image, the moving image,
/// the output image, the transformation matrix (written by `register`, read by `transform`)
/// and a log file the tool output is appended to.
///
/// The provided implementations always fail; a backend overrides the operations it supports.
pub trait Registrator: Debug {
    fn register(
        &self,
        _fixed_image: &Path,
        _moving_image: &Path,
        _transformed_image: &Path,
        _matrix: &Path,
        _log_file: &Path,
    ) -> PreprocessResult<()> {
        Err(PreprocessError::OperationNotImplemented("register"))
    }

    fn transform(
        &self,
        _fixed_image: &Path,
        _moving_image: &Path,
        _transformed_image: &Path,
        _matrix: &Path,
        _log_file: &Path,
    ) -> PreprocessResult<()> {
        Err(PreprocessError::OperationNotImplemented("transform"))
    }
}

/// What the dispatch shim should do with its paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationMode {
    Registration,
    Transformation,
}

impl RegistrationMode {
    /// Parse a mode name; unknown names yield `None` rather than an error.
    pub fn parse(mode: &str) -> Option<Self> {
        match mode {
            "registration" => Some(Self::Registration),
            "transformation" => Some(Self::Transformation),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Transformation => "transformation",
        }
    }
}

/// Named registration backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationBackend {
    NiftyReg,
    Ants,
}

impl RegistrationBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NiftyReg => "niftyreg",
            Self::Ants => "ants",
        }
    }

    /// Build the registrator for this backend using the configured tool locations.
    pub fn registrator(self, tools: &ToolPaths) -> Box<dyn Registrator> {
        match self {
            Self::NiftyReg => Box::new(NiftyRegRegistrator::new(
                tools.reg_aladin.clone(),
                tools.reg_resample.clone(),
            )),
            Self::Ants => Box::new(AntsRegistrator::new(
                tools.ants_registration.clone(),
                tools.ants_apply_transforms.clone(),
            )),
        }
    }
}

impl Default for RegistrationBackend {
    fn default() -> Self {
        Self::NiftyReg
    }
}

impl FromStr for RegistrationBackend {
    type Err = PreprocessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "niftyreg" => Ok(Self::NiftyReg),
            "ants" => Ok(Self::Ants),
            other => Err(PreprocessError::BackendNotImplemented(other.to_string())),
        }
    }
}

impl std::fmt::Display for RegistrationBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Register or transform `moving_image` onto `fixed_image` with a named backend.
///
/// Only the `niftyreg` backend is routed here; every other backend name, `ants` included,
/// fails with [`PreprocessError::BackendNotImplemented`]. A `mode` other than `registration`
/// or `transformation` invokes nothing and returns `Ok(())`.
#[allow(clippy::too_many_arguments)]
pub fn register(
    fixed_image: &Path,
    moving_image: &Path,
    transformed_image: &Path,
    matrix: &Path,
    log_file: &Path,
    mode: &str,
    backend: &str,
) -> PreprocessResult<()> {
    register_with(
        fixed_image,
        moving_image,
        transformed_image,
        matrix,
        log_file,
        mode,
        backend,
        NiftyRegRegistrator::default,
    )
}

/// [`register`] with an explicit constructor for the NiftyReg registrator.
#[allow(clippy::too_many_arguments)]
pub fn register_with<R, F>(
    fixed_image: &Path,
    moving_image: &Path,
    transformed_image: &Path,
    matrix: &Path,
    log_file: &Path,
    mode: &str,
    backend: &str,
    niftyreg: F,
) -> PreprocessResult<()>
where
    R: Registrator,
    F: FnOnce() -> R,
{
    if backend != RegistrationBackend::NiftyReg.as_str() {
        return Err(PreprocessError::BackendNotImplemented(backend.to_string()));
    }

    match RegistrationMode::parse(mode) {
        Some(RegistrationMode::Registration) => niftyreg().register(
            fixed_image,
            moving_image,
            transformed_image,
            matrix,
            log_file,
        ),
        Some(RegistrationMode::Transformation) => niftyreg().transform(
            fixed_image,
            moving_image,
            transformed_image,
            matrix,
            log_file,
        ),
        None => {
            tracing::warn!(
                "unknown registration mode {:?} for backend {}; nothing was done",
                mode,
                backend
            );
            Ok(())
        }
    }
}

/// Append `extension` to a matrix path that has none.
pub(crate) fn matrix_with_extension(matrix: &Path, extension: &str) -> PathBuf {
    if matrix.extension().is_some() {
        matrix.to_path_buf()
    } else {
        let mut name = matrix.as_os_str().to_os_string();
        name.push(".");
        name.push(extension);
        PathBuf::from(name)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingRegistrator;
    use super::*;

    fn paths() -> [PathBuf; 5] {
        [
            PathBuf::from("/data/T1C.nii.gz"),
            PathBuf::from("/data/T1.nii.gz"),
            PathBuf::from("/tmp/co__t1.nii.gz"),
            PathBuf::from("/tmp/M__t1"),
            PathBuf::from("/tmp/co__t1.log"),
        ]
    }

    fn dispatch(
        recorder: &RecordingRegistrator,
        mode: &str,
        backend: &str,
    ) -> PreprocessResult<()> {
        let [fixed, moving, transformed, matrix, log] = paths();
        register_with(
            &fixed,
            &moving,
            &transformed,
            &matrix,
            &log,
            mode,
            backend,
            || recorder.clone(),
        )
    }

    #[test]
    fn niftyreg_registration_forwards_paths_to_register() {
        let recorder = RecordingRegistrator::default();
        dispatch(&recorder, "registration", "niftyreg").expect("dispatch succeeds");

        let calls = recorder.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "register");
        assert_eq!(calls[0].1, paths());
    }

    #[test]
    fn niftyreg_transformation_forwards_paths_to_transform() {
        let recorder = RecordingRegistrator::default();
        dispatch(&recorder, "transformation", "niftyreg").expect("dispatch succeeds");

        let calls = recorder.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "transform");
        assert_eq!(calls[0].1, paths());
    }

    #[test]
    fn unknown_mode_invokes_nothing() {
        let recorder = RecordingRegistrator::default();
        dispatch(&recorder, "resampling", "niftyreg").expect("unknown mode is a no-op");
        dispatch(&recorder, "", "niftyreg").expect("empty mode is a no-op");
        assert!(recorder.calls.borrow().is_empty());
    }

    #[test]
    fn other_backends_are_not_implemented() {
        let recorder = RecordingRegistrator::default();

        let err = dispatch(&recorder, "registration", "ants").expect_err("ants is rejected");
        assert!(matches!(
            err,
            PreprocessError::BackendNotImplemented(ref b) if b == "ants"
        ));
        assert!(err.to_string().contains("ants"));

        let err = dispatch(&recorder, "nonsense", "elastix").expect_err("backend checked first");
        assert!(err.to_string().contains("elastix"));

        assert!(recorder.calls.borrow().is_empty());
    }

    #[test]
    fn base_registrator_operations_are_not_implemented() {
        #[derive(Debug)]
        struct Bare;
        impl Registrator for Bare {}

        let [fixed, moving, transformed, matrix, log] = paths();
        let err = Bare
            .register(&fixed, &moving, &transformed, &matrix, &log)
            .expect_err("register is abstract");
        assert!(matches!(err, PreprocessError::OperationNotImplemented("register")));

        let err = Bare
            .transform(&fixed, &moving, &transformed, &matrix, &log)
            .expect_err("transform is abstract");
        assert!(matches!(err, PreprocessError::OperationNotImplemented("transform")));
    }

    #[test]
    fn backend_names_round_trip() {
        assert_eq!(
            "niftyreg".parse::<RegistrationBackend>().unwrap(),
            RegistrationBackend::NiftyReg
        );
        assert_eq!(
            "ants".parse::<RegistrationBackend>().unwrap(),
            RegistrationBackend::Ants
        );
        assert_eq!(
            RegistrationBackend::default().to_string(),
            crate::constants::DEFAULT_REGISTRATION_BACKEND
        );
        assert!(matches!(
            "NiftyReg".parse::<RegistrationBackend>(),
            Err(PreprocessError::BackendNotImplemented(_))
        ));
    }

    #[test]
    fn mode_parsing_is_exact() {
        assert_eq!(
            RegistrationMode::parse("registration"),
            Some(RegistrationMode::Registration)
        );
        assert_eq!(
            RegistrationMode::parse("transformation"),
            Some(RegistrationMode::Transformation)
        );
        assert_eq!(RegistrationMode::parse("Registration"), None);
        assert_eq!(RegistrationMode::Transformation.as_str(), "transformation");
    }

    #[test]
    fn matrix_extension_is_only_added_when_missing() {
        assert_eq!(
            matrix_with_extension(Path::new("/tmp/M__t1"), "txt"),
            PathBuf::from("/tmp/M__t1.txt")
        );
        assert_eq!(
            matrix_with_extension(Path::new("/tmp/M__t1.mat"), "txt"),
            PathBuf::from("/tmp/M__t1.mat")
        );
    }
}
