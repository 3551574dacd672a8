use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("this backend is not implemented: {0}")]
    BackendNotImplemented(String),
    #[error("{0} is not implemented for this registrator")]
    OperationNotImplemented(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid name: {0}")]
    InvalidName(#[from] brainles_types::TextError),

    #[error("input file does not exist: {}", .0.display())]
    MissingInputFile(PathBuf),
    #[error("failed to read directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create directory {}: {source}", path.display())]
    DirCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create temporary working directory: {0}")]
    TempDir(std::io::Error),
    #[error("failed to copy {} to {}: {source}", from.display(), to.display())]
    FileCopy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to move {} to {}: {source}", from.display(), to.display())]
    FileMove {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start {tool}: {source}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status} (see {})", log.display())]
    ToolFailed {
        tool: String,
        status: std::process::ExitStatus,
        log: PathBuf,
    },
    #[error("{tool} did not produce expected output {}", path.display())]
    MissingToolOutput { tool: String, path: PathBuf },

    #[error("failed to read NIfTI image {}: {source}", path.display())]
    NiftiRead {
        path: PathBuf,
        #[source]
        source: nifti::NiftiError,
    },
    #[error("failed to write NIfTI image {}: {source}", path.display())]
    NiftiWrite {
        path: PathBuf,
        #[source]
        source: nifti::NiftiError,
    },
    #[error("unexpected image shape in {}: {reason}", path.display())]
    ImageShape { path: PathBuf, reason: String },
    #[error("image and mask shapes differ: {image:?} vs {mask:?}")]
    MaskShapeMismatch {
        image: Vec<usize>,
        mask: Vec<usize>,
    },
    #[error("cannot deface {}: {reason}", path.display())]
    DegenerateMask { path: PathBuf, reason: String },

    #[error("failed to read configuration file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub type PreprocessResult<T> = std::result::Result<T, PreprocessError>;
