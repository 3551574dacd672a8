//! Constants used throughout the BrainLes core crate.
//!
//! This module contains file names, tool names and pipeline defaults so that the batch
//! driver, the CLI and the tests agree on them.

/// Registration backend used by the `register` dispatch when none is given.
pub const DEFAULT_REGISTRATION_BACKEND: &str = "niftyreg";

/// Registration backend of a batch run when the pipeline config names none.
pub const DEFAULT_BATCH_REGISTRATION_BACKEND: &str = "ants";

/// `CUDA_VISIBLE_DEVICES` value of a batch run when the pipeline config names none.
pub const DEFAULT_CUDA_VISIBLE_DEVICES: &str = "0";

/// Input file name of the center (T1 contrast-enhanced) modality inside a subject folder.
pub const T1C_FILENAME: &str = "T1C.nii.gz";

/// Input file name of the T1 modality inside a subject folder.
pub const T1_FILENAME: &str = "T1.nii.gz";

/// Input file name of the T2 modality inside a subject folder.
pub const T2_FILENAME: &str = "T2.nii.gz";

/// Input file name of the FLAIR modality inside a subject folder.
pub const FLAIR_FILENAME: &str = "FLAIR.nii.gz";

/// Extension used for every image written by the pipeline.
pub const NIFTI_GZ_EXTENSION: &str = "nii.gz";

/// Default Quickshear buffer, in voxels.
pub const DEFAULT_DEFACING_BUFFER: f64 = 10.0;

/// Working subfolders created by the preprocessor.
pub const NORMALIZATION_DIR_NAME: &str = "normalization";
pub const COREGISTRATION_DIR_NAME: &str = "coregistration";
pub const ATLAS_REGISTRATION_DIR_NAME: &str = "atlas-registration";
pub const BRAIN_EXTRACTION_DIR_NAME: &str = "brain-extraction";
pub const DEFACING_DIR_NAME: &str = "defacing";

/// External binaries.
pub const REG_ALADIN: &str = "reg_aladin";
pub const REG_RESAMPLE: &str = "reg_resample";
pub const ANTS_REGISTRATION: &str = "antsRegistration";
pub const ANTS_APPLY_TRANSFORMS: &str = "antsApplyTransforms";
pub const HD_BET: &str = "hd-bet";

/// Environment variable handed to GPU tools to restrict visible devices.
pub const CUDA_VISIBLE_DEVICES: &str = "CUDA_VISIBLE_DEVICES";
