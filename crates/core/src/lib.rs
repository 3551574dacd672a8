//! # BrainLes Core
//!
//! Orchestration of a multi-step MRI preprocessing pipeline.
//!
//! This crate wires together, for each subject:
//! - intensity normalization of every modality
//! - registration of the moving modalities onto a center modality (NiftyReg or ANTs)
//! - brain extraction of the center modality (HD-BET) and mask propagation
//! - Quickshear defacing driven by the brain mask
//!
//! Registration and brain extraction are delegated to external binaries invoked as child
//! processes. Normalization, mask application and defacing operate on NIfTI volumes in-process.
//!
//! **No CLI concerns**: argument parsing and logging setup belong in `brainles-cli` and the
//! `brainles-run` batch binary.

pub mod batch;
pub mod brain_extraction;
pub mod command;
pub mod config;
pub mod constants;
pub mod defacing;
pub mod error;
pub mod image;
pub mod modality;
pub mod normalization;
pub mod preprocessor;
pub mod registration;

pub use batch::{
    process_all_subjects_in_folder, process_all_subjects_in_folder_with, SubjectLayout,
};
pub use brain_extraction::{BrainExtractor, HdBetExtractor, HdBetMode};
pub use command::{ToolCommand, ToolEnv};
pub use config::{PipelineConfig, ToolPaths};
pub use defacing::{Defacer, QuickshearDefacer};
pub use error::{PreprocessError, PreprocessResult};
pub use modality::{CenterModality, Modality};
pub use normalization::{Normalizer, PercentileNormalizer, WindowingNormalizer};
pub use preprocessor::Preprocessor;
pub use registration::{
    register, register_with, AntsRegistrator, NiftyRegRegistrator, RegistrationBackend,
    RegistrationMode, Registrator,
};

pub use brainles_types::{NonEmptyText, Percentile, TextError};
