use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brainles_core::{process_all_subjects_in_folder, PipelineConfig, ToolPaths};

/// Batch entry point: preprocesses every subject folder in the data directory.
///
/// # Environment Variables
/// - `BRAINLES_DATA_DIR`: folder whose subdirectories are subjects (required)
/// - `BRAINLES_OUTPUT_DIR`: flat output folder (default: "output")
/// - `BRAINLES_CONFIG`: optional YAML pipeline configuration
/// - `BRAINLES_NIFTYREG_DIR`: directory containing `reg_aladin` and `reg_resample`
/// - `BRAINLES_ANTS_DIR`: directory containing `antsRegistration` and `antsApplyTransforms`
/// - `BRAINLES_HD_BET`: path of the `hd-bet` executable
///
/// A `.env` file in the working directory is loaded first.
fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("brainles=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir: PathBuf = std::env::var("BRAINLES_DATA_DIR")
        .context("BRAINLES_DATA_DIR must point at the folder holding the subject folders")?
        .into();
    let output_dir: PathBuf = std::env::var("BRAINLES_OUTPUT_DIR")
        .unwrap_or_else(|_| "output".into())
        .into();

    let config = match std::env::var("BRAINLES_CONFIG").ok() {
        Some(path) => PipelineConfig::load(Path::new(&path))?,
        None => PipelineConfig::default(),
    };
    let tools = ToolPaths::from_env_values(
        std::env::var("BRAINLES_NIFTYREG_DIR").ok(),
        std::env::var("BRAINLES_ANTS_DIR").ok(),
        std::env::var("BRAINLES_HD_BET").ok(),
    )?;

    tracing::info!(
        "preprocessing subjects in {} into {} with {}",
        data_dir.display(),
        output_dir.display(),
        config.registration_backend
    );

    process_all_subjects_in_folder(&data_dir, &output_dir, &config, &tools)?;

    Ok(())
}
