use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brainles_core::command::tool_available;
use brainles_core::constants::DEFAULT_REGISTRATION_BACKEND;
use brainles_core::image::apply_mask;
use brainles_core::{
    process_all_subjects_in_folder, register_with, BrainExtractor, Defacer, HdBetExtractor,
    HdBetMode, NiftyRegRegistrator, Normalizer, Percentile, PercentileNormalizer, PipelineConfig,
    QuickshearDefacer, ToolEnv, ToolPaths, WindowingNormalizer,
};

#[derive(Parser)]
#[command(name = "brainles")]
#[command(about = "BrainLes MRI preprocessing CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Locations of the external tools; bare names on `PATH` when omitted.
#[derive(Args)]
struct ToolArgs {
    /// Directory containing reg_aladin and reg_resample
    #[arg(long)]
    niftyreg_dir: Option<String>,
    /// Directory containing antsRegistration and antsApplyTransforms
    #[arg(long)]
    ants_dir: Option<String>,
    /// Path of the hd-bet executable
    #[arg(long)]
    hd_bet: Option<String>,
}

impl ToolArgs {
    fn resolve(self) -> anyhow::Result<ToolPaths> {
        Ok(ToolPaths::from_env_values(
            self.niftyreg_dir,
            self.ants_dir,
            self.hd_bet,
        )?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Preprocess every subject folder in a data folder
    Run {
        /// Folder whose subdirectories are subjects
        data_dir: PathBuf,
        /// Flat output folder
        #[arg(default_value = "output")]
        output_dir: PathBuf,
        /// YAML pipeline configuration (optional)
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        tools: ToolArgs,
    },
    /// Register a moving image onto a fixed image, or apply a stored transform
    Register {
        fixed_image: PathBuf,
        moving_image: PathBuf,
        transformed_image: PathBuf,
        matrix: PathBuf,
        log_file: PathBuf,
        /// registration | transformation
        #[arg(long, default_value = "registration")]
        mode: String,
        /// Registration backend
        #[arg(long, default_value = DEFAULT_REGISTRATION_BACKEND)]
        backend: String,
        #[command(flatten)]
        tools: ToolArgs,
    },
    /// Normalize intensities of a single image
    Normalize {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value_t = 0.1)]
        lower_percentile: f64,
        #[arg(long, default_value_t = 99.9)]
        upper_percentile: f64,
        #[arg(long, default_value_t = 0.0)]
        lower_limit: f64,
        #[arg(long, default_value_t = 1.0)]
        upper_limit: f64,
        /// Use a fixed intensity window instead of percentiles (requires --window-width)
        #[arg(long, requires = "window_width")]
        window_center: Option<f64>,
        #[arg(long, requires = "window_center")]
        window_width: Option<f64>,
    },
    /// Skull-strip an image with HD-BET
    ExtractBrain {
        input: PathBuf,
        masked_image: PathBuf,
        brain_mask: PathBuf,
        /// Log file for the HD-BET output (default: next to the masked image)
        #[arg(long)]
        log_file: Option<PathBuf>,
        /// accurate | fast
        #[arg(long, default_value = "accurate")]
        mode: String,
        /// Disable test-time augmentation
        #[arg(long)]
        no_tta: bool,
        /// GPU index or "cpu"
        #[arg(long, default_value = "0")]
        device: String,
        /// Value for CUDA_VISIBLE_DEVICES in the HD-BET process
        #[arg(long)]
        cuda_visible_devices: Option<String>,
        #[command(flatten)]
        tools: ToolArgs,
    },
    /// Compute a Quickshear defacing mask from a brain mask
    Deface {
        brain_mask: PathBuf,
        defacing_mask: PathBuf,
        /// Buffer below the face line, in voxels
        #[arg(long, default_value_t = 10.0)]
        buffer: f64,
    },
    /// Zero every voxel outside a mask
    ApplyMask {
        input: PathBuf,
        mask: PathBuf,
        output: PathBuf,
    },
    /// Report which external tools can be started
    CheckTools {
        #[command(flatten)]
        tools: ToolArgs,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("brainles=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            data_dir,
            output_dir,
            config,
            tools,
        }) => {
            let config = match config {
                Some(path) => PipelineConfig::load(&path)?,
                None => PipelineConfig::default(),
            };
            process_all_subjects_in_folder(&data_dir, &output_dir, &config, &tools.resolve()?)?;
            println!("Preprocessed subjects into {}", output_dir.display());
        }
        Some(Commands::Register {
            fixed_image,
            moving_image,
            transformed_image,
            matrix,
            log_file,
            mode,
            backend,
            tools,
        }) => {
            let tools = tools.resolve()?;
            register_with(
                &fixed_image,
                &moving_image,
                &transformed_image,
                &matrix,
                &log_file,
                &mode,
                &backend,
                || NiftyRegRegistrator::new(tools.reg_aladin.clone(), tools.reg_resample.clone()),
            )?;
            println!("Wrote {}", transformed_image.display());
        }
        Some(Commands::Normalize {
            input,
            output,
            lower_percentile,
            upper_percentile,
            lower_limit,
            upper_limit,
            window_center,
            window_width,
        }) => {
            let normalizer: Box<dyn Normalizer> = match (window_center, window_width) {
                (Some(center), Some(width)) => Box::new(WindowingNormalizer::new(center, width)?),
                _ => Box::new(PercentileNormalizer::new(
                    Percentile::new(lower_percentile)?,
                    Percentile::new(upper_percentile)?,
                    lower_limit,
                    upper_limit,
                )?),
            };
            normalizer.normalize_file(&input, &output)?;
            println!("Wrote {}", output.display());
        }
        Some(Commands::ExtractBrain {
            input,
            masked_image,
            brain_mask,
            log_file,
            mode,
            no_tta,
            device,
            cuda_visible_devices,
            tools,
        }) => {
            let mode: HdBetMode = mode.parse()?;
            let extractor = HdBetExtractor::new(tools.resolve()?.hd_bet, mode, !no_tta, device);
            let log_file = log_file.unwrap_or_else(|| masked_image.with_extension("log"));
            let env = ToolEnv {
                cuda_visible_devices,
            };
            extractor.extract(&input, &masked_image, &brain_mask, &log_file, &env)?;
            println!(
                "Wrote {} and {}",
                masked_image.display(),
                brain_mask.display()
            );
        }
        Some(Commands::Deface {
            brain_mask,
            defacing_mask,
            buffer,
        }) => {
            QuickshearDefacer::new(buffer).deface(&brain_mask, &defacing_mask)?;
            println!("Wrote {}", defacing_mask.display());
        }
        Some(Commands::ApplyMask {
            input,
            mask,
            output,
        }) => {
            apply_mask(&input, &mask, &output)
                .with_context(|| format!("masking {}", input.display()))?;
            println!("Wrote {}", output.display());
        }
        Some(Commands::CheckTools { tools }) => {
            let tools = tools.resolve()?;
            let mut missing = 0;
            for (name, path) in tools.all() {
                if tool_available(path, "-h") {
                    println!("{name}: ok ({})", path.display());
                } else {
                    println!("{name}: not found ({})", path.display());
                    missing += 1;
                }
            }
            if missing > 0 {
                anyhow::bail!("{missing} tool(s) could not be started");
            }
        }
        None => {
            println!("Use 'brainles --help' for commands");
        }
    }

    Ok(())
}
