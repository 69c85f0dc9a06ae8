use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use astrostack_core::io::{expand_inputs, save_stacked, FileFrameReader};
use astrostack_core::progress::{ProgressReporter, StackingStage};
use astrostack_core::stack::{
    default_master_algorithm, parse_settings, stack_calibration_frames, FrameSelection,
    StackingAlgorithm,
};
use clap::Args;

use super::config::ProjectConfig;
use crate::progress::BarReporter;
use crate::summary::print_stack_summary;

#[derive(Args)]
pub struct MasterArgs {
    /// Dark or flat frames (still images or SER videos)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output master frame
    #[arg(short, long, default_value = "master.tif")]
    pub output: PathBuf,

    /// Project config file (TOML); only threads and memory are read from it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stacking algorithm; defaults to "kappa-sigma median"
    #[arg(long, alias = "stacker_type")]
    pub stacker_type: Option<String>,

    /// Algorithm settings as key=value pairs separated by ';'
    #[arg(long, alias = "algorithm_specific_settings")]
    pub algorithm_specific_settings: Option<String>,

    /// Number of worker threads
    #[arg(long, alias = "n_cpu")]
    pub n_cpu: Option<usize>,

    /// Memory limit in MB
    #[arg(long, alias = "memory_limit")]
    pub memory_limit: Option<usize>,
}

pub fn run(args: &MasterArgs) -> Result<()> {
    let mut config = ProjectConfig::load(args.config.as_deref())?.stacking;
    let settings = match &args.algorithm_specific_settings {
        Some(s) => parse_settings(s)?,
        None => Default::default(),
    };
    config.algorithm = match (&args.stacker_type, settings.is_empty()) {
        (Some(name), _) => StackingAlgorithm::from_name(name, &settings)?,
        (None, true) => default_master_algorithm(),
        (None, false) => StackingAlgorithm::from_name(default_master_algorithm().name(), &settings)?,
    };
    if let Some(n_cpu) = args.n_cpu {
        if n_cpu == 0 {
            bail!("--n-cpu must be at least 1");
        }
        config.n_cpu = n_cpu;
    }
    if args.memory_limit.is_some() {
        config.memory_limit_mb = args.memory_limit;
    }
    config.selection = FrameSelection::All;
    config.interpolate_colors = false;

    let frames = expand_inputs(&args.inputs).context("Failed to list calibration frames")?;
    print_stack_summary(&config, frames.len(), &args.output);

    let reader = FileFrameReader::new();
    let reporter = BarReporter::default();
    let image = stack_calibration_frames(&reader, &frames, config, &reporter)
        .context("Stacking calibration frames failed")?;

    reporter.begin_stage(StackingStage::Writing, None);
    save_stacked(&image, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    reporter.finish_stage();
    println!("Master frame saved to {}", args.output.display());
    Ok(())
}
