use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use astrostack_core::calibration::{CalibrationFrame, CalibrationSetup, DarkFrame, FlatFrame};
use astrostack_core::frame::{FrameReader, InputFrame};
use astrostack_core::io::{load_hot_pixels, save_stacked, AlignmentFile, FileFrameReader};
use astrostack_core::progress::{ProgressReporter, StackingStage};
use astrostack_core::stack::{parse_settings, FrameSelection, StackingAlgorithm, StackingConfig, Stacker};
use clap::Args;

use super::config::ProjectConfig;
use crate::progress::BarReporter;
use crate::summary::print_stack_summary;

#[derive(Args)]
pub struct StackArgs {
    /// Alignment file written by `align`
    #[arg(long, alias = "alignment_file")]
    pub alignment_file: PathBuf,

    /// Output image (.tif/.tiff for 16-bit TIFF, .png for 8-bit PNG)
    #[arg(short, long, default_value = "stacked.tif")]
    pub output: PathBuf,

    /// Project config file (TOML); flags below override its `[stacking]` table
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stacking algorithm, e.g. "kappa-sigma mean", "median", "average"
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

    /// Flat frame
    #[arg(long, alias = "flat_frame")]
    pub flat_frame: Option<PathBuf>,

    /// Dark frame
    #[arg(long, alias = "dark_frame")]
    pub dark_frame: Option<PathBuf>,

    /// Hot pixel file written by `hot-pixels`
    #[arg(long, alias = "hot_pixels_file")]
    pub hot_pixels_file: Option<PathBuf>,

    /// Stack only the N best-ranked frames
    #[arg(long, alias = "n_files", conflicts_with = "fraction_of_files")]
    pub n_files: Option<usize>,

    /// Stack only the best-ranked fraction of frames (0-1)
    #[arg(long, alias = "fraction_of_files")]
    pub fraction_of_files: Option<f32>,

    /// Debayer raw frames before stacking
    #[arg(long, alias = "interpolate_colors")]
    pub interpolate_colors: bool,

    /// Skip frames that fail to load instead of aborting
    #[arg(long)]
    pub skip_failed_frames: bool,
}

pub fn run(args: &StackArgs) -> Result<()> {
    let config = build_config(args)?;
    let alignment = AlignmentFile::load(&args.alignment_file)
        .with_context(|| format!("Failed to read alignment file {}", args.alignment_file.display()))?;

    let reader = FileFrameReader::new();
    let reference_frame = alignment
        .reference
        .clone()
        .or_else(|| alignment.entries.keys().next().cloned())
        .context("Alignment file lists no frames")?;
    let reference = reader
        .read_frame(&reference_frame)
        .with_context(|| format!("Failed to read reference frame {reference_frame}"))?;

    let calibration = load_calibration(args, &reader)?;

    print_stack_summary(&config, alignment.len(), &args.output);

    let mut stacker = Stacker::new(
        config,
        &reader,
        reference.width(),
        reference.height(),
        reference.n_colors(),
    )
    .with_calibration(calibration)
    .skip_failed_frames(args.skip_failed_frames);
    for (frame, result) in &alignment.entries {
        stacker.add_frame(frame.clone(), result.clone());
    }

    let reporter = BarReporter::default();
    let image = stacker.stack(&reporter).context("Stacking failed")?;

    reporter.begin_stage(StackingStage::Writing, None);
    save_stacked(&image, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    reporter.finish_stage();
    println!("Saved to {}", args.output.display());
    Ok(())
}

fn build_config(args: &StackArgs) -> Result<StackingConfig> {
    let mut config = ProjectConfig::load(args.config.as_deref())?.stacking;

    let settings = match &args.algorithm_specific_settings {
        Some(s) => parse_settings(s)?,
        None => Default::default(),
    };
    if args.stacker_type.is_some() || !settings.is_empty() {
        let name = args.stacker_type.as_deref().unwrap_or(config.algorithm.name());
        config.algorithm = StackingAlgorithm::from_name(name, &settings)?;
    }
    if let Some(n_cpu) = args.n_cpu {
        if n_cpu == 0 {
            bail!("--n-cpu must be at least 1");
        }
        config.n_cpu = n_cpu;
    }
    if args.memory_limit.is_some() {
        config.memory_limit_mb = args.memory_limit;
    }
    if args.interpolate_colors {
        config.interpolate_colors = true;
    }
    if let Some(count) = args.n_files {
        config.selection = FrameSelection::Best { count };
    } else if let Some(fraction) = args.fraction_of_files {
        if !(0.0..=1.0).contains(&fraction) {
            bail!("--fraction-of-files must be between 0 and 1");
        }
        config.selection = FrameSelection::BestFraction { fraction };
    }
    Ok(config)
}

fn load_calibration(args: &StackArgs, reader: &FileFrameReader) -> Result<CalibrationSetup> {
    let read = |path: &Path| {
        reader
            .read_frame(&InputFrame::still(path))
            .with_context(|| format!("Failed to read calibration frame {}", path.display()))
    };

    let mut setup = CalibrationSetup::default();
    if let Some(path) = &args.dark_frame {
        let dark: Arc<dyn CalibrationFrame> = Arc::new(DarkFrame::from_frame(&read(path)?));
        setup.calibration_frames.push(dark);
    }
    if let Some(path) = &args.flat_frame {
        let flat: Arc<dyn CalibrationFrame> = Arc::new(FlatFrame::from_frame(&read(path)?));
        setup.calibration_frames.push(flat);
    }
    if let Some(path) = &args.hot_pixels_file {
        let hot_pixels = load_hot_pixels(path)
            .with_context(|| format!("Failed to read hot pixel file {}", path.display()))?;
        setup.hot_pixels = Some(Arc::new(hot_pixels));
    }
    Ok(setup)
}
