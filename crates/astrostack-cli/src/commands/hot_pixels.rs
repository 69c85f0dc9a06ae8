use std::path::PathBuf;

use anyhow::{Context, Result};
use astrostack_core::calibration::HotPixelIdentifier;
use astrostack_core::io::{expand_inputs, save_hot_pixels, FileFrameReader};
use astrostack_core::progress::{ProgressReporter, StackingStage};
use clap::Args;

use crate::progress::BarReporter;

#[derive(Args)]
pub struct HotPixelsArgs {
    /// Dark frames (still images or SER videos)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output hot pixel file
    #[arg(short, long, default_value = "hot_pixels.txt")]
    pub output: PathBuf,
}

pub fn run(args: &HotPixelsArgs) -> Result<()> {
    let reader = FileFrameReader::new();
    let frames = expand_inputs(&args.inputs).context("Failed to list dark frames")?;
    let reporter = BarReporter::default();
    reporter.begin_stage(StackingStage::HotPixels, None);
    let mut identifier = HotPixelIdentifier::new();
    identifier
        .add_photos(&reader, &frames)
        .context("Failed to read dark frames")?;
    identifier.compute_hot_pixels();
    reporter.finish_stage();

    save_hot_pixels(&identifier, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!(
        "Found {} hot pixels in {} dark frames, saved to {}",
        identifier.hot_pixels().count(),
        identifier.n_photos(),
        args.output.display()
    );
    Ok(())
}
