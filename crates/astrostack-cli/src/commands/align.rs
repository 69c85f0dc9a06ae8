use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use astrostack_core::align::{
    AlignmentResult, CometAligner, CometObservation, CometPath, FrameAligner, PlanetaryAligner,
    StarAligner, SurfaceAligner,
};
use astrostack_core::frame::{FrameData, FrameReader, InputFrame};
use astrostack_core::io::{expand_inputs, is_video_file, AlignmentFile, FileFrameReader};
use astrostack_core::progress::{ProgressReporter, StackingStage};
use astrostack_core::quality::FocusMeasure;
use clap::Args;
use rayon::prelude::*;
use tracing::{info, warn};

use super::config::{AlignmentMethod, AlignmentSettings, ProjectConfig};
use crate::progress::BarReporter;
use crate::summary::print_alignment_summary;

/// Comet position marked by hand on one input frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CometMark {
    /// Index into the expanded input list.
    pub frame: usize,
    pub x: f32,
    pub y: f32,
}

fn parse_comet_mark(s: &str) -> std::result::Result<CometMark, String> {
    let usage = || format!("'{s}' is not INDEX:X,Y");
    let (frame, position) = s.split_once(':').ok_or_else(usage)?;
    let (x, y) = position.split_once(',').ok_or_else(usage)?;
    Ok(CometMark {
        frame: frame.trim().parse().map_err(|_| usage())?,
        x: x.trim().parse().map_err(|_| usage())?,
        y: y.trim().parse().map_err(|_| usage())?,
    })
}

#[derive(Args)]
pub struct AlignArgs {
    /// Frames to align (still images or SER videos)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Reference frame; defaults to the first input
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Frame of the reference video to use
    #[arg(long, alias = "reference_frame", default_value = "0")]
    pub reference_frame: i32,

    /// Output alignment file
    #[arg(short, long, alias = "alignment_file", default_value = "alignment.txt")]
    pub output: PathBuf,

    /// Project config file (TOML); flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Alignment method
    #[arg(long, value_enum)]
    pub method: Option<AlignmentMethod>,

    /// Shorthand for `--method surface`
    #[arg(long, conflicts_with = "method")]
    pub surface: bool,

    /// Also solve a zoom factor between frames (star methods)
    #[arg(long, alias = "variable_zoom")]
    pub variable_zoom: bool,

    /// Frame ranking: laplacian-variance, gradient or disk-coverage
    #[arg(long, alias = "focus_measure")]
    pub focus_measure: Option<FocusMeasure>,

    /// Comet position on an input frame as INDEX:X,Y; give at least two
    #[arg(long, value_parser = parse_comet_mark)]
    pub comet: Vec<CometMark>,

    /// Fraction of brightest pixels treated as star pixels
    #[arg(long, alias = "star_pixel_fraction")]
    pub star_pixel_fraction: Option<f32>,

    /// Candidate stars must be this multiple of the reference minimum star size
    #[arg(long, alias = "candidate_size_factor")]
    pub candidate_size_factor: Option<f32>,

    /// Alignment point size in pixels (surface mode)
    #[arg(long, alias = "ap_size")]
    pub ap_size: Option<usize>,

    /// Largest local shift in pixels (surface mode)
    #[arg(long, alias = "search_radius")]
    pub search_radius: Option<usize>,

    /// Minimum mean brightness of an alignment point (surface mode)
    #[arg(long, alias = "min_brightness")]
    pub min_brightness: Option<f32>,
}

/// Config file settings with command line flags applied on top.
fn alignment_settings(args: &AlignArgs) -> Result<AlignmentSettings> {
    let mut settings = ProjectConfig::load(args.config.as_deref())?.alignment;
    if args.surface {
        settings.method = AlignmentMethod::Surface;
    } else if let Some(method) = args.method {
        settings.method = method;
    }
    if args.variable_zoom {
        settings.plate_solver.variable_zoom = true;
    }
    if let Some(measure) = args.focus_measure {
        settings.focus_measure = measure;
        settings.surface.focus_measure = measure;
        settings.planetary.focus_measure = measure;
    }
    if let Some(fraction) = args.star_pixel_fraction {
        settings.stars.pixel_fraction = fraction;
    }
    if let Some(factor) = args.candidate_size_factor {
        settings.stars.candidate_size_factor = factor;
    }
    if let Some(ap_size) = args.ap_size {
        settings.surface.ap_size = ap_size;
    }
    if let Some(radius) = args.search_radius {
        settings.surface.search_radius = radius;
    }
    if let Some(brightness) = args.min_brightness {
        settings.surface.min_brightness = brightness;
    }
    match settings.method {
        AlignmentMethod::Comet if args.comet.len() < 2 => {
            bail!("Comet alignment needs --comet on at least two frames")
        }
        AlignmentMethod::Comet => {}
        _ if !args.comet.is_empty() => bail!("--comet only applies to --method comet"),
        _ => {}
    }
    Ok(settings)
}

fn star_aligner(reference: &FrameData, settings: &AlignmentSettings) -> Result<StarAligner> {
    Ok(StarAligner::from_reference(reference, settings.stars.clone(), settings.plate_solver.clone())
        .context("Failed to prepare the reference frame")?
        .with_focus_measure(settings.focus_measure))
}

/// Fit the comet path through the marked frames and pin the comet where
/// the path puts it at the reference frame's capture time.
fn comet_aligner(
    reference: &FrameData,
    settings: &AlignmentSettings,
    marks: &[CometMark],
    frames: &[InputFrame],
    reader: &FileFrameReader,
) -> Result<CometAligner> {
    let stars = star_aligner(reference, settings)?;
    let observations = marks
        .iter()
        .map(|mark| {
            let frame = frames
                .get(mark.frame)
                .with_context(|| format!("--comet frame {} is past the {} inputs", mark.frame, frames.len()))?;
            let data = reader
                .read_frame(frame)
                .with_context(|| format!("Failed to read {frame}"))?;
            CometObservation::from_frame(&stars, &data, mark.x, mark.y)
                .with_context(|| format!("Failed to place the comet on {frame}"))
        })
        .collect::<Result<Vec<_>>>()?;
    let path = CometPath::fit(&observations)?;
    let timestamp = reference
        .metadata
        .timestamp
        .context("Comet alignment needs a reference frame with a capture timestamp")?;
    let position = path.position_at(timestamp);
    let (vx, vy) = path.velocity();
    info!(x = position.0, y = position.1, vx, vy, "Comet path fitted");
    Ok(CometAligner::new(stars, path, position))
}

pub fn run(args: &AlignArgs) -> Result<()> {
    let settings = alignment_settings(args)?;
    let reader = FileFrameReader::new();
    let frames = expand_inputs(&args.inputs).context("Failed to list input frames")?;

    let reference_frame = match &args.reference {
        Some(path) if is_video_file(path) => InputFrame::video(path.clone(), args.reference_frame),
        Some(path) => InputFrame::still(path.clone()),
        None => frames.first().cloned().context("No input frames")?,
    };
    let reference = reader
        .read_frame(&reference_frame)
        .with_context(|| format!("Failed to read reference frame {reference_frame}"))?;

    let aligner: Box<dyn FrameAligner> = match settings.method {
        AlignmentMethod::Stars => Box::new(star_aligner(&reference, &settings)?),
        AlignmentMethod::Planetary | AlignmentMethod::PlanetaryWithoutRotation => {
            let mut config = settings.planetary.clone();
            if settings.method == AlignmentMethod::PlanetaryWithoutRotation {
                config.rotation = false;
            }
            Box::new(
                PlanetaryAligner::from_reference(&reference, config)
                    .context("Failed to find the disk in the reference frame")?,
            )
        }
        AlignmentMethod::Surface => Box::new(SurfaceAligner::new(&reference, settings.surface.clone())),
        AlignmentMethod::Comet => {
            Box::new(comet_aligner(&reference, &settings, &args.comet, &frames, &reader)?)
        }
    };

    let reporter = BarReporter::default();
    reporter.begin_stage(StackingStage::Alignment, Some(frames.len()));
    let results: Vec<(InputFrame, AlignmentResult)> = frames
        .par_iter()
        .map(|frame| {
            let data = reader
                .read_frame(frame)
                .with_context(|| format!("Failed to read {frame}"))?;
            let result = aligner
                .align_frame(&data)
                .with_context(|| format!("Failed to align {frame}"))?;
            if !result.is_valid {
                warn!(frame = %frame, "Alignment failed, frame will not be stacked");
            }
            reporter.advance(1);
            Ok((frame.clone(), result))
        })
        .collect::<Result<_>>()?;
    reporter.finish_stage();

    let mut file = AlignmentFile::new(Some(reference_frame));
    for (frame, result) in results {
        file.insert(frame, result);
    }
    let failed = file.entries.values().filter(|r| !r.is_valid).count();
    file.save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    print_alignment_summary(file.len(), failed, &args.output);
    Ok(())
}
