use tracing::info;

use crate::align::AlignmentResult;
use crate::error::{Result, StackerError};
use crate::frame::{ColorLayout, FrameData, FrameReader, InputFrame};
use crate::progress::ProgressReporter;

use super::config::{FrameSelection, KappaSigmaParams, StackingAlgorithm, StackingConfig};
use super::output::StackedImage;
use super::stacker::Stacker;

/// Algorithm used for master frames unless the caller picks another.
pub fn default_master_algorithm() -> StackingAlgorithm {
    StackingAlgorithm::KappaSigmaMedian(KappaSigmaParams::default())
}

/// Reads frames with raw mosaics relabeled as mono, so every sensor pixel is
/// combined on its own instead of being split by filter color.
struct SensorPlanes<'r> {
    inner: &'r dyn FrameReader,
}

impl FrameReader for SensorPlanes<'_> {
    fn read_frame(&self, frame: &InputFrame) -> Result<FrameData> {
        let mut data = self.inner.read_frame(frame)?;
        if let ColorLayout::Bayer(_) = data.layout {
            data.layout = ColorLayout::Mono;
        }
        Ok(data)
    }
}

/// Combine calibration exposures (darks or flats) into a master frame.
///
/// Frames are stacked unaligned, without calibration or color
/// interpolation, and all of them take part whatever `config.selection`
/// says. Mosaics produce a single plane holding the raw sensor values, ready
/// to calibrate lights of the same camera.
pub fn stack_calibration_frames(
    reader: &dyn FrameReader,
    frames: &[InputFrame],
    config: StackingConfig,
    progress: &dyn ProgressReporter,
) -> Result<StackedImage> {
    let Some(first) = frames.first() else {
        return Err(StackerError::EmptySequence);
    };
    let sensor = SensorPlanes { inner: reader };
    let sample = sensor.read_frame(first)?;

    let config = StackingConfig {
        interpolate_colors: false,
        selection: FrameSelection::All,
        ..config
    };
    info!(frames = frames.len(), algorithm = %config.algorithm, "Stacking calibration frames");

    let mut stacker = Stacker::new(config, &sensor, sample.width(), sample.height(), sample.n_colors());
    for frame in frames {
        stacker.add_frame(frame.clone(), AlignmentResult::identity().with_ranking(1.0));
    }
    stacker.stack(progress)
}
