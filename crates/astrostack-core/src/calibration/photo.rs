use std::ops::Range;
use std::sync::Arc;

use ndarray::{Array2, ArrayView1};

use crate::align::{AlignmentResult, GeometricTransformer, LocalShiftsHandler, ShiftLookup};
use crate::color::debayer::interpolate_colors;
use crate::consts::{CALIBRATION_ROW_MARGIN, EMPTY_PIXEL};
use crate::error::Result;
use crate::frame::{ColorLayout, FrameData};

use super::{CalibrationFrame, HotPixelIdentifier};

/// Calibration applied to every frame before it is resampled.
#[derive(Clone, Default)]
pub struct CalibrationSetup {
    pub calibration_frames: Vec<Arc<dyn CalibrationFrame>>,
    pub hot_pixels: Option<Arc<HotPixelIdentifier>>,
    pub interpolate_colors: bool,
}

/// One frame resampled onto reference-frame rows `y_min..y_max`.
///
/// Every color plane holds [`EMPTY_PIXEL`] where the frame contributes
/// nothing: outside its bounds, rejected by local shifts, or (for raw
/// mosaics without color interpolation) at colors the sensor pixel does not see.
#[derive(Clone, Debug)]
pub struct CalibratedPhoto {
    y_min: usize,
    values: Vec<Array2<f32>>,
    scores: Array2<f32>,
}

impl CalibratedPhoto {
    /// Calibrate `frame` and resample it into reference rows `y_min..y_max`.
    ///
    /// Only the sensor rows the band can sample are calibrated; the rest of
    /// the decoded frame is dropped before any correction runs.
    pub fn calibrate(
        frame: FrameData,
        alignment: &AlignmentResult,
        setup: &CalibrationSetup,
        y_min: usize,
        y_max: usize,
    ) -> Result<Self> {
        let (width, height) = (frame.width(), frame.height());
        let n_colors = frame.n_colors();
        let transformer = alignment.transformer();
        let local_shifts = alignment.local_shifts.as_ref().filter(|l| !l.is_empty());

        let rows = source_rows(&transformer, local_shifts, width, height, y_min, y_max);
        let mut frame = if rows == (0..height) {
            frame
        } else {
            frame.crop_rows(rows.clone())
        };
        if !rows.is_empty() {
            for calibration in &setup.calibration_frames {
                calibration.apply_calibration_rows(&mut frame, rows.start)?;
            }
            if let Some(hot_pixels) = &setup.hot_pixels {
                hot_pixels.fix_hot_pixels_rows(&mut frame, rows.start);
            }
            if setup.interpolate_colors {
                frame = interpolate_colors(frame);
            }
        }

        let band_height = y_max.saturating_sub(y_min);
        let mut values = vec![Array2::from_elem((band_height, width), EMPTY_PIXEL); n_colors];
        let mut scores = Array2::from_elem((band_height, width), alignment.ranking);

        for y in y_min..y_max {
            let row = y - y_min;
            for x in 0..width {
                let (mut xs, mut ys) = transformer.to_shifted(x as f32, y as f32);
                if let Some(local_shifts) = local_shifts {
                    match local_shifts.calculate_shifted_coordinates(xs.floor() as i32, ys.floor() as i32) {
                        ShiftLookup::NotApplicable => {}
                        ShiftLookup::Rejected => continue,
                        ShiftLookup::Shifted { x: sx, y: sy, score } => {
                            xs = sx;
                            ys = sy;
                            scores[[row, x]] = score;
                        }
                    }
                }

                let (xi, yi) = (xs.floor(), ys.floor());
                if xi < 0.0 || xi >= width as f32 || yi < rows.start as f32 || yi >= rows.end as f32 {
                    continue;
                }
                let (xi, yi) = (xi as usize, yi as usize - rows.start);
                match frame.layout {
                    ColorLayout::Rgb => {
                        for (color, plane) in frame.planes.iter().enumerate() {
                            values[color][[row, x]] = plane[[yi, xi]];
                        }
                    }
                    ColorLayout::Mono | ColorLayout::Bayer(_) => {
                        let color = frame.color_at(xi, yi) as usize;
                        values[color][[row, x]] = frame.planes[0][[yi, xi]];
                    }
                }
            }
        }

        Ok(Self {
            y_min,
            values,
            scores,
        })
    }

    pub fn n_colors(&self) -> usize {
        self.values.len()
    }

    pub fn y_range(&self) -> (usize, usize) {
        (self.y_min, self.y_min + self.scores.nrows())
    }

    /// Value at reference coordinates, `None` when the frame contributes nothing.
    pub fn value(&self, x: usize, y: usize, color: usize) -> Option<f32> {
        let v = self.values[color][[y - self.y_min, x]];
        (v != EMPTY_PIXEL).then_some(v)
    }

    /// Confidence of the sample at reference coordinates.
    pub fn score(&self, x: usize, y: usize) -> f32 {
        self.scores[[y - self.y_min, x]]
    }

    /// Values of one reference row, [`EMPTY_PIXEL`] where empty.
    pub fn row(&self, color: usize, y: usize) -> ArrayView1<'_, f32> {
        self.values[color].row(y - self.y_min)
    }

    pub fn score_row(&self, y: usize) -> ArrayView1<'_, f32> {
        self.scores.row(y - self.y_min)
    }
}

/// Sensor rows that reference rows `y_min..y_max` can sample, padded by
/// [`CALIBRATION_ROW_MARGIN`] and clamped to the frame.
fn source_rows(
    transformer: &GeometricTransformer,
    local_shifts: Option<&LocalShiftsHandler>,
    width: usize,
    height: usize,
    y_min: usize,
    y_max: usize,
) -> Range<usize> {
    if y_min >= y_max || width == 0 || height == 0 {
        return 0..0;
    }
    let max_local_dy = local_shifts
        .and_then(|l| l.shifts().iter().map(|s| s.dy.unsigned_abs()).max())
        .unwrap_or(0) as f32;

    let (mut lo, mut hi) = (f32::INFINITY, f32::NEG_INFINITY);
    for x in [0.0, (width - 1) as f32] {
        for y in [y_min as f32, (y_max - 1) as f32] {
            let (_, ys) = transformer.to_shifted(x, y);
            lo = lo.min(ys);
            hi = hi.max(ys);
        }
    }
    let margin = CALIBRATION_ROW_MARGIN as f32;
    let start = (lo - max_local_dy - margin).floor().clamp(0.0, height as f32) as usize;
    let end = (hi + max_local_dy + margin + 1.0).floor().clamp(0.0, height as f32) as usize;
    start..end.max(start)
}
