use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{DEFAULT_AP_MIN_BRIGHTNESS, DEFAULT_AP_SEARCH_RADIUS, DEFAULT_AP_SIZE};
use crate::error::{Result, StackerError};
use crate::frame::FrameData;
use crate::quality::{laplacian_variance, FocusMeasure};

use super::aligner::FrameAligner;
use super::local_shifts::{LocalShift, LocalShiftsHandler};
use super::phase_correlation::measure_offset;
use super::result::AlignmentResult;

/// Alignment point grid used for surface (local shift only) alignment.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceAlignmentConfig {
    /// Alignment point box size in pixels.
    pub ap_size: usize,
    /// Largest shift (px) an alignment point may report and stay valid.
    pub search_radius: usize,
    /// Reference boxes darker than this mean brightness are marked invalid.
    pub min_brightness: f32,
    /// Frame ranking; alignment point scores always use the Laplacian variance.
    pub focus_measure: FocusMeasure,
}

impl Default for SurfaceAlignmentConfig {
    fn default() -> Self {
        Self {
            ap_size: DEFAULT_AP_SIZE,
            search_radius: DEFAULT_AP_SEARCH_RADIUS,
            min_brightness: DEFAULT_AP_MIN_BRIGHTNESS,
            focus_measure: FocusMeasure::default(),
        }
    }
}

/// Centers of alignment point boxes, placed with 50% overlap.
pub fn ap_centers(width: usize, height: usize, ap_size: usize) -> Vec<(usize, usize)> {
    let half = (ap_size / 2).max(1);
    let mut centers = Vec::new();
    let mut cy = half;
    while cy + half <= height {
        let mut cx = half;
        while cx + half <= width {
            centers.push((cx, cy));
            cx += half;
        }
        cy += half;
    }
    centers
}

/// Measure the local shift at every alignment point of `frame` against `reference`.
///
/// Both planes must be in the same (globally aligned) coordinate system.
/// The measurement box of each point is the AP box grown by the search radius,
/// clamped to the image.
pub fn compute_local_shifts(
    reference: &Array2<f32>,
    frame: &Array2<f32>,
    config: &SurfaceAlignmentConfig,
) -> Result<Vec<LocalShift>> {
    let (h, w) = reference.dim();
    if frame.dim() != (h, w) {
        return Err(StackerError::DimensionMismatch {
            expected_width: w,
            expected_height: h,
            width: frame.ncols(),
            height: frame.nrows(),
        });
    }

    let half = config.ap_size / 2 + config.search_radius;
    let mut shifts = Vec::new();
    for (cx, cy) in ap_centers(w, h, config.ap_size) {
        let y0 = cy.saturating_sub(half);
        let y1 = (cy + half).min(h);
        let x0 = cx.saturating_sub(half);
        let x1 = (cx + half).min(w);
        let reference_box = reference.slice(s![y0..y1, x0..x1]).to_owned();
        let frame_box = frame.slice(s![y0..y1, x0..x1]);

        let offset = measure_offset(&reference_box, &frame_box.to_owned())?;
        let dx = (-offset.dx).round() as i32;
        let dy = (-offset.dy).round() as i32;
        let radius = config.search_radius as i32;
        let bright = reference_box.mean().unwrap_or(0.0) >= config.min_brightness;

        shifts.push(LocalShift {
            x: cx as i32,
            y: cy as i32,
            dx,
            dy,
            valid_ap: bright && dx.abs() <= radius && dy.abs() <= radius,
            score: laplacian_variance(frame_box) as f32,
        });
    }
    debug!(
        points = shifts.len(),
        valid = shifts.iter().filter(|s| s.valid_ap).count(),
        "Measured local shifts"
    );
    Ok(shifts)
}

/// Align `frame` to `reference` with local shifts only (no global transform).
pub fn align_surface(
    reference: &FrameData,
    frame: &FrameData,
    config: &SurfaceAlignmentConfig,
) -> Result<AlignmentResult> {
    SurfaceAligner::new(reference, config.clone()).align_frame(frame)
}

/// Surface aligner holding the reference brightness between frames.
pub struct SurfaceAligner {
    reference: Array2<f32>,
    config: SurfaceAlignmentConfig,
}

impl SurfaceAligner {
    pub fn new(reference: &FrameData, config: SurfaceAlignmentConfig) -> Self {
        Self {
            reference: reference.brightness(),
            config,
        }
    }
}

impl FrameAligner for SurfaceAligner {
    fn align_frame(&self, frame: &FrameData) -> Result<AlignmentResult> {
        let brightness = frame.brightness();
        let shifts = compute_local_shifts(&self.reference, &brightness, &self.config)?;
        let ranking = self.config.focus_measure.score(brightness.view()) as f32;
        Ok(AlignmentResult::identity()
            .with_ranking(ranking)
            .with_local_shifts(LocalShiftsHandler::new(shifts)))
    }
}
