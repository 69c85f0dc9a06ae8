//! Center-of-mass alignment for a single bright disk (planets, the Moon).
//!
//! The disk is the largest cluster above a threshold; its intensity-weighted
//! center of mass gives the shift and, unless rotation is disabled, the
//! principal axis of its second moments gives the rotation.

use std::f32::consts::{FRAC_PI_2, PI};
use std::ops::Range;

use ndarray::{s, Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{
    PARALLEL_PIXEL_THRESHOLD, PLANETARY_MIN_DISK_SIZE, PLANETARY_MIN_THRESHOLD_FRACTION,
    PLANETARY_WINDOW_BORDER,
};
use crate::detection::components::connected_components;
use crate::detection::otsu_threshold;
use crate::error::{Result, StackerError};
use crate::frame::FrameData;
use crate::quality::FocusMeasure;

use super::aligner::FrameAligner;
use super::result::AlignmentResult;
use super::transform::GeometricTransformer;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanetaryAlignmentConfig {
    /// Solve the disk's rotation; translation only when false.
    pub rotation: bool,
    pub focus_measure: FocusMeasure,
}

impl Default for PlanetaryAlignmentConfig {
    fn default() -> Self {
        Self {
            rotation: true,
            focus_measure: FocusMeasure::default(),
        }
    }
}

/// Position and orientation of a bright disk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Disk {
    /// Intensity-weighted center of mass.
    pub x: f32,
    pub y: f32,
    /// Major axis angle in radians, in (-pi/2, pi/2].
    pub angle: f32,
    /// Pixels of the cluster the disk was found in.
    pub area: usize,
}

/// Weighted raw moments up to second order.
#[derive(Clone, Copy, Debug, Default)]
struct Moments {
    w: f64,
    wx: f64,
    wy: f64,
    wxx: f64,
    wxy: f64,
    wyy: f64,
}

impl Moments {
    fn add(&mut self, x: f64, y: f64, weight: f64) {
        self.w += weight;
        self.wx += weight * x;
        self.wy += weight * y;
        self.wxx += weight * x * x;
        self.wxy += weight * x * y;
        self.wyy += weight * y * y;
    }

    fn merge(self, other: Self) -> Self {
        Self {
            w: self.w + other.w,
            wx: self.wx + other.wx,
            wy: self.wy + other.wy,
            wxx: self.wxx + other.wxx,
            wxy: self.wxy + other.wxy,
            wyy: self.wyy + other.wyy,
        }
    }

    fn row(data: ArrayView2<'_, f32>, y: usize, cols: Range<usize>, threshold: f32) -> Self {
        let mut moments = Self::default();
        for x in cols {
            let v = data[[y, x]];
            if v >= threshold {
                moments.add(x as f64, y as f64, v as f64);
            }
        }
        moments
    }
}

/// Disk threshold: Otsu's level, but never below a fixed fraction of the peak.
pub fn disk_threshold(brightness: ArrayView2<'_, f32>) -> f32 {
    let max = brightness.iter().copied().fold(0.0f32, f32::max);
    otsu_threshold(brightness).max(PLANETARY_MIN_THRESHOLD_FRACTION * max)
}

/// Locate the disk in a brightness plane.
///
/// Moments are taken over pixels at or above the threshold inside the
/// largest cluster's bounding box grown by [`PLANETARY_WINDOW_BORDER`].
pub fn find_disk(brightness: &Array2<f32>) -> Result<Disk> {
    let threshold = disk_threshold(brightness.view());
    let mask = brightness.mapv(|v| v >= threshold);
    let components = connected_components(&mask);
    let Some(largest) = components.first().filter(|c| c.area >= PLANETARY_MIN_DISK_SIZE) else {
        return Err(StackerError::DiskNotFound {
            area: components.first().map_or(0, |c| c.area),
        });
    };

    let (h, w) = brightness.dim();
    let (min_row, max_row, min_col, max_col) = largest.bbox;
    let rows = min_row.saturating_sub(PLANETARY_WINDOW_BORDER)..(max_row + 1 + PLANETARY_WINDOW_BORDER).min(h);
    let cols = min_col.saturating_sub(PLANETARY_WINDOW_BORDER)..(max_col + 1 + PLANETARY_WINDOW_BORDER).min(w);

    let view = brightness.view();
    let moments = if rows.len() * cols.len() >= PARALLEL_PIXEL_THRESHOLD {
        rows.clone()
            .into_par_iter()
            .map(|y| Moments::row(view, y, cols.clone(), threshold))
            .reduce(Moments::default, Moments::merge)
    } else {
        rows.clone()
            .map(|y| Moments::row(view, y, cols.clone(), threshold))
            .fold(Moments::default(), Moments::merge)
    };
    if moments.w <= 0.0 {
        return Err(StackerError::DiskNotFound { area: largest.area });
    }

    let cx = moments.wx / moments.w;
    let cy = moments.wy / moments.w;
    let xx = moments.wxx / moments.w - cx * cx;
    let xy = moments.wxy / moments.w - cx * cy;
    let yy = moments.wyy / moments.w - cy * cy;
    let angle = 0.5 * (2.0 * xy).atan2(xx - yy);

    debug!(
        x = cx,
        y = cy,
        angle,
        threshold,
        window = ?(&rows, &cols),
        "Found disk"
    );
    Ok(Disk {
        x: cx as f32,
        y: cy as f32,
        angle: wrap_axis_angle(angle as f32),
        area: largest.area,
    })
}

/// Fold an axis direction into (-pi/2, pi/2]; axes have no sign.
fn wrap_axis_angle(angle: f32) -> f32 {
    let mut a = angle % PI;
    if a <= -FRAC_PI_2 {
        a += PI;
    } else if a > FRAC_PI_2 {
        a -= PI;
    }
    a
}

/// Aligns frames by the center of mass of a bright disk.
pub struct PlanetaryAligner {
    reference: Disk,
    width: usize,
    height: usize,
    config: PlanetaryAlignmentConfig,
}

impl PlanetaryAligner {
    pub fn from_reference(reference: &FrameData, config: PlanetaryAlignmentConfig) -> Result<Self> {
        let disk = find_disk(&reference.brightness())?;
        debug!(x = disk.x, y = disk.y, area = disk.area, "Reference disk");
        Ok(Self {
            reference: disk,
            width: reference.width(),
            height: reference.height(),
            config,
        })
    }

    pub fn reference_disk(&self) -> Disk {
        self.reference
    }

    /// Transform taking `disk` onto the reference disk, rotating about the
    /// frame's own center of mass.
    pub fn transform_for(&self, disk: &Disk) -> GeometricTransformer {
        let rotation = if self.config.rotation {
            wrap_axis_angle(self.reference.angle - disk.angle)
        } else {
            0.0
        };
        GeometricTransformer::new(
            self.reference.x - disk.x,
            self.reference.y - disk.y,
            disk.x,
            disk.y,
            rotation,
        )
    }
}

impl FrameAligner for PlanetaryAligner {
    fn align_frame(&self, frame: &FrameData) -> Result<AlignmentResult> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(StackerError::DimensionMismatch {
                expected_width: self.width,
                expected_height: self.height,
                width: frame.width(),
                height: frame.height(),
            });
        }
        let brightness = frame.brightness();
        let ranking = self.config.focus_measure.score(brightness.view()) as f32;
        let result = match find_disk(&brightness) {
            Ok(disk) => AlignmentResult::from_transform(&self.transform_for(&disk)),
            Err(err) => {
                debug!(%err, "No disk in frame");
                AlignmentResult::invalid()
            }
        };
        Ok(result.with_ranking(ranking))
    }
}
