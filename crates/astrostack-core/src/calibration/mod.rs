pub mod dark;
pub mod flat;
pub mod hot_pixels;
pub mod photo;

pub use dark::DarkFrame;
pub use flat::FlatFrame;
pub use hot_pixels::HotPixelIdentifier;
pub use photo::{CalibratedPhoto, CalibrationSetup};

use crate::error::{Result, StackerError};
use crate::frame::FrameData;

/// Per-pixel correction derived from a calibration exposure.
pub trait CalibrationFrame: Send + Sync {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    /// Planes the correction carries, `None` when one plane serves every layout.
    fn n_planes(&self) -> Option<usize> {
        None
    }

    /// Corrected value of a raw sample at `(x, y)`.
    fn get_updated_pixel_value(&self, value: f32, x: usize, y: usize) -> f32;

    /// Corrected value of a sample of plane `plane`.
    fn get_updated_plane_value(&self, value: f32, _plane: usize, x: usize, y: usize) -> f32 {
        self.get_updated_pixel_value(value, x, y)
    }

    /// Correct every plane of `frame` in place, clamping to [0, 1].
    fn apply_calibration(&self, frame: &mut FrameData) -> Result<()> {
        if frame.height() != self.height() {
            return Err(dimension_mismatch(self, frame));
        }
        self.apply_calibration_rows(frame, 0)
    }

    /// Same as [`CalibrationFrame::apply_calibration`] for a frame holding
    /// sensor rows `y_offset..y_offset + frame.height()`.
    fn apply_calibration_rows(&self, frame: &mut FrameData, y_offset: usize) -> Result<()> {
        if frame.width() != self.width() || y_offset + frame.height() > self.height() {
            return Err(dimension_mismatch(self, frame));
        }
        if let Some(n_planes) = self.n_planes() {
            if n_planes != frame.planes.len() {
                return Err(StackerError::UnsupportedColorLayout(format!(
                    "calibration frame has {n_planes} planes, the frame has {}",
                    frame.planes.len()
                )));
            }
        }
        for (index, plane) in frame.planes.iter_mut().enumerate() {
            for ((y, x), v) in plane.indexed_iter_mut() {
                *v = self
                    .get_updated_plane_value(*v, index, x, y + y_offset)
                    .clamp(0.0, 1.0);
            }
        }
        Ok(())
    }
}

fn dimension_mismatch<C: CalibrationFrame + ?Sized>(calibration: &C, frame: &FrameData) -> StackerError {
    StackerError::DimensionMismatch {
        expected_width: calibration.width(),
        expected_height: calibration.height(),
        width: frame.width(),
        height: frame.height(),
    }
}
