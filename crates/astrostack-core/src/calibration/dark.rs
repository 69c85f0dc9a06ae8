use ndarray::Array2;

use crate::frame::FrameData;

use super::CalibrationFrame;

/// Dark frame, subtracted from every exposure plane by plane.
///
/// The dark must have the layout of the lights it corrects: one plane for
/// mono and raw mosaics, three for RGB.
#[derive(Clone, Debug)]
pub struct DarkFrame {
    planes: Vec<Array2<f32>>,
}

impl DarkFrame {
    pub fn from_frame(dark: &FrameData) -> Self {
        Self {
            planes: dark.planes.clone(),
        }
    }
}

impl CalibrationFrame for DarkFrame {
    fn width(&self) -> usize {
        self.planes[0].ncols()
    }

    fn height(&self) -> usize {
        self.planes[0].nrows()
    }

    fn n_planes(&self) -> Option<usize> {
        Some(self.planes.len())
    }

    fn get_updated_pixel_value(&self, value: f32, x: usize, y: usize) -> f32 {
        self.get_updated_plane_value(value, 0, x, y)
    }

    fn get_updated_plane_value(&self, value: f32, plane: usize, x: usize, y: usize) -> f32 {
        match self.planes.get(plane) {
            Some(dark) => (value - dark[[y, x]]).max(0.0),
            None => value,
        }
    }
}
