use ndarray::Array2;

use crate::consts::EPSILON;
use crate::frame::{ColorLayout, FrameData};

use super::CalibrationFrame;

/// Flat-field gain map: each pixel is scaled up to its color's brightest level.
#[derive(Clone, Debug)]
pub struct FlatFrame {
    gains: Array2<f32>,
}

impl FlatFrame {
    /// Derive gains from a flat exposure.
    ///
    /// The gain is `max(color) / value`, smoothed over a 2x2 window to even
    /// out the color filter pattern.
    pub fn from_frame(flat: &FrameData) -> Self {
        let data = match flat.layout {
            ColorLayout::Rgb => flat.brightness(),
            ColorLayout::Mono | ColorLayout::Bayer(_) => flat.planes[0].clone(),
        };
        let (h, w) = data.dim();

        let mut max_values = [EPSILON; 3];
        for ((y, x), &v) in data.indexed_iter() {
            let color = flat.color_at(x, y) as usize;
            max_values[color] = max_values[color].max(v);
        }

        let raw_gains = Array2::from_shape_fn((h, w), |(y, x)| {
            let v = data[[y, x]];
            if v > EPSILON {
                max_values[flat.color_at(x, y) as usize] / v
            } else {
                1.0
            }
        });

        let mut gains = raw_gains.clone();
        if h >= 2 && w >= 2 {
            for y in 0..h - 1 {
                for x in 0..w - 1 {
                    gains[[y, x]] = 0.25
                        * (raw_gains[[y, x]]
                            + raw_gains[[y, x + 1]]
                            + raw_gains[[y + 1, x]]
                            + raw_gains[[y + 1, x + 1]]);
                }
            }
            for y in 0..h {
                gains[[y, w - 1]] = gains[[y, w - 2]];
            }
            for x in 0..w {
                gains[[h - 1, x]] = gains[[h - 2, x]];
            }
        }

        Self { gains }
    }

    pub fn gain(&self, x: usize, y: usize) -> f32 {
        self.gains[[y, x]]
    }
}

impl CalibrationFrame for FlatFrame {
    fn width(&self) -> usize {
        self.gains.ncols()
    }

    fn height(&self) -> usize {
        self.gains.nrows()
    }

    fn get_updated_pixel_value(&self, value: f32, x: usize, y: usize) -> f32 {
        value * self.gains[[y, x]]
    }
}
