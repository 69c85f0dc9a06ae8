use ndarray::Array2;

use crate::consts::EMPTY_PIXEL;

/// Stacked result: one double-precision plane per color.
///
/// Pixels no frame contributed to hold [`EMPTY_PIXEL`] until they are filled.
#[derive(Clone, Debug, PartialEq)]
pub struct StackedImage {
    pub width: usize,
    pub height: usize,
    pub channels: Vec<Array2<f64>>,
}

impl StackedImage {
    /// An image with every pixel empty.
    pub fn empty(width: usize, height: usize, n_colors: usize) -> Self {
        Self {
            width,
            height,
            channels: vec![Array2::from_elem((height, width), EMPTY_PIXEL as f64); n_colors],
        }
    }

    pub fn n_colors(&self) -> usize {
        self.channels.len()
    }

    /// Value at (x, y), `None` for an empty pixel.
    pub fn value(&self, x: usize, y: usize, color: usize) -> Option<f64> {
        let v = self.channels[color][[y, x]];
        (v != EMPTY_PIXEL as f64).then_some(v)
    }

    pub fn count_empty(&self) -> usize {
        self.channels
            .iter()
            .map(|c| c.iter().filter(|&&v| v == EMPTY_PIXEL as f64).count())
            .sum()
    }
}
