use ndarray::Array2;
use tracing::debug;

use super::components::connected_components;

/// Centroid of a bright cluster.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Star {
    pub x: f32,
    pub y: f32,
    /// Cluster size in pixels.
    pub size: usize,
}

impl Star {
    pub fn new(x: f32, y: f32, size: usize) -> Self {
        Self { x, y, size }
    }

    pub fn distance_squared(&self, other: &Star) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Find 8-connected clusters of pixels strictly above `threshold`.
///
/// Stars are returned ordered by descending size.
pub fn find_stars(brightness: &Array2<f32>, threshold: f32) -> Vec<Star> {
    let mask = brightness.mapv(|v| v > threshold);
    let stars: Vec<Star> = connected_components(&mask)
        .iter()
        .map(|c| {
            let (x, y) = c.centroid();
            Star::new(x, y, c.area)
        })
        .collect();
    debug!(stars = stars.len(), threshold, "Extracted stars");
    stars
}

/// Brightness value above which roughly `fraction` of the pixels lie.
pub fn threshold_for_fraction(brightness: &Array2<f32>, fraction: f32) -> f32 {
    let mut values: Vec<f32> = brightness.iter().copied().collect();
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len();
    let idx = (((1.0 - fraction.clamp(0.0, 1.0)) * n as f32) as usize).min(n - 1);
    *values.select_nth_unstable_by(idx, |a, b| a.total_cmp(b)).1
}

/// Sort stars by descending cluster size; equal sizes keep their order.
pub fn sort_by_size(stars: &mut [Star]) {
    stars.sort_by(|a, b| b.size.cmp(&a.size));
}

/// Drop every star smaller than `min_size` pixels.
pub fn keep_stars_above_size(stars: &mut Vec<Star>, min_size: usize) {
    stars.retain(|s| s.size >= min_size);
}
