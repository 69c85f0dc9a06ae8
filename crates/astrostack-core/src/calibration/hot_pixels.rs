use std::collections::{BTreeSet, HashMap};

use ndarray::Array2;
use rayon::prelude::*;
use tracing::info;

use crate::consts::{
    HOT_PIXEL_FRAME_FRACTION, HOT_PIXEL_MAX_FRACTION, HOT_PIXEL_NEIGHBOR_FRACTION,
    PARALLEL_FRAME_THRESHOLD,
};
use crate::error::Result;
use crate::frame::{ColorLayout, FrameData, FrameReader, InputFrame};

/// Collects hot pixel candidates over dark exposures and answers `is_hot_pixel`.
#[derive(Clone, Debug, Default)]
pub struct HotPixelIdentifier {
    candidate_counts: HashMap<(usize, usize), usize>,
    n_photos: usize,
    hot_pixels: BTreeSet<(usize, usize)>,
}

impl HotPixelIdentifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier with a known list of `(x, y)` hot pixels.
    pub fn with_hot_pixels(hot_pixels: impl IntoIterator<Item = (usize, usize)>) -> Self {
        Self {
            hot_pixels: hot_pixels.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn add_photo(&mut self, photo: &FrameData) {
        let candidates = hot_pixel_candidates(&photo.planes[0]);
        self.merge_candidates(candidates);
    }

    /// Decode and scan `frames`, in parallel when there are enough of them.
    pub fn add_photos(&mut self, reader: &dyn FrameReader, frames: &[InputFrame]) -> Result<()> {
        let scan = |frame: &InputFrame| -> Result<Vec<(usize, usize)>> {
            let photo = reader.read_frame(frame)?;
            Ok(hot_pixel_candidates(&photo.planes[0]))
        };
        let per_frame: Vec<Vec<(usize, usize)>> = if frames.len() >= PARALLEL_FRAME_THRESHOLD {
            frames.par_iter().map(scan).collect::<Result<_>>()?
        } else {
            frames.iter().map(scan).collect::<Result<_>>()?
        };
        for candidates in per_frame {
            self.merge_candidates(candidates);
        }
        Ok(())
    }

    fn merge_candidates(&mut self, candidates: Vec<(usize, usize)>) {
        for coordinates in candidates {
            *self.candidate_counts.entry(coordinates).or_insert(0) += 1;
        }
        self.n_photos += 1;
    }

    /// Mark as hot every candidate seen in more than half of the photos.
    pub fn compute_hot_pixels(&mut self) {
        let min_count = self.n_photos as f32 * HOT_PIXEL_FRAME_FRACTION;
        self.hot_pixels = self
            .candidate_counts
            .iter()
            .filter(|(_, &count)| count as f32 > min_count)
            .map(|(&coordinates, _)| coordinates)
            .collect();
        info!(
            photos = self.n_photos,
            hot_pixels = self.hot_pixels.len(),
            "Identified hot pixels"
        );
    }

    pub fn n_photos(&self) -> usize {
        self.n_photos
    }

    /// Hot pixels as `(x, y)`, sorted.
    pub fn hot_pixels(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.hot_pixels.iter().copied()
    }

    pub fn is_hot_pixel(&self, x: usize, y: usize) -> bool {
        self.hot_pixels.contains(&(x, y))
    }

    /// Replace every hot pixel with the mean of its same-color neighbors
    /// (ring 1, falling back to ring 2). Must run before debayering.
    pub fn fix_hot_pixels(&self, frame: &mut FrameData) {
        self.fix_hot_pixels_rows(frame, 0);
    }

    /// Same as [`HotPixelIdentifier::fix_hot_pixels`] for a frame holding
    /// sensor rows `y_offset..y_offset + frame.height()`.
    pub fn fix_hot_pixels_rows(&self, frame: &mut FrameData, y_offset: usize) {
        let layout = frame.layout;
        for plane in &mut frame.planes {
            let (h, w) = plane.dim();
            for &(x, y) in &self.hot_pixels {
                if x >= w || y < y_offset || y - y_offset >= h {
                    continue;
                }
                let y = y - y_offset;
                if let Some(value) = same_color_neighbor_mean(plane, layout, x, y) {
                    plane[[y, x]] = value;
                }
            }
        }
    }
}

fn same_color_neighbor_mean(plane: &Array2<f32>, layout: ColorLayout, x: usize, y: usize) -> Option<f32> {
    let (h, w) = plane.dim();
    let color_of = |x: usize, y: usize| match layout {
        ColorLayout::Bayer(pattern) => pattern.color_at(x, y),
        ColorLayout::Mono | ColorLayout::Rgb => 0,
    };
    let color = color_of(x, y);

    let mut sum = 0.0f32;
    let mut count = 0usize;
    for ring in 1..=2isize {
        for dy in -ring..=ring {
            for dx in -ring..=ring {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = x as isize + dx;
                let ny = y as isize + dy;
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                if color_of(nx, ny) == color {
                    sum += plane[[ny, nx]];
                    count += 1;
                }
            }
        }
        if count > 0 {
            return Some(sum / count as f32);
        }
    }
    None
}

/// Pixels near full scale whose 8 neighbors are all much darker.
pub fn hot_pixel_candidates(data: &Array2<f32>) -> Vec<(usize, usize)> {
    let (h, w) = data.dim();
    let mut candidates = Vec::new();
    for ((y, x), &value) in data.indexed_iter() {
        if value < HOT_PIXEL_MAX_FRACTION {
            continue;
        }
        let limit = value * HOT_PIXEL_NEIGHBOR_FRACTION;
        let mut isolated = true;
        'neighbors: for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                if (nx, ny) != (x, y) && data[[ny, nx]] > limit {
                    isolated = false;
                    break 'neighbors;
                }
            }
        }
        if isolated {
            candidates.push((x, y));
        }
    }
    candidates
}
