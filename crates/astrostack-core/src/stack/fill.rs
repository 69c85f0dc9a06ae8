use ndarray::{Array2, Zip};

use crate::consts::{EMPTY_PIXEL, PARALLEL_PIXEL_THRESHOLD};

use super::output::StackedImage;

const EMPTY: f64 = EMPTY_PIXEL as f64;

/// Replace every empty pixel with the mean of its non-empty 3×3 neighbors.
///
/// Neighbors are read from a snapshot, so filled values never feed other
/// fills. Pixels whose whole neighborhood is empty stay empty. Returns the
/// number of pixels filled.
pub fn fill_empty_pixels(image: &mut StackedImage) -> usize {
    image.channels.iter_mut().map(fill_channel).sum()
}

fn fill_channel(channel: &mut Array2<f64>) -> usize {
    if !channel.iter().any(|&v| v == EMPTY) {
        return 0;
    }
    let snapshot = channel.clone();
    let fill = |(y, x): (usize, usize), v: &mut f64| {
        if *v == EMPTY {
            if let Some(mean) = neighbor_mean(&snapshot, x, y) {
                *v = mean;
            }
        }
    };
    if channel.len() >= PARALLEL_PIXEL_THRESHOLD {
        Zip::indexed(&mut *channel).par_for_each(fill);
    } else {
        Zip::indexed(&mut *channel).for_each(fill);
    }

    Zip::from(&snapshot)
        .and(&*channel)
        .fold(0, |n, &before, &after| n + usize::from(before == EMPTY && after != EMPTY))
}

fn neighbor_mean(snapshot: &Array2<f64>, x: usize, y: usize) -> Option<f64> {
    let (h, w) = snapshot.dim();
    let mut sum = 0.0;
    let mut count = 0usize;
    for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
            let v = snapshot[[ny, nx]];
            if (nx, ny) != (x, y) && v != EMPTY {
                sum += v;
                count += 1;
            }
        }
    }
    (count > 0).then(|| sum / count as f64)
}
