use ndarray::ArrayView2;

use crate::consts::OTSU_HISTOGRAM_BINS;

/// Otsu's threshold: the level that best separates the histogram into two
/// classes (largest between-class variance).
///
/// The histogram spans the data's own min..max, so dim frames keep full
/// resolution. Constant data returns its value.
pub fn otsu_threshold(data: ArrayView2<'_, f32>) -> f32 {
    let (min, max) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if max <= min {
        return if min.is_finite() { min } else { 0.0 };
    }

    let bins = OTSU_HISTOGRAM_BINS;
    let scale = (bins - 1) as f32 / (max - min);
    let mut histogram = vec![0u64; bins];
    for &v in data {
        histogram[(((v - min) * scale) as usize).min(bins - 1)] += 1;
    }

    let total = data.len() as f64;
    let sum_all: f64 = histogram.iter().enumerate().map(|(i, &n)| i as f64 * n as f64).sum();
    let mut weight_low = 0.0f64;
    let mut sum_low = 0.0f64;
    let mut best = (0.0f64, 0usize);
    for (i, &count) in histogram.iter().enumerate() {
        weight_low += count as f64;
        let weight_high = total - weight_low;
        if weight_low == 0.0 {
            continue;
        }
        if weight_high == 0.0 {
            break;
        }
        sum_low += i as f64 * count as f64;
        let mean_low = sum_low / weight_low;
        let mean_high = (sum_all - sum_low) / weight_high;
        let between = weight_low * weight_high * (mean_low - mean_high).powi(2);
        if between > best.0 {
            best = (between, i);
        }
    }

    min + (best.1 as f32 + 0.5) / scale
}
