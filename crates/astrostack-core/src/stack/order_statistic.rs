use crate::consts::EMPTY_PIXEL;

use super::config::{CutOffParams, KappaSigmaParams, QuantileParams, StackingAlgorithm};

const EMPTY: f64 = EMPTY_PIXEL as f64;

/// Combine one pixel's samples across all frames of a band.
///
/// `values` and `scores` are parallel per-frame slices and are reordered in
/// place. Samples equal to [`EMPTY_PIXEL`] are moved to the back and ignored;
/// `scores` may be empty for unweighted algorithms. Returns [`EMPTY_PIXEL`]
/// when nothing survives.
pub fn reduce_pixel(algorithm: &StackingAlgorithm, values: &mut [f32], scores: &mut [f32]) -> f64 {
    let weighted = scores.len() == values.len();
    let n = partition_live(values, if weighted { Some(&mut *scores) } else { None });
    if n == 0 {
        return EMPTY;
    }
    let live = &mut values[..n];

    match algorithm {
        StackingAlgorithm::Median => median(live),
        StackingAlgorithm::KappaSigmaMean(params) => {
            let kept = kappa_sigma_clip(live, params);
            if kept == 0 {
                EMPTY
            } else {
                mean(&live[..kept])
            }
        }
        StackingAlgorithm::KappaSigmaMedian(params) => {
            let kept = kappa_sigma_clip(live, params);
            if kept == 0 {
                EMPTY
            } else {
                median(&mut live[..kept])
            }
        }
        StackingAlgorithm::CutOffAverage(params) => cut_off_average(live, params),
        StackingAlgorithm::Quantile(params) => quantile(live, params),
        StackingAlgorithm::WeightedMedian if weighted => weighted_median(live, &mut scores[..n]),
        StackingAlgorithm::WeightedBestScore if weighted => best_score(live, &scores[..n]),
        StackingAlgorithm::WeightedMedian | StackingAlgorithm::WeightedBestScore => median(live),
        StackingAlgorithm::Average => mean(live),
        StackingAlgorithm::Maximum => live.iter().copied().fold(f32::MIN, f32::max) as f64,
        StackingAlgorithm::Minimum => live.iter().copied().fold(f32::MAX, f32::min) as f64,
        StackingAlgorithm::Rms => std_dev(live, mean(live)),
        StackingAlgorithm::Center(params) => {
            let center = params.central_value;
            live.iter()
                .copied()
                .min_by(|a, b| (a - center).abs().total_cmp(&(b - center).abs()).then(a.total_cmp(b)))
                .map_or(EMPTY, f64::from)
        }
    }
}

/// Move live samples (and their scores) to the front, returning their count.
fn partition_live(values: &mut [f32], mut scores: Option<&mut [f32]>) -> usize {
    let mut live = 0;
    for i in 0..values.len() {
        if values[i] != EMPTY_PIXEL {
            values.swap(live, i);
            if let Some(scores) = scores.as_deref_mut() {
                scores.swap(live, i);
            }
            live += 1;
        }
    }
    live
}

fn mean(values: &[f32]) -> f64 {
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

/// Population standard deviation around `mean`.
fn std_dev(values: &[f32], mean: f64) -> f64 {
    let var = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    var.sqrt()
}

/// Median of a non-empty slice; even counts average the middle pair.
fn median(values: &mut [f32]) -> f64 {
    let n = values.len();
    let mid = n / 2;
    let upper = *values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1 as f64;
    if n % 2 == 1 {
        upper
    } else {
        let lower = values[..mid].iter().copied().fold(f32::MIN, f32::max) as f64;
        (lower + upper) / 2.0
    }
}

/// Clip in place, moving survivors to the front. Returns the survivor count.
fn kappa_sigma_clip(values: &mut [f32], params: &KappaSigmaParams) -> usize {
    let mut kept = values.len();
    for _ in 0..params.iterations {
        if kept == 0 {
            break;
        }
        let survivors = &values[..kept];
        let m = mean(survivors);
        let sigma = std_dev(survivors, m);
        if sigma == 0.0 {
            break;
        }
        let limit = params.kappa as f64 * sigma;
        let mut next = 0;
        for i in 0..kept {
            if (values[i] as f64 - m).abs() <= limit {
                values.swap(next, i);
                next += 1;
            }
        }
        if next == kept {
            break;
        }
        kept = next;
    }
    kept
}

fn cut_off_average(values: &mut [f32], params: &CutOffParams) -> f64 {
    let n = values.len();
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let cut = (params.tail_fraction as f64 * n as f64).round() as usize;
    if 2 * cut >= n {
        return values[n / 2] as f64;
    }
    mean(&values[cut..n - cut])
}

fn quantile(values: &mut [f32], params: &QuantileParams) -> f64 {
    let n = values.len();
    let index = ((params.fraction as f64 * (n - 1) as f64).round() as usize).min(n - 1);
    *values.select_nth_unstable_by(index, |a, b| a.total_cmp(b)).1 as f64
}

/// First value, in ascending order, at which the cumulative score reaches
/// half of the total.
fn weighted_median(values: &mut [f32], scores: &mut [f32]) -> f64 {
    let mut pairs: Vec<(f32, f32)> = values.iter().copied().zip(scores.iter().copied()).collect();
    pairs.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

    let total: f64 = pairs.iter().map(|&(_, s)| s.max(0.0) as f64).sum();
    if total <= 0.0 {
        return median(values);
    }
    let half = total / 2.0;
    let mut cumulative = 0.0;
    for &(value, score) in &pairs {
        cumulative += score.max(0.0) as f64;
        if cumulative >= half {
            return value as f64;
        }
    }
    pairs[pairs.len() - 1].0 as f64
}

/// Value of the highest-scored sample; the earliest wins ties.
fn best_score(values: &[f32], scores: &[f32]) -> f64 {
    let mut best = 0;
    for i in 1..values.len() {
        if scores[i] > scores[best] {
            best = i;
        }
    }
    values[best] as f64
}
