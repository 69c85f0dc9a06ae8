use ndarray::ArrayView2;

/// Variance of the 4-neighbor Laplacian over the interior of `data`.
///
/// Flat and linearly shaded regions score zero; fine detail scores high.
/// Planes smaller than 3x3 score zero.
pub fn laplacian_variance(data: ArrayView2<'_, f32>) -> f64 {
    if data.nrows() < 3 || data.ncols() < 3 {
        return 0.0;
    }
    let (sum, sum_sq, n) = data
        .windows((3, 3))
        .into_iter()
        .fold((0.0f64, 0.0f64, 0usize), |(sum, sum_sq, n), w| {
            let response = (w[[0, 1]] + w[[2, 1]] + w[[1, 0]] + w[[1, 2]]) as f64 - 4.0 * w[[1, 1]] as f64;
            (sum + response, sum_sq + response * response, n + 1)
        });
    let mean = sum / n as f64;
    (sum_sq / n as f64 - mean * mean).max(0.0)
}
