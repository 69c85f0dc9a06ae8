use ndarray::ArrayView2;

/// Mean Sobel gradient magnitude over the interior of `data`.
pub fn sobel_mean(data: ArrayView2<'_, f32>) -> f64 {
    if data.nrows() < 3 || data.ncols() < 3 {
        return 0.0;
    }
    let (sum, n) = data.windows((3, 3)).into_iter().fold((0.0f64, 0usize), |(sum, n), w| {
        let p = |r: usize, c: usize| w[[r, c]] as f64;
        let gx = p(0, 2) + 2.0 * p(1, 2) + p(2, 2) - p(0, 0) - 2.0 * p(1, 0) - p(2, 0);
        let gy = p(2, 0) + 2.0 * p(2, 1) + p(2, 2) - p(0, 0) - 2.0 * p(0, 1) - p(0, 2);
        (sum + gx.hypot(gy), n + 1)
    });
    sum / n as f64
}
