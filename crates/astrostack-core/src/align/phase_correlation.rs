use ndarray::{Array2, Axis};
use num_complex::Complex;
use rustfft::FftPlanner;

use crate::error::{Result, StackerError};

/// Translation of a target patch relative to a reference patch.
///
/// Shifting the target by `(dx, dy)` lines it up with the reference.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PatchOffset {
    pub dx: f64,
    pub dy: f64,
    /// Height of the correlation peak, 1.0 for identical patches.
    pub peak: f64,
}

/// Measure the offset between two equally sized patches with FFT phase correlation.
pub fn measure_offset(reference: &Array2<f32>, target: &Array2<f32>) -> Result<PatchOffset> {
    let (h, w) = reference.dim();
    if target.dim() != (h, w) {
        let (th, tw) = target.dim();
        return Err(StackerError::DimensionMismatch {
            expected_width: w,
            expected_height: h,
            width: tw,
            height: th,
        });
    }

    let mut planner = FftPlanner::new();
    let reference_fft = fft2d(&hann_windowed(reference), &mut planner, false);
    let target_fft = fft2d(&hann_windowed(target), &mut planner, false);

    let mut cross = Array2::<Complex<f64>>::zeros((h, w));
    ndarray::Zip::from(&mut cross)
        .and(&reference_fft)
        .and(&target_fft)
        .for_each(|out, &r, &t| {
            let c = r * t.conj();
            let mag = c.norm();
            *out = if mag > 1e-12 { c / mag } else { Complex::new(0.0, 0.0) };
        });

    let surface = fft2d_complex(cross, &mut planner, true).mapv(|c| c.re / (h * w) as f64);

    let (mut peak_row, mut peak_col, mut peak) = (0, 0, f64::NEG_INFINITY);
    for ((row, col), &v) in surface.indexed_iter() {
        if v > peak {
            peak = v;
            peak_row = row;
            peak_col = col;
        }
    }

    let wrap = |p: usize, n: usize| if p > n / 2 { p as f64 - n as f64 } else { p as f64 };
    let (sub_row, sub_col) = parabolic_refinement(&surface, peak_row, peak_col);

    Ok(PatchOffset {
        dx: wrap(peak_col, w) + sub_col,
        dy: wrap(peak_row, h) + sub_row,
        peak,
    })
}

/// Mean-subtracted patch under a Hann window.
fn hann_windowed(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    let tau = std::f64::consts::TAU;
    let mean = data.mean().unwrap_or(0.0);
    let mut out = data.clone();
    for ((row, col), v) in out.indexed_iter_mut() {
        let wy = 0.5 * (1.0 - (tau * row as f64 / h as f64).cos());
        let wx = 0.5 * (1.0 - (tau * col as f64 / w as f64).cos());
        *v = (*v - mean) * (wy * wx) as f32;
    }
    out
}

fn fft2d(data: &Array2<f32>, planner: &mut FftPlanner<f64>, inverse: bool) -> Array2<Complex<f64>> {
    fft2d_complex(data.mapv(|v| Complex::new(v as f64, 0.0)), planner, inverse)
}

/// In-place FFT along both axes.
fn fft2d_complex(
    mut data: Array2<Complex<f64>>,
    planner: &mut FftPlanner<f64>,
    inverse: bool,
) -> Array2<Complex<f64>> {
    for axis in [Axis(1), Axis(0)] {
        let len = data.len_of(axis);
        let fft = if inverse {
            planner.plan_fft_inverse(len)
        } else {
            planner.plan_fft_forward(len)
        };
        let mut buffer = vec![Complex::new(0.0, 0.0); len];
        for mut lane in data.lanes_mut(axis) {
            for (b, v) in buffer.iter_mut().zip(lane.iter()) {
                *b = *v;
            }
            fft.process(&mut buffer);
            for (v, b) in lane.iter_mut().zip(buffer.iter()) {
                *v = *b;
            }
        }
    }
    data
}

/// Fractional peak position from 1D parabola fits through the 3x3 neighborhood.
fn parabolic_refinement(surface: &Array2<f64>, row: usize, col: usize) -> (f64, f64) {
    let (h, w) = surface.dim();
    if row == 0 || row + 1 >= h || col == 0 || col + 1 >= w {
        return (0.0, 0.0);
    }
    let fit = |prev: f64, curr: f64, next: f64| {
        let denom = prev - 2.0 * curr + next;
        if denom.abs() > 1e-12 {
            ((prev - next) / (2.0 * denom)).clamp(-0.5, 0.5)
        } else {
            0.0
        }
    };
    (
        fit(surface[[row - 1, col]], surface[[row, col]], surface[[row + 1, col]]),
        fit(surface[[row, col - 1]], surface[[row, col]], surface[[row, col + 1]]),
    )
}
