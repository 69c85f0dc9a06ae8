use approx::assert_abs_diff_eq;
use astrostack_core::detection::otsu_threshold;
use astrostack_core::error::StackerError;
use astrostack_core::quality::{disk_coverage, laplacian_variance, sobel_mean, FocusMeasure};
use ndarray::Array2;

fn checkerboard(size: usize) -> Array2<f32> {
    Array2::from_shape_fn((size, size), |(y, x)| ((x + y) % 2) as f32)
}

fn ramp(size: usize) -> Array2<f32> {
    Array2::from_shape_fn((size, size), |(_, x)| x as f32 * 0.1)
}

#[test]
fn test_laplacian_variance() {
    let flat = Array2::from_elem((10, 10), 0.5f32);
    assert_abs_diff_eq!(laplacian_variance(flat.view()), 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(laplacian_variance(ramp(10).view()), 0.0, epsilon = 1e-9);
    // Every interior response is +4 or -4, in equal numbers.
    assert_abs_diff_eq!(laplacian_variance(checkerboard(10).view()), 16.0, epsilon = 1e-9);
    assert_eq!(laplacian_variance(Array2::zeros((2, 10)).view()), 0.0);
}

#[test]
fn test_sobel_mean() {
    assert_abs_diff_eq!(sobel_mean(Array2::from_elem((6, 6), 0.3f32).view()), 0.0, epsilon = 1e-12);
    // (v(x+1) - v(x-1)) weighted 1 + 2 + 1.
    assert_abs_diff_eq!(sobel_mean(ramp(8).view()), 0.8, epsilon = 1e-5);
    assert_eq!(sobel_mean(Array2::zeros((10, 2)).view()), 0.0);
}

#[test]
fn test_sharp_beats_blurry() {
    let sharp = checkerboard(16);
    let blurry = Array2::from_shape_fn((16, 16), |(y, x)| (x + y) as f32 / 30.0);
    for measure in [FocusMeasure::LaplacianVariance, FocusMeasure::Gradient] {
        let (sharp_score, blurry_score) = (measure.score(sharp.view()), measure.score(blurry.view()));
        assert!(sharp_score > blurry_score, "{measure}: {sharp_score} <= {blurry_score}");
    }
}

#[test]
fn test_otsu_threshold_separates_two_levels() {
    let data = Array2::from_shape_fn((8, 8), |(y, _)| if y < 3 { 0.8f32 } else { 0.2 });
    let threshold = otsu_threshold(data.view());
    assert!(threshold > 0.2 && threshold < 0.8, "threshold {threshold}");

    assert_eq!(otsu_threshold(Array2::from_elem((4, 4), 0.4f32).view()), 0.4);
    assert_eq!(otsu_threshold(Array2::<f32>::zeros((0, 0)).view()), 0.0);
}

#[test]
fn test_disk_coverage() {
    let mut data = Array2::<f32>::zeros((10, 10));
    data.slice_mut(ndarray::s![2..5, 4..7]).fill(1.0);
    assert_abs_diff_eq!(disk_coverage(data.view()), 9.0, epsilon = 1e-9);
    assert_abs_diff_eq!(FocusMeasure::DiskCoverage.score(data.view()), 9.0, epsilon = 1e-9);
    assert_eq!(disk_coverage(Array2::from_elem((5, 5), 0.7f32).view()), 0.0);
}

#[test]
fn test_focus_measure_names() {
    assert_eq!("Laplacian_Variance".parse::<FocusMeasure>().unwrap(), FocusMeasure::LaplacianVariance);
    assert_eq!("sobel".parse::<FocusMeasure>().unwrap(), FocusMeasure::Gradient);
    assert_eq!("disk-coverage".parse::<FocusMeasure>().unwrap(), FocusMeasure::DiskCoverage);
    assert!(matches!("bogus".parse::<FocusMeasure>(), Err(StackerError::InvalidSetting { .. })));

    for name in FocusMeasure::NAMES {
        assert_eq!(name.parse::<FocusMeasure>().unwrap().to_string(), *name);
    }
    assert_eq!(serde_json::to_string(&FocusMeasure::DiskCoverage).unwrap(), "\"disk-coverage\"");
    assert_eq!(FocusMeasure::default(), FocusMeasure::LaplacianVariance);
}
