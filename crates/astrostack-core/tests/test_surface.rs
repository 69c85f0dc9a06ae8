use approx::assert_abs_diff_eq;
use astrostack_core::align::ap_grid::{ap_centers, compute_local_shifts};
use astrostack_core::align::phase_correlation::measure_offset;
use astrostack_core::align::{align_surface, ShiftLookup, SurfaceAlignmentConfig};
use astrostack_core::frame::FrameData;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn noise(size: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((size, size), |_| rng.random_range(0.3..0.7))
}

/// Window of `source` of `size`×`size` starting at column `x0`, row `y0`.
fn window(source: &Array2<f32>, x0: usize, y0: usize, size: usize) -> Array2<f32> {
    Array2::from_shape_fn((size, size), |(y, x)| source[[y + y0, x + x0]])
}

#[test]
fn test_phase_correlation_finds_shift() {
    let source = noise(80, 5);
    let reference = window(&source, 8, 8, 64);
    // Content moved 3 px right and 2 px up.
    let target = window(&source, 5, 10, 64);

    let offset = measure_offset(&reference, &target).unwrap();
    assert_abs_diff_eq!(offset.dx, -3.0, epsilon = 0.5);
    assert_abs_diff_eq!(offset.dy, 2.0, epsilon = 0.5);
}

#[test]
fn test_phase_correlation_identical_patches() {
    let patch = noise(32, 9);
    let offset = measure_offset(&patch, &patch).unwrap();
    assert_abs_diff_eq!(offset.dx, 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(offset.dy, 0.0, epsilon = 1e-6);
    assert!(offset.peak > 0.9);

    assert!(measure_offset(&patch, &noise(16, 9)).is_err());
}

#[test]
fn test_ap_centers_overlap_by_half() {
    let centers = ap_centers(100, 50, 40);
    assert_eq!(centers, vec![(20, 20), (40, 20), (60, 20), (80, 20)]);
    assert!(ap_centers(10, 10, 40).is_empty());
}

#[test]
fn test_surface_alignment_measures_local_shifts() {
    let source = noise(140, 21);
    let reference = FrameData::mono(window(&source, 6, 6, 128));
    // frame(x, y) = reference(x - 2, y - 1)
    let frame = FrameData::mono(window(&source, 4, 5, 128));
    let config = SurfaceAlignmentConfig {
        ap_size: 32,
        search_radius: 8,
        min_brightness: 0.05,
        ..Default::default()
    };

    let result = align_surface(&reference, &frame, &config).unwrap();
    assert!(result.is_valid);
    assert!(result.ranking > 0.0);
    let local = result.local_shifts.as_ref().unwrap();
    assert_eq!(local.shifts().len(), 49);

    let matching = local
        .shifts()
        .iter()
        .filter(|s| s.valid_ap && s.dx == 2 && s.dy == 1)
        .count();
    assert!(matching >= 45, "only {matching} of 49 points measured (2, 1)");

    match local.calculate_shifted_coordinates(64, 64) {
        ShiftLookup::Shifted { x, y, score } => {
            assert_abs_diff_eq!(x, 66.0, epsilon = 0.5);
            assert_abs_diff_eq!(y, 65.0, epsilon = 0.5);
            assert!(score > 0.0);
        }
        other => panic!("expected a shifted lookup, got {other:?}"),
    }
}

#[test]
fn test_dark_alignment_points_are_invalid() {
    let dark = Array2::from_elem((64, 64), 0.01f32);
    let config = SurfaceAlignmentConfig {
        ap_size: 32,
        search_radius: 4,
        min_brightness: 0.05,
        ..Default::default()
    };
    let shifts = compute_local_shifts(&dark, &dark, &config).unwrap();
    assert!(!shifts.is_empty());
    assert!(shifts.iter().all(|s| !s.valid_ap));

    assert!(compute_local_shifts(&dark, &Array2::zeros((32, 64)), &config).is_err());
}
