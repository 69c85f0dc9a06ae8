#[allow(dead_code)]
mod common;

use approx::assert_abs_diff_eq;
use astrostack_core::align::{
    GeometricTransformer, PlateSolver, PlateSolverConfig, StarAligner, StarDetectionConfig,
};
use astrostack_core::detection::Star;
use astrostack_core::frame::FrameData;

use common::{random_stars, render_stars};

const WIDTH: usize = 1000;
const HEIGHT: usize = 800;

fn in_bounds(x: f32, y: f32) -> bool {
    x >= 0.0 && y >= 0.0 && x < WIDTH as f32 && y < HEIGHT as f32
}

#[test]
fn test_plate_solve_recovers_rotation_and_shift() {
    let reference = random_stars(7, 40, WIDTH as f32, HEIGHT as f32, 20.0);
    let truth = GeometricTransformer::new(12.5, -7.25, 500.0, 400.0, 0.05);

    let candidates: Vec<Star> = reference
        .iter()
        .filter_map(|s| {
            let (x, y) = truth.to_shifted(s.x, s.y);
            in_bounds(x, y).then(|| Star::new(x, y, s.size))
        })
        .collect();
    assert!(candidates.len() >= 20);

    let solver = PlateSolver::new(reference.clone(), WIDTH, HEIGHT, PlateSolverConfig::default());
    assert!(solver.n_asterisms() > 0);

    let result = solver.plate_solve(&candidates);
    assert!(result.is_valid);
    assert_abs_diff_eq!(result.rotation, 0.05, epsilon = 0.01);
    assert_eq!(result.zoom, 1.0);

    // Rotation centers depend on the accepted hypothesis; compare mapped points.
    let transform = result.transformer();
    for candidate in &candidates {
        let (x, y) = transform.to_reference(candidate.x, candidate.y);
        let (ex, ey) = truth.to_reference(candidate.x, candidate.y);
        assert_abs_diff_eq!(x, ex, epsilon = 0.5);
        assert_abs_diff_eq!(y, ey, epsilon = 0.5);
    }
}

#[test]
fn test_plate_solve_with_variable_zoom() {
    let reference = random_stars(7, 40, WIDTH as f32, HEIGHT as f32, 20.0);
    let truth = GeometricTransformer::new(-4.0, 6.5, 500.0, 400.0, -0.03).with_zoom(1.1);

    let candidates: Vec<Star> = reference
        .iter()
        .filter_map(|s| {
            let (x, y) = truth.to_shifted(s.x, s.y);
            in_bounds(x, y).then(|| Star::new(x, y, s.size))
        })
        .collect();
    assert!(candidates.len() >= 20);

    let config = PlateSolverConfig {
        variable_zoom: true,
        ..Default::default()
    };
    let solver = PlateSolver::new(reference, WIDTH, HEIGHT, config);
    let result = solver.plate_solve(&candidates);
    assert!(result.is_valid);
    assert_abs_diff_eq!(result.zoom, 1.1, epsilon = 0.005);
    assert_abs_diff_eq!(result.rotation, -0.03, epsilon = 0.01);

    let transform = result.transformer();
    for candidate in &candidates {
        let (x, y) = transform.to_reference(candidate.x, candidate.y);
        let (ex, ey) = truth.to_reference(candidate.x, candidate.y);
        assert_abs_diff_eq!(x, ex, epsilon = 0.5);
        assert_abs_diff_eq!(y, ey, epsilon = 0.5);
    }
}

#[test]
fn test_plate_solve_unrelated_field_is_invalid() {
    let reference = random_stars(7, 40, WIDTH as f32, HEIGHT as f32, 20.0);
    let unrelated = random_stars(9001, 40, WIDTH as f32, HEIGHT as f32, 20.0);
    let solver = PlateSolver::new(reference, WIDTH, HEIGHT, PlateSolverConfig::default());

    let result = solver.plate_solve(&unrelated);
    assert!(!result.is_valid);
}

#[test]
fn test_plate_solve_too_few_candidates_is_invalid() {
    let reference = random_stars(3, 30, WIDTH as f32, HEIGHT as f32, 20.0);
    let solver = PlateSolver::new(reference.clone(), WIDTH, HEIGHT, PlateSolverConfig::default());

    // Five exact matches can never reach the six paired stars required.
    let result = solver.plate_solve(&reference[..5]);
    assert!(!result.is_valid);
}

#[test]
fn test_star_aligner_on_rendered_frames() {
    let reference_stars = random_stars(11, 40, WIDTH as f32, HEIGHT as f32, 30.0);
    let reference = FrameData::mono(render_stars(&reference_stars, WIDTH, HEIGHT, 4));

    let shifted_stars: Vec<Star> = reference_stars
        .iter()
        .map(|s| Star::new(s.x.round() - 7.0, s.y.round() + 5.0, s.size))
        .collect();
    let shifted = FrameData::mono(render_stars(&shifted_stars, WIDTH, HEIGHT, 4));

    let detection = StarDetectionConfig {
        pixel_fraction: 0.002,
        candidate_size_factor: 1.0,
        ..Default::default()
    };
    let aligner =
        StarAligner::from_reference(&reference, detection, PlateSolverConfig::default()).unwrap();
    assert!(aligner.solver().reference_stars().len() >= 20);

    let result = aligner.align(&shifted);
    assert!(result.is_valid);
    assert!(result.ranking > 0.0);
    assert_abs_diff_eq!(result.rotation, 0.0, epsilon = 1e-3);

    let (x, y) = result.transformer().to_reference(100.0, 100.0);
    assert_abs_diff_eq!(x, 107.0, epsilon = 0.1);
    assert_abs_diff_eq!(y, 95.0, epsilon = 0.1);
}

#[test]
fn test_star_aligner_needs_four_stars() {
    let frame = FrameData::mono(ndarray::Array2::from_elem((50, 50), 0.1));
    let result = StarAligner::from_reference(
        &frame,
        StarDetectionConfig::default(),
        PlateSolverConfig::default(),
    );
    assert!(result.is_err());
}
