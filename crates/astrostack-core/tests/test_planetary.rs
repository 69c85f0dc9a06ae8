use approx::assert_abs_diff_eq;
use astrostack_core::align::{find_disk, FrameAligner, PlanetaryAligner, PlanetaryAlignmentConfig};
use astrostack_core::error::StackerError;
use astrostack_core::frame::FrameData;
use astrostack_core::quality::FocusMeasure;
use ndarray::Array2;

const WIDTH: usize = 200;
const HEIGHT: usize = 180;

/// Elliptical disk with semi-axes `a` (along `angle`) and `b`, supersampled
/// 4x4 so its edge is antialiased.
fn ellipse(cx: f32, cy: f32, a: f32, b: f32, angle: f32) -> FrameData {
    let (sin, cos) = angle.sin_cos();
    FrameData::mono(Array2::from_shape_fn((HEIGHT, WIDTH), |(y, x)| {
        let mut inside = 0;
        for sy in 0..4 {
            for sx in 0..4 {
                let dx = x as f32 + (sx as f32 + 0.5) / 4.0 - 0.5 - cx;
                let dy = y as f32 + (sy as f32 + 0.5) / 4.0 - 0.5 - cy;
                let u = dx * cos + dy * sin;
                let v = -dx * sin + dy * cos;
                if (u / a).powi(2) + (v / b).powi(2) <= 1.0 {
                    inside += 1;
                }
            }
        }
        0.02 + 0.78 * inside as f32 / 16.0
    }))
}

#[test]
fn test_find_disk_center_and_axis() {
    let disk = find_disk(&ellipse(100.0, 90.0, 30.0, 15.0, 0.2).planes[0]).unwrap();
    assert_abs_diff_eq!(disk.x, 100.0, epsilon = 0.1);
    assert_abs_diff_eq!(disk.y, 90.0, epsilon = 0.1);
    assert_abs_diff_eq!(disk.angle, 0.2, epsilon = 0.02);
    assert!(disk.area > 1300, "area {}", disk.area);

    // Axes have no direction: an ellipse at 1.5 + pi/2 reads as 1.5 - pi/2.
    let steep = find_disk(&ellipse(100.0, 90.0, 30.0, 15.0, 1.5 + std::f32::consts::FRAC_PI_2).planes[0]).unwrap();
    assert_abs_diff_eq!(steep.angle, 1.5 - std::f32::consts::FRAC_PI_2, epsilon = 0.02);
}

#[test]
fn test_planetary_alignment_with_rotation() {
    let reference = ellipse(100.0, 90.0, 30.0, 15.0, 0.2);
    let frame = ellipse(108.0, 84.0, 30.0, 15.0, 0.35);
    let aligner = PlanetaryAligner::from_reference(&reference, PlanetaryAlignmentConfig::default()).unwrap();

    let result = aligner.align_frame(&frame).unwrap();
    assert!(result.is_valid);
    assert!(result.ranking > 0.0);
    assert_abs_diff_eq!(result.rotation, -0.15, epsilon = 0.02);

    let transformer = result.transformer();
    let (x, y) = transformer.to_reference(108.0, 84.0);
    assert_abs_diff_eq!(x, 100.0, epsilon = 0.15);
    assert_abs_diff_eq!(y, 90.0, epsilon = 0.15);

    // The tip of the frame's major axis lands on the reference's.
    let (x, y) = transformer.to_reference(108.0 + 30.0 * 0.35f32.cos(), 84.0 + 30.0 * 0.35f32.sin());
    assert_abs_diff_eq!(x, 100.0 + 30.0 * 0.2f32.cos(), epsilon = 0.8);
    assert_abs_diff_eq!(y, 90.0 + 30.0 * 0.2f32.sin(), epsilon = 0.8);
}

#[test]
fn test_planetary_alignment_without_rotation() {
    let reference = ellipse(100.0, 90.0, 30.0, 15.0, 0.2);
    let frame = ellipse(92.5, 97.0, 30.0, 15.0, 0.5);
    let config = PlanetaryAlignmentConfig {
        rotation: false,
        focus_measure: FocusMeasure::DiskCoverage,
    };
    let aligner = PlanetaryAligner::from_reference(&reference, config).unwrap();

    let result = aligner.align_frame(&frame).unwrap();
    assert!(result.is_valid);
    assert_eq!(result.rotation, 0.0);
    assert_abs_diff_eq!(result.shift_x, 7.5, epsilon = 0.15);
    assert_abs_diff_eq!(result.shift_y, -7.0, epsilon = 0.15);
    // Roughly pi * 30 * 15 of 200 * 180 pixels.
    assert_abs_diff_eq!(result.ranking, 3.93, epsilon = 0.3);
}

#[test]
fn test_planetary_frames_without_disk() {
    let black = FrameData::mono(Array2::zeros((HEIGHT, WIDTH)));
    assert!(matches!(
        PlanetaryAligner::from_reference(&black, PlanetaryAlignmentConfig::default()),
        Err(StackerError::DiskNotFound { .. })
    ));

    let aligner =
        PlanetaryAligner::from_reference(&ellipse(100.0, 90.0, 30.0, 15.0, 0.0), PlanetaryAlignmentConfig::default())
            .unwrap();
    assert_eq!(aligner.reference_disk().area, find_disk(&ellipse(100.0, 90.0, 30.0, 15.0, 0.0).planes[0]).unwrap().area);

    let mut speck = Array2::<f32>::zeros((HEIGHT, WIDTH));
    speck[[50, 50]] = 0.9;
    speck[[50, 51]] = 0.9;
    let result = aligner.align_frame(&FrameData::mono(speck)).unwrap();
    assert!(!result.is_valid);

    let small = FrameData::mono(Array2::zeros((HEIGHT / 2, WIDTH)));
    assert!(matches!(aligner.align_frame(&small), Err(StackerError::DimensionMismatch { .. })));
}
