#[allow(dead_code)]
mod common;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_abs_diff_eq;
use astrostack_core::align::{AlignmentResult, GeometricTransformer};
use astrostack_core::error::StackerError;
use astrostack_core::frame::{BayerPattern, FrameData, InputFrame};
use astrostack_core::progress::{NoOpReporter, ProgressReporter};
use astrostack_core::stack::{
    default_master_algorithm, fill_empty_pixels, reduce_pixel, select_frames, stack_calibration_frames,
    CenterParams, CutOffParams, FrameSelection, KappaSigmaParams, QuantileParams, StackedImage, Stacker,
    StackingAlgorithm, StackingConfig, StreamingReducer, StreamingShard,
};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::{make_frame, pattern, MemoryReader};

const W: usize = 9;
const H: usize = 6;
const EMPTY: f32 = -1.0;

fn config(algorithm: StackingAlgorithm) -> StackingConfig {
    StackingConfig {
        algorithm,
        n_cpu: 3,
        ..Default::default()
    }
}

fn every_algorithm() -> Vec<StackingAlgorithm> {
    StackingAlgorithm::NAMES
        .iter()
        .map(|name| StackingAlgorithm::from_name(name, &BTreeMap::new()).unwrap())
        .collect()
}

/// Frames of noisy values around `pattern`, ranked by index.
fn noisy_sequence(n: usize, seed: u64) -> (MemoryReader, Vec<(InputFrame, AlignmentResult)>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut reader = MemoryReader::new();
    let mut frames = Vec::new();
    for i in 0..n {
        let noise: Vec<f32> = (0..W * H).map(|_| rng.random_range(-0.1..0.1)).collect();
        let frame = InputFrame::video("sequence.ser", i as i32);
        reader.insert(frame.clone(), make_frame(W, H, |x, y| pattern(x, y) + noise[y * W + x]));
        frames.push((frame, AlignmentResult::identity().with_ranking(1.0 + i as f32)));
    }
    (reader, frames)
}

fn stack_with(
    algorithm: StackingAlgorithm,
    reader: &MemoryReader,
    frames: &[(InputFrame, AlignmentResult)],
    memory_limit_bytes: Option<usize>,
) -> StackedImage {
    let mut stacker = Stacker::new(config(algorithm), reader, W, H, 1).with_memory_limit_bytes(memory_limit_bytes);
    for (frame, alignment) in frames {
        stacker.add_frame(frame.clone(), alignment.clone());
    }
    stacker.stack(&NoOpReporter).unwrap()
}

#[test]
fn test_reduce_pixel_known_values() {
    let reduce = |algorithm: StackingAlgorithm, values: &[f32]| {
        reduce_pixel(&algorithm, &mut values.to_vec(), &mut [])
    };

    assert_abs_diff_eq!(reduce(StackingAlgorithm::Average, &[1.0, 2.0, 6.0]), 3.0, epsilon = 1e-9);
    assert_abs_diff_eq!(reduce(StackingAlgorithm::Median, &[5.0, 1.0, 3.0]), 3.0);
    assert_abs_diff_eq!(reduce(StackingAlgorithm::Median, &[4.0, 1.0, 3.0, 2.0]), 2.5);
    assert_abs_diff_eq!(reduce(StackingAlgorithm::Maximum, &[0.2, 0.9, 0.4]), 0.9f32 as f64);
    assert_abs_diff_eq!(reduce(StackingAlgorithm::Minimum, &[0.2, 0.9, 0.4]), 0.2f32 as f64);
    assert_abs_diff_eq!(reduce(StackingAlgorithm::Rms, &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0, epsilon = 1e-9);

    let cut_off = StackingAlgorithm::CutOffAverage(CutOffParams { tail_fraction: 0.2 });
    assert_abs_diff_eq!(reduce(cut_off, &[100.0, 1.0, 3.0, 2.0, 4.0]), 3.0, epsilon = 1e-9);
    // Cutting everything leaves the middle value.
    let cut_all = StackingAlgorithm::CutOffAverage(CutOffParams { tail_fraction: 0.45 });
    assert_abs_diff_eq!(reduce(cut_all, &[3.0, 1.0]), 3.0);

    let quartile = StackingAlgorithm::Quantile(QuantileParams { fraction: 0.25 });
    assert_abs_diff_eq!(reduce(quartile, &[5.0, 1.0, 4.0, 2.0, 3.0]), 2.0);

    let center = StackingAlgorithm::Center(CenterParams { central_value: 0.25 });
    assert_abs_diff_eq!(reduce(center, &[0.1, 0.875, 0.3]), 0.3f32 as f64);
    let center_tie = StackingAlgorithm::Center(CenterParams { central_value: 0.5 });
    assert_abs_diff_eq!(reduce(center_tie, &[0.75, 0.25]), 0.25);
}

#[test]
fn test_kappa_sigma_rejects_outlier() {
    let params = KappaSigmaParams {
        kappa: 1.1,
        iterations: 1,
    };
    let mut values = [10.0, 12.0, 1000.0];
    let result = reduce_pixel(&StackingAlgorithm::KappaSigmaMean(params), &mut values, &mut []);
    assert_abs_diff_eq!(result, 11.0, epsilon = 1e-9);

    let mut values = [10.0, 12.0, 1000.0, 14.0];
    let result = reduce_pixel(&StackingAlgorithm::KappaSigmaMedian(params), &mut values, &mut []);
    assert_abs_diff_eq!(result, 12.0, epsilon = 1e-9);
}

#[test]
fn test_weighted_reductions() {
    let mut values = [1.0, 2.0, 3.0];
    let mut scores = [1.0, 1.0, 5.0];
    assert_eq!(reduce_pixel(&StackingAlgorithm::WeightedMedian, &mut values, &mut scores), 3.0);

    let mut values = [1.0, 2.0, 3.0];
    let mut scores = [2.0, 5.0, 5.0];
    assert_eq!(reduce_pixel(&StackingAlgorithm::WeightedBestScore, &mut values, &mut scores), 2.0);

    // Without positive weights the plain median is used.
    let mut values = [1.0, 9.0, 3.0];
    let mut scores = [0.0, 0.0, 0.0];
    assert_eq!(reduce_pixel(&StackingAlgorithm::WeightedMedian, &mut values, &mut scores), 3.0);

    // Empty samples drop out together with their scores.
    let mut values = [EMPTY, 4.0, 6.0];
    let mut scores = [100.0, 1.0, 2.0];
    assert_eq!(reduce_pixel(&StackingAlgorithm::WeightedBestScore, &mut values, &mut scores), 6.0);
}

#[test]
fn test_empty_samples_are_ignored() {
    for algorithm in every_algorithm() {
        let mut all_empty = [EMPTY; 4];
        assert_eq!(reduce_pixel(&algorithm, &mut all_empty, &mut []), -1.0, "{algorithm}");

        let mut one_live = [EMPTY, 0.5, EMPTY];
        let mut scores = [0.0, 1.0, 0.0];
        let scores: &mut [f32] = if algorithm.is_weighted() { &mut scores } else { &mut [] };
        let expected = if matches!(algorithm, StackingAlgorithm::Rms) { 0.0 } else { 0.5 };
        assert_abs_diff_eq!(reduce_pixel(&algorithm, &mut one_live, scores), expected, epsilon = 1e-9);
    }
}

#[test]
fn test_streaming_shards_merge() {
    let values = [0.5f32, 0.25, 0.75, 0.125];
    for reducer in [
        StreamingReducer::Mean,
        StreamingReducer::Maximum,
        StreamingReducer::Minimum,
        StreamingReducer::Rms,
        StreamingReducer::Center { central_value: 0.3 },
    ] {
        let mut whole = StreamingShard::new(reducer, 2);
        let mut left = StreamingShard::new(reducer, 2);
        let mut right = StreamingShard::new(reducer, 2);
        for (i, &v) in values.iter().enumerate() {
            whole.accept(0, v);
            if i % 2 == 0 {
                left.accept(0, v);
            } else {
                right.accept(0, v);
            }
        }
        whole.accept(1, EMPTY);
        left.merge(&right);

        assert_abs_diff_eq!(left.finalize(0), whole.finalize(0), epsilon = 1e-12);
        assert_eq!(whole.finalize(1), -1.0);
        assert_eq!(left.finalize(1), -1.0);
    }

    let mut center = StreamingShard::new(StreamingReducer::Center { central_value: 0.3 }, 1);
    for v in values {
        center.accept(0, v);
    }
    assert_eq!(center.finalize(0), 0.25);
}

#[test]
fn test_identical_frames_give_the_frame() {
    let mut reader = MemoryReader::new();
    let frames: Vec<(InputFrame, AlignmentResult)> = (0..4)
        .map(|i| {
            let frame = InputFrame::still(format!("light_{i}.png"));
            reader.insert(frame.clone(), make_frame(W, H, pattern));
            (frame, AlignmentResult::identity())
        })
        .collect();

    for algorithm in every_algorithm() {
        let image = stack_with(algorithm, &reader, &frames, None);
        assert_eq!(image.count_empty(), 0);
        for y in 0..H {
            for x in 0..W {
                let expected = if matches!(algorithm, StackingAlgorithm::Rms) {
                    0.0
                } else {
                    pattern(x, y) as f64
                };
                assert_abs_diff_eq!(image.channels[0][[y, x]], expected, epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn test_stack_known_values() {
    // Every pixel sees 0.1, 0.2, 0.3, 0.4 and 0.9 (ranked 1..=5) plus a
    // per-pixel offset, so each algorithm has a hand-computed answer.
    let levels = [0.1, 0.2, 0.3, 0.4, 0.9];
    let offset = |x: usize, y: usize| 0.001 * (y * W + x) as f64;
    let mut reader = MemoryReader::new();
    let frames: Vec<(InputFrame, AlignmentResult)> = levels
        .iter()
        .enumerate()
        .map(|(i, &level)| {
            let frame = InputFrame::video("levels.ser", i as i32);
            reader.insert(frame.clone(), make_frame(W, H, |x, y| (level + offset(x, y)) as f32));
            (frame, AlignmentResult::identity().with_ranking(1.0 + i as f32))
        })
        .collect();

    let clipping = StackingAlgorithm::KappaSigmaMean(KappaSigmaParams {
        kappa: 1.5,
        iterations: 1,
    });
    let mut cases: Vec<(StackingAlgorithm, f64)> = every_algorithm()
        .into_iter()
        .map(|algorithm| {
            let expected = match algorithm {
                StackingAlgorithm::Average | StackingAlgorithm::KappaSigmaMean(_) => 0.38,
                StackingAlgorithm::Median
                | StackingAlgorithm::KappaSigmaMedian(_)
                | StackingAlgorithm::CutOffAverage(_)
                | StackingAlgorithm::Quantile(_) => 0.3,
                StackingAlgorithm::Maximum | StackingAlgorithm::WeightedBestScore => 0.9,
                StackingAlgorithm::Minimum => 0.1,
                StackingAlgorithm::Center(_) => 0.2,
                StackingAlgorithm::WeightedMedian => 0.4,
                StackingAlgorithm::Rms => 0.0776f64.sqrt(),
            };
            (algorithm, expected)
        })
        .collect();
    // A tighter kappa drops the 0.9 outlier.
    cases.push((clipping, 0.25));

    for (algorithm, expected) in cases {
        let image = stack_with(algorithm, &reader, &frames, None);
        for y in 0..H {
            for x in 0..W {
                let expected = if matches!(algorithm, StackingAlgorithm::Rms) {
                    expected
                } else {
                    expected + offset(x, y)
                };
                assert_abs_diff_eq!(image.channels[0][[y, x]], expected, epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn test_banded_stack_matches_single_band() {
    let (reader, frames) = noisy_sequence(5, 7);

    for algorithm in every_algorithm() {
        let whole = stack_with(algorithm, &reader, &frames, None);

        let sizing = Stacker::new(config(algorithm), &reader, W, H, 1);
        let (fixed, row) = sizing.memory_footprint(frames.len());
        for rows in [1, 2, 4] {
            let limit = Some(fixed + rows * row);
            let stacker = Stacker::new(config(algorithm), &reader, W, H, 1).with_memory_limit_bytes(limit);
            assert_eq!(stacker.band_height(frames.len()).unwrap(), rows);

            let banded = stack_with(algorithm, &reader, &frames, limit);
            for (a, b) in banded.channels[0].iter().zip(whole.channels[0].iter()) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
            }
        }
    }
}

#[test]
fn test_memory_footprint_by_algorithm() {
    let reader = MemoryReader::new();
    let pixels = W * H * 3;
    let fixed = pixels * 8 + 3 * pixels * 8;

    let streaming = Stacker::new(config(StackingAlgorithm::Average), &reader, W, H, 3);
    assert_eq!(streaming.memory_footprint(10), (fixed, 3 * W * 3 * 20));

    let median = Stacker::new(config(StackingAlgorithm::Median), &reader, W, H, 3);
    assert_eq!(median.memory_footprint(10), (fixed, 3 * W * 10 * 4));

    let weighted = Stacker::new(config(StackingAlgorithm::WeightedMedian), &reader, W, H, 3);
    assert_eq!(weighted.memory_footprint(10), (fixed, 3 * W * 10 * 8));
}

#[test]
fn test_memory_limit_in_megabytes() {
    let reader = MemoryReader::new();
    let limited = StackingConfig {
        memory_limit_mb: Some(1),
        ..config(StackingAlgorithm::Median)
    };
    let stacker = Stacker::new(limited, &reader, 100, 200, 1);
    let (fixed, row) = stacker.memory_footprint(50);
    let expected = ((1 << 20) - fixed) / row;
    assert!(expected > 0 && expected < 200);
    assert_eq!(stacker.band_height(50).unwrap(), expected);

    let unlimited = Stacker::new(StackingConfig::default(), &reader, 100, 200, 1);
    assert_eq!(unlimited.band_height(50).unwrap(), 200);
}

#[test]
fn test_memory_insufficient() {
    let (reader, frames) = noisy_sequence(3, 1);
    let sizing = Stacker::new(config(StackingAlgorithm::Median), &reader, W, H, 1);
    let (_, row) = sizing.memory_footprint(frames.len());
    // Stacked image plus a single in-flight photo, one byte short of a row.
    let fixed = W * H * 8 + W * H * 8;

    let mut stacker = Stacker::new(config(StackingAlgorithm::Median), &reader, W, H, 1)
        .with_memory_limit_bytes(Some(fixed + row - 1));
    assert_eq!(stacker.photo_slots(frames.len()), 1);
    for (frame, alignment) in &frames {
        stacker.add_frame(frame.clone(), alignment.clone());
    }
    match stacker.stack(&NoOpReporter) {
        Err(StackerError::MemoryInsufficient {
            limit_bytes,
            fixed_bytes,
            row_bytes,
        }) => {
            assert_eq!(limit_bytes, fixed + row - 1);
            assert_eq!(fixed_bytes, fixed);
            assert_eq!(row_bytes, row);
        }
        other => panic!("expected MemoryInsufficient, got {other:?}"),
    }
}

#[test]
fn test_photo_slots_follow_memory_limit() {
    let (reader, frames) = noisy_sequence(4, 5);
    let image = W * H * 8;
    let photo = W * H * 8;
    let row = W * frames.len() * 4;
    let limited = |limit: Option<usize>| {
        Stacker::new(config(StackingAlgorithm::Median), &reader, W, H, 1).with_memory_limit_bytes(limit)
    };

    assert_eq!(limited(None).photo_slots(frames.len()), 3);
    assert_eq!(limited(Some(image + photo + row)).photo_slots(frames.len()), 1);
    assert_eq!(limited(Some(image + 2 * photo + row)).photo_slots(frames.len()), 2);
    assert_eq!(limited(Some(image + 10 * photo)).photo_slots(frames.len()), 3);

    let tight = limited(Some(image + photo + row));
    assert_eq!(tight.memory_footprint(frames.len()), (image + photo, row));
    assert_eq!(tight.band_height(frames.len()).unwrap(), 1);

    // One frame in flight at a time still stacks the same image.
    let whole = stack_with(StackingAlgorithm::Median, &reader, &frames, None);
    let serial = stack_with(StackingAlgorithm::Median, &reader, &frames, Some(image + photo + row));
    for (a, b) in serial.channels[0].iter().zip(whole.channels[0].iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[test]
fn test_shifted_frames_fill_the_edge() {
    let mut reader = MemoryReader::new();
    let shifted = AlignmentResult::from_transform(&GeometricTransformer::new(1.0, 0.0, 0.0, 0.0, 0.0));
    let frames: Vec<InputFrame> = (0..3).map(|i| InputFrame::video("shifted.ser", i)).collect();
    for frame in &frames {
        reader.insert(frame.clone(), make_frame(W, H, |_, _| 0.4));
    }
    let mut stacker = Stacker::new(config(StackingAlgorithm::Median), &reader, W, H, 1);
    for frame in &frames {
        stacker.add_frame(frame.clone(), shifted.clone());
    }

    let image = stacker.stack(&NoOpReporter).unwrap();
    assert_eq!(image.count_empty(), 0);
    for y in 0..H {
        assert_abs_diff_eq!(image.channels[0][[y, 0]], 0.4f32 as f64, epsilon = 1e-9);
    }
}

#[test]
fn test_fill_empty_pixels_uses_snapshot() {
    let mut image = StackedImage::empty(4, 3, 1);
    image.channels[0][[1, 1]] = 2.0;
    image.channels[0][[1, 2]] = 4.0;

    let filled = fill_empty_pixels(&mut image);
    // Every empty pixel touches a live one.
    assert_eq!(filled, 10);
    assert_eq!(image.value(0, 0, 0), Some(2.0));
    assert_eq!(image.value(3, 2, 0), Some(4.0));
    assert_eq!(image.value(1, 0, 0), Some(3.0));
    assert_eq!(image.count_empty(), 0);

    let mut isolated = StackedImage::empty(5, 1, 1);
    isolated.channels[0][[0, 0]] = 1.0;
    assert_eq!(fill_empty_pixels(&mut isolated), 1);
    assert_eq!(isolated.value(1, 0, 0), Some(1.0));
    assert_eq!(isolated.value(2, 0, 0), None);
    assert_eq!(isolated.count_empty(), 3);
}

#[test]
fn test_frame_selection() {
    let frame = |i: i32| InputFrame::video("s.ser", i);
    let frames = vec![
        (frame(0), AlignmentResult::identity().with_ranking(0.5)),
        (frame(1), AlignmentResult::identity().with_ranking(0.9)),
        (frame(2), AlignmentResult::invalid().with_ranking(5.0)),
        (frame(3), AlignmentResult::identity().with_ranking(0.7)),
    ];

    assert_eq!(select_frames(&frames, FrameSelection::All), vec![0, 1, 3]);
    assert_eq!(select_frames(&frames, FrameSelection::Best { count: 2 }), vec![1, 3]);
    assert_eq!(select_frames(&frames, FrameSelection::Best { count: 10 }), vec![0, 1, 3]);
    assert_eq!(select_frames(&frames, FrameSelection::BestFraction { fraction: 0.5 }), vec![1, 3]);
    assert_eq!(select_frames(&frames, FrameSelection::BestFraction { fraction: 0.01 }), vec![1]);
    assert!(select_frames(&frames, FrameSelection::BestFraction { fraction: 0.0 }).is_empty());
}

#[test]
fn test_no_valid_frames_is_an_error() {
    let reader = MemoryReader::new();
    let mut stacker = Stacker::new(config(StackingAlgorithm::Average), &reader, W, H, 1);
    assert!(matches!(stacker.stack(&NoOpReporter), Err(StackerError::EmptySequence)));

    stacker.add_frame(InputFrame::still("a.png"), AlignmentResult::invalid());
    assert!(matches!(stacker.stack(&NoOpReporter), Err(StackerError::EmptySequence)));
}

#[test]
fn test_failed_frames_abort_or_are_skipped() {
    let mut reader = MemoryReader::new();
    reader.insert(InputFrame::still("good.png"), make_frame(W, H, |_, _| 0.3));
    reader.insert(InputFrame::still("small.png"), make_frame(W - 1, H, |_, _| 0.9));
    let frames = [
        InputFrame::still("good.png"),
        InputFrame::still("small.png"),
        InputFrame::still("missing.png"),
    ];

    for algorithm in [StackingAlgorithm::Average, StackingAlgorithm::Median] {
        let mut strict = Stacker::new(config(algorithm), &reader, W, H, 1);
        for frame in &frames {
            strict.add_frame(frame.clone(), AlignmentResult::identity());
        }
        assert!(strict.stack(&NoOpReporter).is_err());

        let mut lenient = Stacker::new(config(algorithm), &reader, W, H, 1).skip_failed_frames(true);
        for frame in &frames {
            lenient.add_frame(frame.clone(), AlignmentResult::identity());
        }
        let image = lenient.stack(&NoOpReporter).unwrap();
        assert_abs_diff_eq!(image.channels[0][[3, 3]], 0.3f32 as f64, epsilon = 1e-9);
    }
}

#[test]
fn test_raw_mosaic_stacks_per_color() {
    let pattern = BayerPattern::RGGB;
    let mosaic = Array2::from_shape_fn((H, W), |(y, x)| match pattern.color_at(x, y) {
        0 => 0.25,
        1 => 0.5,
        _ => 0.75,
    });
    let mut reader = MemoryReader::new();
    let frames: Vec<InputFrame> = (0..2).map(|i| InputFrame::video("raw.ser", i)).collect();
    for frame in &frames {
        reader.insert(frame.clone(), FrameData::bayer(mosaic.clone(), pattern));
    }
    let mut stacker = Stacker::new(config(StackingAlgorithm::Average), &reader, W, H, 3);
    for frame in &frames {
        stacker.add_frame(frame.clone(), AlignmentResult::identity());
    }

    let image = stacker.stack(&NoOpReporter).unwrap();
    assert_eq!(image.n_colors(), 3);
    assert_eq!(image.count_empty(), 0);
    for (color, expected) in [0.25, 0.5, 0.75].into_iter().enumerate() {
        for v in image.channels[color].iter() {
            assert_abs_diff_eq!(*v, expected, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_interpolated_colors_and_wrong_color_count() {
    let pattern = BayerPattern::GRBG;
    let mut reader = MemoryReader::new();
    reader.insert(InputFrame::still("raw.tif"), FrameData::bayer(Array2::from_elem((H, W), 0.5), pattern));
    reader.insert(InputFrame::still("mono.png"), make_frame(W, H, |_, _| 0.5));

    let interpolating = StackingConfig {
        interpolate_colors: true,
        ..config(StackingAlgorithm::Median)
    };
    let mut stacker = Stacker::new(interpolating, &reader, W, H, 3);
    stacker.add_frame(InputFrame::still("raw.tif"), AlignmentResult::identity());
    let image = stacker.stack(&NoOpReporter).unwrap();
    assert_abs_diff_eq!(image.channels[1][[2, 2]], 0.5, epsilon = 1e-6);

    let mut mixed = Stacker::new(config(StackingAlgorithm::Median), &reader, W, H, 3);
    mixed.add_frame(InputFrame::still("mono.png"), AlignmentResult::identity());
    assert!(matches!(
        mixed.stack(&NoOpReporter),
        Err(StackerError::UnsupportedColorLayout(_))
    ));
}

#[test]
fn test_skipped_frames_contribute_nothing() {
    let mut reader = MemoryReader::new();
    reader.insert(InputFrame::still("a.png"), make_frame(W, H, |_, _| 0.2));
    reader.insert(InputFrame::still("b.png"), make_frame(W, H, |_, _| 0.4));
    reader.insert(InputFrame::still("c.png"), make_frame(W, H, |_, _| 0.9));
    reader.insert(InputFrame::still("tall.png"), make_frame(W, H + 2, |_, _| 1.0));
    let frames = ["a.png", "missing.png", "b.png", "tall.png"];

    let mut streaming = Stacker::new(config(StackingAlgorithm::Average), &reader, W, H, 1).skip_failed_frames(true);
    for name in frames {
        streaming.add_frame(InputFrame::still(name), AlignmentResult::identity());
    }
    let image = streaming.stack(&NoOpReporter).unwrap();
    assert_eq!(image.count_empty(), 0);
    for v in image.channels[0].iter() {
        assert_abs_diff_eq!(*v, 0.3, epsilon = 1e-6);
    }

    let mut median = Stacker::new(config(StackingAlgorithm::Median), &reader, W, H, 1).skip_failed_frames(true);
    for name in frames.into_iter().chain(["c.png"]) {
        median.add_frame(InputFrame::still(name), AlignmentResult::identity());
    }
    let image = median.stack(&NoOpReporter).unwrap();
    for v in image.channels[0].iter() {
        assert_abs_diff_eq!(*v, 0.4f32 as f64, epsilon = 1e-9);
    }
}

#[derive(Default)]
struct CountingReporter {
    stages: AtomicUsize,
    advanced: AtomicUsize,
}

impl ProgressReporter for CountingReporter {
    fn begin_stage(&self, _stage: astrostack_core::progress::StackingStage, _total: Option<usize>) {
        self.stages.fetch_add(1, Ordering::SeqCst);
    }

    fn advance(&self, items_done: usize) {
        self.advanced.fetch_add(items_done, Ordering::SeqCst);
    }
}

#[test]
fn test_progress_counts_frames_per_band() {
    let (reader, frames) = noisy_sequence(4, 3);
    let sizing = Stacker::new(config(StackingAlgorithm::Median), &reader, W, H, 1);
    let (fixed, row) = sizing.memory_footprint(frames.len());

    let mut stacker = Stacker::new(config(StackingAlgorithm::Median), &reader, W, H, 1)
        .with_memory_limit_bytes(Some(fixed + 2 * row));
    for (frame, alignment) in &frames {
        stacker.add_frame(frame.clone(), alignment.clone());
    }
    let reporter = CountingReporter::default();
    stacker.stack(&reporter).unwrap();

    assert_eq!(reporter.advanced.load(Ordering::SeqCst), 4 * 3);
    assert_eq!(reporter.stages.load(Ordering::SeqCst), 2);
}

#[test]
fn test_master_from_raw_mosaics_keeps_sensor_pixels() {
    let pattern = BayerPattern::RGGB;
    let mosaic = Array2::from_shape_fn((H, W), |(y, x)| 0.25 * (1 + pattern.color_at(x, y)) as f32);
    let mut reader = MemoryReader::new();
    let frames = vec![InputFrame::still("dark_1.tif"), InputFrame::still("dark_2.tif")];
    reader.insert(frames[0].clone(), FrameData::bayer(mosaic.clone(), pattern));
    reader.insert(frames[1].clone(), FrameData::bayer(mosaic.mapv(|v| v + 0.1), pattern));

    // Selection and interpolation do not apply to calibration frames.
    let master_config = StackingConfig {
        selection: FrameSelection::Best { count: 1 },
        interpolate_colors: true,
        ..config(StackingAlgorithm::Average)
    };
    let master = stack_calibration_frames(&reader, &frames, master_config, &NoOpReporter).unwrap();
    assert_eq!(master.n_colors(), 1);
    assert_eq!((master.width, master.height), (W, H));
    for ((y, x), v) in master.channels[0].indexed_iter() {
        assert_abs_diff_eq!(*v, mosaic[[y, x]] as f64 + 0.05, epsilon = 1e-6);
    }
}

#[test]
fn test_master_dark_median_ignores_cosmic_ray() {
    let mut reader = MemoryReader::new();
    let mut frames = Vec::new();
    for (i, level) in [0.10, 0.12, 0.11, 0.13, 0.12, 0.12].into_iter().enumerate() {
        let frame = InputFrame::video("darks.ser", i as i32);
        let hit = i == 5;
        reader.insert(
            frame.clone(),
            make_frame(W, H, |x, y| if hit && (x, y) == (4, 2) { 1.0 } else { level }),
        );
        frames.push(frame);
    }

    let master_config = StackingConfig {
        algorithm: default_master_algorithm(),
        n_cpu: 2,
        ..Default::default()
    };
    let master = stack_calibration_frames(&reader, &frames, master_config, &NoOpReporter).unwrap();
    assert_eq!(master.count_empty(), 0);
    for v in master.channels[0].iter() {
        assert_abs_diff_eq!(*v, 0.12f32 as f64, epsilon = 1e-6);
    }
}

#[test]
fn test_master_from_rgb_and_empty_list() {
    let mut reader = MemoryReader::new();
    let frame = InputFrame::still("flat.png");
    reader.insert(
        frame.clone(),
        FrameData::rgb(
            Array2::from_elem((H, W), 0.6),
            Array2::from_elem((H, W), 0.7),
            Array2::from_elem((H, W), 0.8),
        ),
    );
    let master = stack_calibration_frames(&reader, &[frame], config(StackingAlgorithm::Median), &NoOpReporter).unwrap();
    assert_eq!(master.n_colors(), 3);
    assert_abs_diff_eq!(master.channels[2][[1, 1]], 0.8f32 as f64, epsilon = 1e-9);

    assert!(matches!(
        stack_calibration_frames(&reader, &[], config(StackingAlgorithm::Median), &NoOpReporter),
        Err(StackerError::EmptySequence)
    ));
}
