use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use ndarray::{s, Axis};
use tracing::{debug, info};

use crate::align::AlignmentResult;
use crate::calibration::{CalibratedPhoto, CalibrationSetup};
use crate::consts::{
    CALIBRATED_PIXEL_BYTES, EMPTY_PIXEL, ORDER_STATISTIC_SAMPLE_BYTES, STACKED_PIXEL_BYTES,
    STREAMING_ACCUMULATOR_BYTES,
};
use crate::error::{Result, StackerError};
use crate::frame::{FrameReader, InputFrame};
use crate::progress::{ProgressReporter, StackingStage};
use crate::scheduler::TaskScheduler;

use super::config::StackingConfig;
use super::fill::fill_empty_pixels;
use super::order_statistic::reduce_pixel;
use super::output::StackedImage;
use super::selection::select_frames;
use super::streaming::{StreamingReducer, StreamingShard};

const BYTES_PER_MB: usize = 1024 * 1024;

/// Height-banded stacking driver.
///
/// Frames are added with their alignment, then [`Stacker::stack`] walks the
/// reference image in bands of rows sized to the memory limit. For each band
/// every frame is calibrated and resampled in parallel; streaming algorithms
/// fold samples into per-worker shards, order-statistic algorithms keep every
/// frame's samples and reduce them row by row.
pub struct Stacker<'r> {
    config: StackingConfig,
    reader: &'r dyn FrameReader,
    width: usize,
    height: usize,
    n_colors: usize,
    frames: Vec<(InputFrame, AlignmentResult)>,
    calibration: CalibrationSetup,
    memory_limit_bytes: Option<usize>,
    skip_failed_frames: bool,
}

/// Per-frame sample storage of one band, `[color][pixel]` plus scores.
struct FrameSamples {
    values: Vec<Vec<f32>>,
    scores: Vec<f32>,
}

impl<'r> Stacker<'r> {
    pub fn new(
        config: StackingConfig,
        reader: &'r dyn FrameReader,
        width: usize,
        height: usize,
        n_colors: usize,
    ) -> Self {
        let memory_limit_bytes = config.memory_limit_mb.map(|mb| mb.saturating_mul(BYTES_PER_MB));
        Self {
            config,
            reader,
            width,
            height,
            n_colors,
            frames: Vec::new(),
            calibration: CalibrationSetup::default(),
            memory_limit_bytes,
            skip_failed_frames: false,
        }
    }

    /// Override the memory limit with a byte-exact value.
    pub fn with_memory_limit_bytes(mut self, limit: Option<usize>) -> Self {
        self.memory_limit_bytes = limit;
        self
    }

    pub fn with_calibration(mut self, calibration: CalibrationSetup) -> Self {
        self.calibration = calibration;
        self
    }

    /// Drop frames that fail to load or calibrate instead of aborting.
    pub fn skip_failed_frames(mut self, skip: bool) -> Self {
        self.skip_failed_frames = skip;
        self
    }

    pub fn add_frame(&mut self, frame: InputFrame, alignment: AlignmentResult) {
        self.frames.push((frame, alignment));
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn config(&self) -> &StackingConfig {
        &self.config
    }

    /// Bytes needed regardless of band height, and bytes per band row, when
    /// stacking `n_files` frames with [`Stacker::photo_slots`] frames in flight.
    pub fn memory_footprint(&self, n_files: usize) -> (usize, usize) {
        let (image, photo, row) = self.footprint_parts(n_files);
        (image + self.photo_slots(n_files) * photo, row)
    }

    /// Frames decoded and calibrated at once: one per worker thread, fewer
    /// when the memory limit cannot hold that many alongside a single band row.
    pub fn photo_slots(&self, n_files: usize) -> usize {
        let n_cpu = self.config.n_cpu.max(1);
        let Some(limit) = self.memory_limit_bytes else {
            return n_cpu;
        };
        let (image, photo, row) = self.footprint_parts(n_files);
        (limit.saturating_sub(image + row) / photo.max(1)).clamp(1, n_cpu)
    }

    /// Bytes of the stacked image, of one in-flight photo, and of one band row.
    fn footprint_parts(&self, n_files: usize) -> (usize, usize, usize) {
        let n_cpu = self.config.n_cpu.max(1);
        let pixels = self.width * self.height * self.n_colors;
        let row = if self.config.algorithm.needs_order_statistics() {
            let sample_bytes = if self.config.algorithm.is_weighted() {
                2 * ORDER_STATISTIC_SAMPLE_BYTES
            } else {
                ORDER_STATISTIC_SAMPLE_BYTES
            };
            self.n_colors * self.width * n_files * sample_bytes
        } else {
            self.n_colors * self.width * n_cpu * STREAMING_ACCUMULATOR_BYTES
        };
        (pixels * STACKED_PIXEL_BYTES, pixels * CALIBRATED_PIXEL_BYTES, row)
    }

    /// Rows per band for `n_files` frames.
    pub fn band_height(&self, n_files: usize) -> Result<usize> {
        let Some(limit) = self.memory_limit_bytes else {
            return Ok(self.height);
        };
        let (fixed, row) = self.memory_footprint(n_files);
        let rows = limit.saturating_sub(fixed) / row.max(1);
        if rows == 0 {
            return Err(StackerError::MemoryInsufficient {
                limit_bytes: limit,
                fixed_bytes: fixed,
                row_bytes: row,
            });
        }
        Ok(rows.min(self.height))
    }

    /// Stack all selected frames.
    pub fn stack(&self, progress: &dyn ProgressReporter) -> Result<StackedImage> {
        if self.width == 0 || self.height == 0 || self.n_colors == 0 {
            return Err(StackerError::InvalidDimensions {
                width: self.width as u32,
                height: self.height as u32,
            });
        }
        let selected: Vec<&(InputFrame, AlignmentResult)> = select_frames(&self.frames, self.config.selection)
            .into_iter()
            .map(|i| &self.frames[i])
            .collect();
        if selected.is_empty() {
            return Err(StackerError::EmptySequence);
        }

        let n_cpu = self.config.n_cpu.max(1);
        let band_height = self.band_height(selected.len())?;
        let n_bands = self.height.div_ceil(band_height);
        let photo_slots = self.photo_slots(selected.len());
        // Resources: worker threads, then decoded frames held in memory.
        let scheduler = TaskScheduler::new(vec![n_cpu, photo_slots])?.ignore_task_failures(self.skip_failed_frames);
        let setup = CalibrationSetup {
            interpolate_colors: self.config.interpolate_colors,
            ..self.calibration.clone()
        };

        info!(
            algorithm = %self.config.algorithm,
            frames = selected.len(),
            band_height,
            bands = n_bands,
            threads = n_cpu,
            photo_slots,
            "Stacking"
        );

        let mut image = StackedImage::empty(self.width, self.height, self.n_colors);
        progress.begin_stage(StackingStage::Calibration, Some(selected.len() * n_bands));
        for y_min in (0..self.height).step_by(band_height) {
            let y_max = (y_min + band_height).min(self.height);
            debug!(y_min, y_max, "Processing band");
            match StreamingReducer::for_algorithm(&self.config.algorithm) {
                Some(reducer) => {
                    self.stack_band_streaming(&scheduler, &setup, &selected, reducer, y_min, y_max, &mut image, progress)?
                }
                None => self.stack_band_order_statistic(&scheduler, &setup, &selected, y_min, y_max, &mut image, progress)?,
            }
        }
        progress.finish_stage();

        progress.begin_stage(StackingStage::Filling, None);
        let filled = fill_empty_pixels(&mut image);
        progress.finish_stage();
        info!(filled, remaining_empty = image.count_empty(), "Filled empty pixels");

        Ok(image)
    }

    fn calibrate(&self, setup: &CalibrationSetup, frame: &InputFrame, alignment: &AlignmentResult, y_min: usize, y_max: usize) -> Result<CalibratedPhoto> {
        let data = self.reader.read_frame(frame)?;
        if data.width() != self.width || data.height() != self.height {
            return Err(StackerError::DimensionMismatch {
                expected_width: self.width,
                expected_height: self.height,
                width: data.width(),
                height: data.height(),
            });
        }
        let photo = CalibratedPhoto::calibrate(data, alignment, setup, y_min, y_max)?;
        if photo.n_colors() != self.n_colors {
            return Err(StackerError::UnsupportedColorLayout(format!(
                "{frame} has {} colors, the stack has {}",
                photo.n_colors(),
                self.n_colors
            )));
        }
        Ok(photo)
    }

    #[allow(clippy::too_many_arguments)]
    fn stack_band_streaming(
        &self,
        scheduler: &TaskScheduler,
        setup: &CalibrationSetup,
        frames: &[&(InputFrame, AlignmentResult)],
        reducer: StreamingReducer,
        y_min: usize,
        y_max: usize,
        image: &mut StackedImage,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        let band_pixels = (y_max - y_min) * self.width;
        let shards: Vec<Mutex<StreamingShard>> = (0..scheduler.limits()[0])
            .map(|_| Mutex::new(StreamingShard::new(reducer, self.n_colors * band_pixels)))
            .collect();

        scheduler.scope(|tasks| {
            for &(frame, alignment) in frames {
                let shards = &shards;
                tasks.submit(
                    move || {
                        let photo = self.calibrate(setup, frame, alignment, y_min, y_max)?;
                        let mut shard = claim_shard(shards);
                        for color in 0..self.n_colors {
                            let offset = color * band_pixels;
                            for y in y_min..y_max {
                                let base = offset + (y - y_min) * self.width;
                                for (x, &value) in photo.row(color, y).iter().enumerate() {
                                    shard.accept(base + x, value);
                                }
                            }
                        }
                        progress.advance(1);
                        Ok(())
                    },
                    &[1, 1],
                )?;
            }
            Ok(())
        })?;

        let mut shards = shards.into_iter().map(|m| m.into_inner().unwrap_or_else(PoisonError::into_inner));
        let Some(mut merged) = shards.next() else {
            return Ok(());
        };
        for shard in shards {
            merged.merge(&shard);
        }
        for (color, channel) in image.channels.iter_mut().enumerate() {
            let offset = color * band_pixels;
            let mut band = channel.slice_mut(s![y_min..y_max, ..]);
            for ((row, x), v) in band.indexed_iter_mut() {
                *v = merged.finalize(offset + row * self.width + x);
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn stack_band_order_statistic(
        &self,
        scheduler: &TaskScheduler,
        setup: &CalibrationSetup,
        frames: &[&(InputFrame, AlignmentResult)],
        y_min: usize,
        y_max: usize,
        image: &mut StackedImage,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        let band_pixels = (y_max - y_min) * self.width;
        let weighted = self.config.algorithm.is_weighted();
        let mut samples: Vec<FrameSamples> = frames
            .iter()
            .map(|_| FrameSamples {
                values: vec![vec![EMPTY_PIXEL; band_pixels]; self.n_colors],
                scores: if weighted { vec![0.0; band_pixels] } else { Vec::new() },
            })
            .collect();

        // Each task owns one frame's slices.
        scheduler.scope(|tasks| {
            for (slot, &(frame, alignment)) in samples.iter_mut().zip(frames) {
                tasks.submit(
                    move || {
                        let photo = self.calibrate(setup, frame, alignment, y_min, y_max)?;
                        for y in y_min..y_max {
                            let start = (y - y_min) * self.width;
                            for (color, values) in slot.values.iter_mut().enumerate() {
                                for (dst, &src) in values[start..start + self.width].iter_mut().zip(photo.row(color, y)) {
                                    *dst = src;
                                }
                            }
                            if weighted {
                                for (dst, &src) in slot.scores[start..start + self.width].iter_mut().zip(photo.score_row(y)) {
                                    *dst = src;
                                }
                            }
                        }
                        progress.advance(1);
                        Ok(())
                    },
                    &[1, 1],
                )?;
            }
            Ok(())
        })?;

        // One reduction task per (color, row), each writing a disjoint output row.
        let samples = &samples;
        let algorithm = &self.config.algorithm;
        let width = self.width;
        scheduler.scope(|tasks| {
            for (color, channel) in image.channels.iter_mut().enumerate() {
                let band_rows = channel.axis_iter_mut(Axis(0)).skip(y_min).take(y_max - y_min);
                for (row, mut out) in band_rows.enumerate() {
                    tasks.submit(
                        move || {
                            let mut values = vec![0.0f32; samples.len()];
                            let mut scores = if weighted { vec![0.0f32; samples.len()] } else { Vec::new() };
                            for x in 0..width {
                                let pixel = row * width + x;
                                for (i, frame) in samples.iter().enumerate() {
                                    values[i] = frame.values[color][pixel];
                                    if weighted {
                                        scores[i] = frame.scores[pixel];
                                    }
                                }
                                out[x] = reduce_pixel(algorithm, &mut values, &mut scores);
                            }
                            Ok(())
                        },
                        &[1, 0],
                    )?;
                }
            }
            Ok(())
        })
    }
}

/// Lock the first free shard, or wait for the first one when all are busy.
fn claim_shard(shards: &[Mutex<StreamingShard>]) -> MutexGuard<'_, StreamingShard> {
    for shard in shards {
        match shard.try_lock() {
            Ok(guard) => return guard,
            Err(TryLockError::Poisoned(poisoned)) => return poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => continue,
        }
    }
    shards[0].lock().unwrap_or_else(PoisonError::into_inner)
}
