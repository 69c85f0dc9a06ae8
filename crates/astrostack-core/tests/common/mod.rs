use std::collections::HashMap;
use std::io::{Error, ErrorKind};

use astrostack_core::detection::Star;
use astrostack_core::error::{Result, StackerError};
use astrostack_core::frame::{FrameData, FrameReader, InputFrame};
use astrostack_core::io::ser::SER_HEADER_SIZE;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Frame source backed by decoded frames held in memory.
#[derive(Default)]
pub struct MemoryReader {
    frames: HashMap<InputFrame, FrameData>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, frame: InputFrame, data: FrameData) {
        self.frames.insert(frame, data);
    }
}

impl FrameReader for MemoryReader {
    fn read_frame(&self, frame: &InputFrame) -> Result<FrameData> {
        self.frames.get(frame).cloned().ok_or_else(|| {
            StackerError::Io(Error::new(ErrorKind::NotFound, frame.to_string()))
        })
    }
}

/// Mono frame with `f(x, y)` at every pixel.
pub fn make_frame(width: usize, height: usize, f: impl Fn(usize, usize) -> f32) -> FrameData {
    FrameData::mono(Array2::from_shape_fn((height, width), |(y, x)| f(x, y)))
}

/// Smooth, non-constant test pattern in (0, 1).
pub fn pattern(x: usize, y: usize) -> f32 {
    0.1 + 0.4 * ((x as f32 * 0.37).sin() * 0.5 + 0.5) + 0.3 * ((y as f32 * 0.21).cos() * 0.5 + 0.5)
}

/// `n` stars at random positions at least `margin` px from the border,
/// with distinct sizes in descending order.
pub fn random_stars(seed: u64, n: usize, width: f32, height: f32, margin: f32) -> Vec<Star> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            Star::new(
                rng.random_range(margin..width - margin),
                rng.random_range(margin..height - margin),
                200 - i,
            )
        })
        .collect()
}

/// Render square `side`×`side` star blobs at integer positions.
pub fn render_stars(stars: &[Star], width: usize, height: usize, side: usize) -> Array2<f32> {
    let mut data = Array2::<f32>::from_elem((height, width), 0.01);
    for star in stars {
        let x0 = star.x.round() as usize;
        let y0 = star.y.round() as usize;
        for y in y0..(y0 + side).min(height) {
            for x in x0..(x0 + side).min(width) {
                data[[y, x]] = 0.9;
            }
        }
    }
    data
}

/// SER header for `color_id` (0 mono, 8-11 Bayer, 100 RGB, 101 BGR).
pub fn build_ser_header(width: u32, height: u32, bit_depth: u32, num_frames: usize, color_id: i32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SER_HEADER_SIZE);
    buf.extend_from_slice(b"LUCAM-RECORDER");
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(&color_id.to_le_bytes());
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(&(width as i32).to_le_bytes());
    buf.extend_from_slice(&(height as i32).to_le_bytes());
    buf.extend_from_slice(&(bit_depth as i32).to_le_bytes());
    buf.extend_from_slice(&(num_frames as i32).to_le_bytes());
    let mut observer = [0u8; 40];
    observer[..4].copy_from_slice(b"Test");
    buf.extend_from_slice(&observer);
    buf.extend_from_slice(&[0u8; 40]);
    buf.extend_from_slice(&[0u8; 40]);
    buf.extend_from_slice(&0u64.to_le_bytes());
    buf.extend_from_slice(&0u64.to_le_bytes());
    assert_eq!(buf.len(), SER_HEADER_SIZE);
    buf
}

/// Write bytes to a temporary file that lives as long as the handle.
pub fn write_temp(data: &[u8], suffix: &str) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    f.write_all(data).unwrap();
    f.flush().unwrap();
    f
}
