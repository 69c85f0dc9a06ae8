use std::fs::File;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use ndarray::Array2;

use crate::error::{Result, StackerError};
use crate::frame::{BayerPattern, ColorLayout, FrameData, FrameMetadata};

pub const SER_HEADER_SIZE: usize = 178;
const SER_MAGIC: &[u8; 14] = b"LUCAM-RECORDER";

/// SER file header (178 bytes).
#[derive(Clone, Debug)]
pub struct SerHeader {
    pub color_id: i32,
    pub little_endian: bool,
    pub width: u32,
    pub height: u32,
    pub pixel_depth: u32,
    pub frame_count: u32,
    pub observer: String,
    pub instrument: String,
    pub telescope: String,
    pub date_time: u64,
    pub date_time_utc: u64,
}

impl SerHeader {
    /// Bytes per pixel plane (1 for 8-bit, 2 for 9-16 bit).
    pub fn bytes_per_pixel_plane(&self) -> usize {
        if self.pixel_depth <= 8 { 1 } else { 2 }
    }

    /// Number of planes per pixel (1 for mono/bayer, 3 for RGB/BGR).
    pub fn planes_per_pixel(&self) -> usize {
        match self.color_id {
            100 | 101 => 3,
            _ => 1,
        }
    }

    pub fn frame_byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel_plane() * self.planes_per_pixel()
    }

    pub fn layout(&self) -> Result<ColorLayout> {
        Ok(match self.color_id {
            0 => ColorLayout::Mono,
            8 => ColorLayout::Bayer(BayerPattern::RGGB),
            9 => ColorLayout::Bayer(BayerPattern::GRBG),
            10 => ColorLayout::Bayer(BayerPattern::GBRG),
            11 => ColorLayout::Bayer(BayerPattern::BGGR),
            100 | 101 => ColorLayout::Rgb,
            other => {
                return Err(StackerError::UnsupportedColorLayout(format!(
                    "SER color id {other}"
                )))
            }
        })
    }
}

/// Memory-mapped SER video reader.
pub struct SerReader {
    mmap: Mmap,
    pub header: SerHeader,
}

impl SerReader {
    /// Open a SER file and parse its header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and the file is not modified while open.
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < SER_HEADER_SIZE {
            return Err(StackerError::InvalidSer("File too small for SER header".into()));
        }
        if &mmap[0..14] != SER_MAGIC {
            return Err(StackerError::InvalidSer("Missing LUCAM-RECORDER magic".into()));
        }

        let header = parse_header(&mmap[..SER_HEADER_SIZE])?;
        header.layout()?;

        let expected_data_size = (header.frame_count as usize)
            .checked_mul(header.frame_byte_size())
            .and_then(|frames| frames.checked_add(SER_HEADER_SIZE))
            .ok_or_else(|| StackerError::InvalidSer("Frame data size overflows".into()))?;
        if mmap.len() < expected_data_size {
            return Err(StackerError::InvalidSer(format!(
                "File truncated: expected at least {} bytes, got {}",
                expected_data_size,
                mmap.len()
            )));
        }

        Ok(Self { mmap, header })
    }

    pub fn frame_count(&self) -> usize {
        self.header.frame_count as usize
    }

    /// Raw bytes of one frame, borrowed from the mapping.
    pub fn frame_raw(&self, index: usize) -> Result<&[u8]> {
        let count = self.frame_count();
        if index >= count {
            return Err(StackerError::FrameIndexOutOfRange { index, total: count });
        }
        let size = self.header.frame_byte_size();
        let offset = SER_HEADER_SIZE + index * size;
        Ok(&self.mmap[offset..offset + size])
    }

    /// Decode one frame into normalized planes.
    ///
    /// Mono and Bayer videos yield one plane, RGB and BGR videos yield red,
    /// green and blue planes.
    pub fn read_frame(&self, index: usize) -> Result<FrameData> {
        let raw = self.frame_raw(index)?;
        let h = self.header.height as usize;
        let w = self.header.width as usize;
        let layout = self.header.layout()?;
        let planes = self.header.planes_per_pixel();

        let decode = |plane| {
            decode_plane(
                raw,
                h,
                w,
                self.header.bytes_per_pixel_plane(),
                planes,
                plane,
                self.header.pixel_depth,
                self.header.little_endian,
            )
        };
        let planes = match (layout, self.header.color_id) {
            (ColorLayout::Rgb, 101) => vec![decode(2), decode(1), decode(0)],
            (ColorLayout::Rgb, _) => vec![decode(0), decode(1), decode(2)],
            _ => vec![decode(0)],
        };

        Ok(FrameData {
            planes,
            layout,
            metadata: FrameMetadata {
                bit_depth: self.header.pixel_depth as u8,
                timestamp: self.read_timestamp(index),
            },
        })
    }

    /// Per-frame timestamp from the optional trailer.
    fn read_timestamp(&self, index: usize) -> Option<u64> {
        let trailer_offset = SER_HEADER_SIZE + self.header.frame_byte_size() * self.frame_count();
        let ts_offset = trailer_offset + index * 8;
        if ts_offset + 8 <= self.mmap.len() {
            let bytes = &self.mmap[ts_offset..ts_offset + 8];
            Some(u64::from_le_bytes(bytes.try_into().ok()?))
        } else {
            None
        }
    }
}

fn parse_header(buf: &[u8]) -> Result<SerHeader> {
    let mut cursor = std::io::Cursor::new(&buf[14..]);

    let _lu_id = cursor.read_i32::<LittleEndian>()?;
    let color_id = cursor.read_i32::<LittleEndian>()?;
    let le_flag = cursor.read_i32::<LittleEndian>()?;
    let width = cursor.read_i32::<LittleEndian>()? as u32;
    let height = cursor.read_i32::<LittleEndian>()? as u32;
    let pixel_depth = cursor.read_i32::<LittleEndian>()? as u32;
    let frame_count = cursor.read_i32::<LittleEndian>()? as u32;

    let observer = read_fixed_string(&buf[42..82]);
    let instrument = read_fixed_string(&buf[82..122]);
    let telescope = read_fixed_string(&buf[122..162]);

    let mut cursor = std::io::Cursor::new(&buf[162..]);
    let date_time = cursor.read_u64::<LittleEndian>()?;
    let date_time_utc = cursor.read_u64::<LittleEndian>()?;

    if width == 0 || height == 0 {
        return Err(StackerError::InvalidDimensions { width, height });
    }
    if !(1..=16).contains(&pixel_depth) {
        return Err(StackerError::InvalidSer(format!("Unsupported pixel depth {pixel_depth}")));
    }

    // Most writers put 0 here for little-endian data even though the format
    // says otherwise; only an explicit 1 is read as big-endian.
    let little_endian = le_flag != 1;

    Ok(SerHeader {
        color_id,
        little_endian,
        width,
        height,
        pixel_depth,
        frame_count,
        observer,
        instrument,
        telescope,
        date_time,
        date_time_utc,
    })
}

fn read_fixed_string(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

/// Decode plane `plane_index` of `planes` interleaved planes.
#[allow(clippy::too_many_arguments)]
fn decode_plane(
    raw: &[u8],
    height: usize,
    width: usize,
    bytes_per_sample: usize,
    planes: usize,
    plane_index: usize,
    bit_depth: u32,
    little_endian: bool,
) -> Array2<f32> {
    let max_val = ((1u32 << bit_depth) - 1) as f32;
    Array2::from_shape_fn((height, width), |(row, col)| {
        let idx = ((row * width + col) * planes + plane_index) * bytes_per_sample;
        let val = if bytes_per_sample == 1 {
            raw[idx] as f32
        } else {
            let pair = [raw[idx], raw[idx + 1]];
            if little_endian {
                u16::from_le_bytes(pair) as f32
            } else {
                u16::from_be_bytes(pair) as f32
            }
        };
        (val / max_val).min(1.0)
    })
}
