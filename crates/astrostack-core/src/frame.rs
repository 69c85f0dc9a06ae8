use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::consts::{LUMINANCE_B, LUMINANCE_G, LUMINANCE_R};
use crate::error::Result;

/// Identifies one exposure: a file plus an optional frame index inside a video.
///
/// Still images use `frame_number = -1`. Ordering is by path, then frame
/// number, so the type can key ordered maps.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InputFrame {
    pub path: PathBuf,
    pub frame_number: i32,
}

impl InputFrame {
    pub fn still(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frame_number: -1,
        }
    }

    pub fn video(path: impl Into<PathBuf>, frame_number: i32) -> Self {
        Self {
            path: path.into(),
            frame_number,
        }
    }

    pub fn is_video_frame(&self) -> bool {
        self.frame_number >= 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for InputFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_video_frame() {
            write!(f, "{}#{}", self.path.display(), self.frame_number)
        } else {
            write!(f, "{}", self.path.display())
        }
    }
}

/// 2x2 color filter array arrangement, named by the top-left cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum BayerPattern {
    RGGB,
    GRBG,
    GBRG,
    BGGR,
}

impl BayerPattern {
    /// Returns `(row_parity, col_parity)` of the red pixel within the 2x2 cell.
    pub fn red_position(self) -> (usize, usize) {
        match self {
            Self::RGGB => (0, 0),
            Self::GRBG => (0, 1),
            Self::GBRG => (1, 0),
            Self::BGGR => (1, 1),
        }
    }

    /// Color label (0=R, 1=G, 2=B) of the mosaic pixel at `(x, y)`.
    pub fn color_at(self, x: usize, y: usize) -> u8 {
        let (r_row, r_col) = self.red_position();
        match ((y % 2) == r_row, (x % 2) == r_col) {
            (true, true) => 0,
            (false, false) => 2,
            _ => 1,
        }
    }

    /// Pattern seen by a crop starting `rows` rows further down the sensor.
    pub fn offset_rows(self, rows: usize) -> Self {
        if rows % 2 == 0 {
            return self;
        }
        match self {
            Self::RGGB => Self::GBRG,
            Self::GBRG => Self::RGGB,
            Self::GRBG => Self::BGGR,
            Self::BGGR => Self::GRBG,
        }
    }
}

/// How the planes of a decoded frame map to color channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorLayout {
    /// One plane, one channel.
    Mono,
    /// One raw mosaic plane, three output channels.
    Bayer(BayerPattern),
    /// Three planes in R, G, B order.
    Rgb,
}

impl ColorLayout {
    /// Number of color channels a stack of this layout produces.
    pub fn n_colors(self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Bayer(_) | Self::Rgb => 3,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FrameMetadata {
    pub bit_depth: u8,
    /// Capture time from the SER trailer, in 100 ns ticks.
    pub timestamp: Option<u64>,
}

/// A decoded frame. Pixel values are f32 in [0.0, 1.0].
#[derive(Clone, Debug)]
pub struct FrameData {
    /// One plane for mono and mosaic layouts, three for RGB.
    pub planes: Vec<Array2<f32>>,
    pub layout: ColorLayout,
    pub metadata: FrameMetadata,
}

impl FrameData {
    pub fn mono(data: Array2<f32>) -> Self {
        Self {
            planes: vec![data],
            layout: ColorLayout::Mono,
            metadata: FrameMetadata::default(),
        }
    }

    pub fn bayer(data: Array2<f32>, pattern: BayerPattern) -> Self {
        Self {
            planes: vec![data],
            layout: ColorLayout::Bayer(pattern),
            metadata: FrameMetadata::default(),
        }
    }

    pub fn rgb(red: Array2<f32>, green: Array2<f32>, blue: Array2<f32>) -> Self {
        Self {
            planes: vec![red, green, blue],
            layout: ColorLayout::Rgb,
            metadata: FrameMetadata::default(),
        }
    }

    pub fn width(&self) -> usize {
        self.planes[0].ncols()
    }

    pub fn height(&self) -> usize {
        self.planes[0].nrows()
    }

    pub fn n_colors(&self) -> usize {
        self.layout.n_colors()
    }

    /// Copy of sensor rows `rows`, keeping the color phase of mosaics.
    pub fn crop_rows(&self, rows: Range<usize>) -> Self {
        let layout = match self.layout {
            ColorLayout::Bayer(pattern) => ColorLayout::Bayer(pattern.offset_rows(rows.start)),
            other => other,
        };
        Self {
            planes: self
                .planes
                .iter()
                .map(|plane| plane.slice(s![rows.clone(), ..]).to_owned())
                .collect(),
            layout,
            metadata: self.metadata.clone(),
        }
    }

    /// Per-pixel color label of the first plane.
    pub fn color_at(&self, x: usize, y: usize) -> u8 {
        match self.layout {
            ColorLayout::Bayer(pattern) => pattern.color_at(x, y),
            ColorLayout::Mono | ColorLayout::Rgb => 0,
        }
    }

    /// Monochrome brightness plane used for star extraction and ranking.
    ///
    /// Mosaics are used as-is; RGB frames are reduced with BT.601 weights.
    pub fn brightness(&self) -> Array2<f32> {
        match self.layout {
            ColorLayout::Mono | ColorLayout::Bayer(_) => self.planes[0].clone(),
            ColorLayout::Rgb => {
                let (r, g, b) = (&self.planes[0], &self.planes[1], &self.planes[2]);
                let mut data = Array2::<f32>::zeros(r.dim());
                ndarray::Zip::from(&mut data)
                    .and(r)
                    .and(g)
                    .and(b)
                    .for_each(|out, &r, &g, &b| {
                        *out = LUMINANCE_R * r + LUMINANCE_G * g + LUMINANCE_B * b;
                    });
                data
            }
        }
    }
}

/// Decodes frames on demand.
///
/// Implementations must be shareable between stacking threads.
pub trait FrameReader: Send + Sync {
    fn read_frame(&self, frame: &InputFrame) -> Result<FrameData>;
}
