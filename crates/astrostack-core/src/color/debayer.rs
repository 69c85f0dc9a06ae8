use ndarray::Array2;

use crate::frame::{BayerPattern, ColorLayout, FrameData};

/// Interpolate a Bayer mosaic into three full-resolution planes.
///
/// Consumes the frame; non-mosaic frames are returned unchanged.
pub fn interpolate_colors(frame: FrameData) -> FrameData {
    match frame.layout {
        ColorLayout::Bayer(pattern) => {
            let [red, green, blue] = debayer_bilinear(&frame.planes[0], pattern);
            FrameData {
                planes: vec![red, green, blue],
                layout: ColorLayout::Rgb,
                metadata: frame.metadata,
            }
        }
        ColorLayout::Mono | ColorLayout::Rgb => frame,
    }
}

/// Bilinear demosaicing into `[red, green, blue]`.
pub fn debayer_bilinear(raw: &Array2<f32>, pattern: BayerPattern) -> [Array2<f32>; 3] {
    let (h, w) = raw.dim();
    let (r_row, r_col) = pattern.red_position();

    let mut red = Array2::<f32>::zeros((h, w));
    let mut green = Array2::<f32>::zeros((h, w));
    let mut blue = Array2::<f32>::zeros((h, w));

    for row in 0..h {
        let ri = row as isize;
        let is_red_row = (row % 2) == r_row;
        for col in 0..w {
            let ci = col as isize;
            let is_red_col = (col % 2) == r_col;

            let (r, g, b) = match (is_red_row, is_red_col) {
                (true, true) => (
                    raw[[row, col]],
                    avg_cross(raw, ri, ci),
                    avg_diagonal(raw, ri, ci),
                ),
                // Green on red row
                (true, false) => (
                    avg_horizontal(raw, ri, ci),
                    raw[[row, col]],
                    avg_vertical(raw, ri, ci),
                ),
                // Green on blue row
                (false, true) => (
                    avg_vertical(raw, ri, ci),
                    raw[[row, col]],
                    avg_horizontal(raw, ri, ci),
                ),
                (false, false) => (
                    avg_diagonal(raw, ri, ci),
                    avg_cross(raw, ri, ci),
                    raw[[row, col]],
                ),
            };
            red[[row, col]] = r;
            green[[row, col]] = g;
            blue[[row, col]] = b;
        }
    }

    [red, green, blue]
}

/// Mirrored indexing into the mosaic; reflection keeps the CFA parity at the edges.
#[inline]
fn px(raw: &Array2<f32>, row: isize, col: isize) -> f32 {
    let (h, w) = raw.dim();
    raw[[mirror(row, h), mirror(col, w)]]
}

#[inline]
fn mirror(i: isize, n: usize) -> usize {
    let n = n as isize;
    let reflected = if i < 0 {
        -i
    } else if i >= n {
        2 * (n - 1) - i
    } else {
        i
    };
    reflected.clamp(0, n - 1) as usize
}

/// Average of 4 cross (cardinal) neighbours.
#[inline]
fn avg_cross(raw: &Array2<f32>, r: isize, c: isize) -> f32 {
    (px(raw, r - 1, c) + px(raw, r + 1, c) + px(raw, r, c - 1) + px(raw, r, c + 1)) * 0.25
}

/// Average of 4 diagonal neighbours.
#[inline]
fn avg_diagonal(raw: &Array2<f32>, r: isize, c: isize) -> f32 {
    (px(raw, r - 1, c - 1)
        + px(raw, r - 1, c + 1)
        + px(raw, r + 1, c - 1)
        + px(raw, r + 1, c + 1))
        * 0.25
}

#[inline]
fn avg_horizontal(raw: &Array2<f32>, r: isize, c: isize) -> f32 {
    (px(raw, r, c - 1) + px(raw, r, c + 1)) * 0.5
}

#[inline]
fn avg_vertical(raw: &Array2<f32>, r: isize, c: isize) -> f32 {
    (px(raw, r - 1, c) + px(raw, r + 1, c)) * 0.5
}
