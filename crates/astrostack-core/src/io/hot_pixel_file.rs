use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::calibration::HotPixelIdentifier;
use crate::error::{Result, StackerError};

/// Write hot pixel coordinates, one `x | y` pair per line.
pub fn save_hot_pixels(identifier: &HotPixelIdentifier, path: &Path) -> Result<()> {
    let mut pixels: Vec<(usize, usize)> = identifier.hot_pixels().collect();
    pixels.sort_unstable_by_key(|&(x, y)| (y, x));

    let mut out = String::new();
    for (x, y) in &pixels {
        let _ = writeln!(out, "{x} | {y}");
    }
    fs::write(path, out)?;
    info!(path = %path.display(), hot_pixels = pixels.len(), "Saved hot pixels");
    Ok(())
}

/// Read a hot pixel file written by [`save_hot_pixels`]. Blank lines and
/// `#` comments are skipped.
pub fn load_hot_pixels(path: &Path) -> Result<HotPixelIdentifier> {
    let text = fs::read_to_string(path)?;
    let mut pixels = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let error = |reason: &str| StackerError::HotPixelFile {
            line: i + 1,
            reason: reason.to_string(),
        };
        let (x, y) = line.split_once('|').ok_or_else(|| error("expected 'x | y'"))?;
        let x = x.trim().parse().map_err(|_| error("invalid x coordinate"))?;
        let y = y.trim().parse().map_err(|_| error("invalid y coordinate"))?;
        pixels.push((x, y));
    }
    Ok(HotPixelIdentifier::with_hot_pixels(pixels))
}
