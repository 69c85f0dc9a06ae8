use std::path::Path;

use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb};
use ndarray::Array2;

use crate::error::{Result, StackerError};
use crate::frame::{FrameData, FrameMetadata};
use crate::stack::StackedImage;

/// Load a still image. Color images become three planes, everything else
/// one mono plane, normalized from 16 bits.
pub fn load_image(path: &Path) -> Result<FrameData> {
    let img = image::open(path)?;
    let bit_depth = (img.color().bits_per_pixel() / u16::from(img.color().channel_count())) as u8;

    let mut frame = if img.color().has_color() {
        let rgb = img.to_rgb16();
        let (w, h) = rgb.dimensions();
        let plane = |c: usize| {
            Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
                rgb.get_pixel(col as u32, row as u32).0[c] as f32 / 65535.0
            })
        };
        FrameData::rgb(plane(0), plane(1), plane(2))
    } else {
        let gray = img.to_luma16();
        let (w, h) = gray.dimensions();
        FrameData::mono(Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
            gray.get_pixel(col as u32, row as u32).0[0] as f32 / 65535.0
        }))
    };
    frame.metadata = FrameMetadata {
        bit_depth,
        timestamp: None,
    };
    Ok(frame)
}

/// Save a stacked image, choosing format from the file extension.
///
/// Values are clamped to [0, 1]; empty pixels are written as black.
pub fn save_stacked(image: &StackedImage, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => save_png(image, path),
        _ => save_tiff(image, path),
    }
}

/// Save as 16-bit grayscale or RGB TIFF.
pub fn save_tiff(image: &StackedImage, path: &Path) -> Result<()> {
    let (w, h) = (image.width as u32, image.height as u32);
    let sample = |c: usize, x: u32, y: u32| to_u16(image.channels[c][[y as usize, x as usize]]);
    let dynamic = match image.n_colors() {
        1 => DynamicImage::ImageLuma16(ImageBuffer::<Luma<u16>, _>::from_fn(w, h, |x, y| {
            Luma([sample(0, x, y)])
        })),
        3 => DynamicImage::ImageRgb16(ImageBuffer::<Rgb<u16>, _>::from_fn(w, h, |x, y| {
            Rgb([sample(0, x, y), sample(1, x, y), sample(2, x, y)])
        })),
        n => return Err(unsupported_channels(n)),
    };
    dynamic.save_with_format(path, ImageFormat::Tiff)?;
    Ok(())
}

/// Save as 8-bit grayscale or RGB PNG.
pub fn save_png(image: &StackedImage, path: &Path) -> Result<()> {
    let (w, h) = (image.width as u32, image.height as u32);
    let sample = |c: usize, x: u32, y: u32| to_u8(image.channels[c][[y as usize, x as usize]]);
    let dynamic = match image.n_colors() {
        1 => DynamicImage::ImageLuma8(ImageBuffer::<Luma<u8>, _>::from_fn(w, h, |x, y| {
            Luma([sample(0, x, y)])
        })),
        3 => DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, _>::from_fn(w, h, |x, y| {
            Rgb([sample(0, x, y), sample(1, x, y), sample(2, x, y)])
        })),
        n => return Err(unsupported_channels(n)),
    };
    dynamic.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

fn to_u16(v: f64) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0).round() as u16
}

fn to_u8(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn unsupported_channels(n: usize) -> StackerError {
    StackerError::UnsupportedColorLayout(format!("cannot write an image with {n} channels"))
}
