pub mod alignment_file;
pub mod hot_pixel_file;
pub mod image_io;
pub mod reader;
pub mod ser;

pub use alignment_file::AlignmentFile;
pub use hot_pixel_file::{load_hot_pixels, save_hot_pixels};
pub use image_io::{load_image, save_stacked};
pub use reader::{expand_inputs, is_video_file, FileFrameReader};
pub use ser::{SerHeader, SerReader};
