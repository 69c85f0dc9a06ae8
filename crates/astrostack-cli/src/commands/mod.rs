pub mod align;
pub mod config;
pub mod hot_pixels;
pub mod master;
pub mod stack;
