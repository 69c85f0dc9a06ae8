pub mod components;
pub mod stars;
pub mod threshold;

pub use stars::{find_stars, threshold_for_fraction, Star};
pub use threshold::otsu_threshold;
