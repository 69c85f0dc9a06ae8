pub mod config;
pub mod fill;
pub mod master;
pub mod order_statistic;
pub mod output;
pub mod selection;
pub mod stacker;
pub mod streaming;

pub use config::{
    parse_settings, CenterParams, CutOffParams, FrameSelection, KappaSigmaParams, QuantileParams,
    StackingAlgorithm, StackingConfig,
};
pub use fill::fill_empty_pixels;
pub use master::{default_master_algorithm, stack_calibration_frames};
pub use order_statistic::reduce_pixel;
pub use output::StackedImage;
pub use selection::select_frames;
pub use stacker::Stacker;
pub use streaming::{StreamingReducer, StreamingShard};
