pub mod align;
pub mod calibration;
pub mod color;
pub mod consts;
pub mod detection;
pub mod error;
pub mod frame;
pub mod io;
pub mod progress;
pub mod quality;
pub mod scheduler;
pub mod spatial;
pub mod stack;
