/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum frame count to use frame-level Rayon parallelism.
pub const PARALLEL_FRAME_THRESHOLD: usize = 4;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f32 = 1e-10;

/// ITU-R BT.601 luminance coefficient for the red channel.
pub const LUMINANCE_R: f32 = 0.299;

/// ITU-R BT.601 luminance coefficient for the green channel.
pub const LUMINANCE_G: f32 = 0.587;

/// ITU-R BT.601 luminance coefficient for the blue channel.
pub const LUMINANCE_B: f32 = 0.114;

/// Marker for "no contribution" in per-pixel value arrays and stacked output.
pub const EMPTY_PIXEL: f32 = -1.0;

/// Number of nearest anchors consulted when interpolating local shifts.
pub const LOCAL_SHIFT_NEIGHBORS: usize = 3;

/// Number of nearest reference hashes tried per candidate asterism.
pub const ASTERISM_MATCH_CANDIDATES: usize = 4;

/// Reference stars whose 4-combinations are all hashed (C(20,4) = 4845).
pub const REFERENCE_COMBINATION_STARS: usize = 20;

/// Extra random 4-combinations hashed from the full reference star list.
pub const RANDOM_REFERENCE_ASTERISMS: usize = 2000;

/// Seed for the random reference asterisms, so catalogs are reproducible.
pub const REFERENCE_ASTERISM_SEED: u64 = 0x5eed_a57e;

/// Fraction of brightest pixels considered part of a star.
pub const DEFAULT_STAR_PIXEL_FRACTION: f32 = 0.0005;

/// Stars smaller than this many pixels are ignored in the reference frame.
pub const MIN_REFERENCE_STAR_SIZE: usize = 9;

/// Rank of the reference star whose size becomes the minimum star size.
pub const REFERENCE_STAR_SIZE_RANK: usize = 25;

/// Maximum number of reference stars kept for matching.
pub const MAX_REFERENCE_STARS: usize = 50;

/// Maximum number of candidate stars per frame (bounds the 4-combination count).
pub const MAX_CANDIDATE_STARS: usize = 20;

/// Candidate stars must be this many times the reference minimum size.
pub const CANDIDATE_STAR_SIZE_FACTOR: f32 = 1.3;

/// Minimum number of paired stars for a plate-solve hypothesis.
pub const MIN_PAIRED_STARS: usize = 6;

/// Hot pixel candidate: value must reach this fraction of the frame maximum.
pub const HOT_PIXEL_MAX_FRACTION: f32 = 0.8;

/// Hot pixel candidate: all 8 neighbors must stay below this fraction of it.
pub const HOT_PIXEL_NEIGHBOR_FRACTION: f32 = 0.52;

/// A pixel is hot if it is a candidate in more than this fraction of frames.
pub const HOT_PIXEL_FRAME_FRACTION: f32 = 0.5;

/// Bytes held per pixel per frame by order-statistic stackers.
pub const ORDER_STATISTIC_SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// Bytes held per pixel per thread shard by streaming stackers.
pub const STREAMING_ACCUMULATOR_BYTES: usize =
    2 * std::mem::size_of::<f64>() + std::mem::size_of::<u32>();

/// Bytes per pixel of the stacked output image.
pub const STACKED_PIXEL_BYTES: usize = std::mem::size_of::<f64>();

/// Bytes per pixel of one in-flight calibrated photo (value plus score).
pub const CALIBRATED_PIXEL_BYTES: usize = 2 * std::mem::size_of::<f32>();

/// Extra sensor rows calibrated around a band so hot pixel repair and
/// color interpolation see their full neighborhoods.
pub const CALIBRATION_ROW_MARGIN: usize = 4;

/// Default alignment point box size in pixels (surface alignment).
pub const DEFAULT_AP_SIZE: usize = 64;

/// Default alignment point search radius in pixels (surface alignment).
pub const DEFAULT_AP_SEARCH_RADIUS: usize = 16;

/// Default minimum mean brightness for a valid alignment point.
pub const DEFAULT_AP_MIN_BRIGHTNESS: f32 = 0.05;

/// Histogram bins used for Otsu thresholding.
pub const OTSU_HISTOGRAM_BINS: usize = 256;

/// Planetary disk threshold never drops below this fraction of the peak.
pub const PLANETARY_MIN_THRESHOLD_FRACTION: f32 = 0.05;

/// Border (px) added around the planetary disk's bounding box.
pub const PLANETARY_WINDOW_BORDER: usize = 10;

/// Smallest bright cluster (px) accepted as a planetary disk.
pub const PLANETARY_MIN_DISK_SIZE: usize = 10;

/// A detected cluster within this distance (px) of the predicted comet
/// position is taken as the comet.
pub const COMET_MATCH_RADIUS: f32 = 5.0;

/// SER timestamp ticks per second.
pub const SER_TICKS_PER_SECOND: f64 = 1.0e7;
