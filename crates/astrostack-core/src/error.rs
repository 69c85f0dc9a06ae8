use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid SER file: {0}")]
    InvalidSer(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Frame index {index} out of range (total: {total})")]
    FrameIndexOutOfRange { index: usize, total: usize },

    #[error("Unsupported color layout: {0}")]
    UnsupportedColorLayout(String),

    #[error("Dimension mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Unknown stacking algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Invalid algorithm setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("Invalid resource request: {0}")]
    InvalidResourceRequest(String),

    #[error(
        "Memory insufficient: {limit_bytes} bytes cannot hold a single band row \
         ({row_bytes} bytes per row after {fixed_bytes} bytes of fixed buffers), \
         increase the memory limit"
    )]
    MemoryInsufficient {
        limit_bytes: usize,
        fixed_bytes: usize,
        row_bytes: usize,
    },

    #[error("k-d tree queried before build_tree_structure was called")]
    TreeNotBuilt,

    #[error("k-d tree is already built, points can no longer be added")]
    TreeAlreadyBuilt,

    #[error("Alignment file line {line}: {reason}")]
    AlignmentFile { line: usize, reason: String },

    #[error("Hot pixel file line {line}: {reason}")]
    HotPixelFile { line: usize, reason: String },

    #[error("Invalid local shift record '{0}'")]
    InvalidLocalShift(String),

    #[error("Reference frame has only {found} usable stars, at least 4 are needed")]
    NotEnoughStars { found: usize },

    #[error("No planetary disk found: largest bright cluster has {area} pixels")]
    DiskNotFound { area: usize },

    #[error("Comet path needs {0}")]
    CometPath(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Empty frame sequence")]
    EmptySequence,
}

pub type Result<T> = std::result::Result<T, StackerError>;
