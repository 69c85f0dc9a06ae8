/// Stacking stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackingStage {
    Alignment,
    HotPixels,
    Calibration,
    Filling,
    Writing,
}

impl std::fmt::Display for StackingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alignment => write!(f, "Aligning frames"),
            Self::HotPixels => write!(f, "Identifying hot pixels"),
            Self::Calibration => write!(f, "Calibrating frames"),
            Self::Filling => write!(f, "Filling empty pixels"),
            Self::Writing => write!(f, "Writing output"),
        }
    }
}

/// Thread-safe progress reporting.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (e.g., frame count), if known.
    fn begin_stage(&self, _stage: StackingStage, _total_items: Option<usize>) {}

    /// Work items within the current stage have completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// Progress reporter that ignores every event.
pub struct NoOpReporter;

impl ProgressReporter for NoOpReporter {}
