use crate::consts::EMPTY_PIXEL;

use super::config::StackingAlgorithm;

/// Running reduction that needs no per-frame history.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StreamingReducer {
    Mean,
    Maximum,
    Minimum,
    /// Standard deviation of the contributions.
    Rms,
    /// Contribution closest to `central_value`.
    Center { central_value: f64 },
}

impl StreamingReducer {
    /// The streaming form of `algorithm`, `None` for order-statistic algorithms.
    pub fn for_algorithm(algorithm: &StackingAlgorithm) -> Option<Self> {
        match algorithm {
            StackingAlgorithm::Average => Some(Self::Mean),
            StackingAlgorithm::Maximum => Some(Self::Maximum),
            StackingAlgorithm::Minimum => Some(Self::Minimum),
            StackingAlgorithm::Rms => Some(Self::Rms),
            StackingAlgorithm::Center(params) => Some(Self::Center {
                central_value: params.central_value as f64,
            }),
            _ => None,
        }
    }
}

/// Accumulators for one band, owned by one worker at a time.
///
/// `primary` holds the sum, extreme or closest value; `secondary` holds the
/// sum of squares (RMS) or the distance to the center value.
#[derive(Clone, Debug)]
pub struct StreamingShard {
    reducer: StreamingReducer,
    primary: Vec<f64>,
    secondary: Vec<f64>,
    counts: Vec<u32>,
}

impl StreamingShard {
    pub fn new(reducer: StreamingReducer, len: usize) -> Self {
        let (primary, secondary) = match reducer {
            StreamingReducer::Maximum => (f64::NEG_INFINITY, 0.0),
            StreamingReducer::Minimum => (f64::INFINITY, 0.0),
            StreamingReducer::Center { .. } => (0.0, f64::INFINITY),
            StreamingReducer::Mean | StreamingReducer::Rms => (0.0, 0.0),
        };
        Self {
            reducer,
            primary: vec![primary; len],
            secondary: vec![secondary; len],
            counts: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Add one contribution. Empty samples are ignored.
    pub fn accept(&mut self, index: usize, value: f32) {
        if value == EMPTY_PIXEL {
            return;
        }
        self.accept_weighted(index, value as f64, value as f64 * value as f64, 1);
    }

    /// Fold another shard of the same reducer and size into this one.
    pub fn merge(&mut self, other: &StreamingShard) {
        for i in 0..other.len() {
            if other.counts[i] > 0 {
                self.accept_weighted(i, other.primary[i], other.secondary[i], other.counts[i]);
            }
        }
    }

    /// Final value at `index`, [`EMPTY_PIXEL`] when nothing contributed.
    pub fn finalize(&self, index: usize) -> f64 {
        let count = self.counts[index];
        if count == 0 {
            return EMPTY_PIXEL as f64;
        }
        let n = count as f64;
        match self.reducer {
            StreamingReducer::Mean => self.primary[index] / n,
            StreamingReducer::Rms => {
                let mean = self.primary[index] / n;
                (self.secondary[index] / n - mean * mean).max(0.0).sqrt()
            }
            StreamingReducer::Maximum | StreamingReducer::Minimum | StreamingReducer::Center { .. } => {
                self.primary[index]
            }
        }
    }

    /// `primary`/`secondary` are a single sample (count 1) or a partial
    /// accumulation from another shard.
    fn accept_weighted(&mut self, i: usize, primary: f64, secondary: f64, count: u32) {
        match self.reducer {
            StreamingReducer::Mean => self.primary[i] += primary,
            StreamingReducer::Rms => {
                self.primary[i] += primary;
                self.secondary[i] += secondary;
            }
            StreamingReducer::Maximum => self.primary[i] = self.primary[i].max(primary),
            StreamingReducer::Minimum => self.primary[i] = self.primary[i].min(primary),
            StreamingReducer::Center { central_value } => {
                let distance = (primary - central_value).abs();
                let current = self.secondary[i];
                if distance < current || (distance == current && primary < self.primary[i]) {
                    self.primary[i] = primary;
                    self.secondary[i] = distance;
                }
            }
        }
        self.counts[i] += count;
    }
}
