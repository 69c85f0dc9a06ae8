use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StackerError};

/// Parameters of the kappa-sigma clipping family.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KappaSigmaParams {
    /// Values farther than `kappa` standard deviations from the mean are clipped (0.1..=10).
    pub kappa: f32,
    /// Number of clipping passes (1..=20).
    pub iterations: usize,
}

impl Default for KappaSigmaParams {
    fn default() -> Self {
        Self {
            kappa: 3.0,
            iterations: 3,
        }
    }
}

/// Parameters of the cut-off average.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutOffParams {
    /// Fraction of values dropped from each end of the sorted list (0..=0.45).
    pub tail_fraction: f32,
}

impl Default for CutOffParams {
    fn default() -> Self {
        Self { tail_fraction: 0.2 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantileParams {
    /// Selected rank as a fraction of the sorted list (0..=1, 0.5 = median).
    pub fraction: f32,
}

impl Default for QuantileParams {
    fn default() -> Self {
        Self { fraction: 0.5 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CenterParams {
    /// Target value on the normalized pixel scale.
    pub central_value: f32,
}

impl Default for CenterParams {
    fn default() -> Self {
        Self {
            central_value: 0.25,
        }
    }
}

/// Pixel combination algorithm together with its parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StackingAlgorithm {
    Average,
    Median,
    KappaSigmaMean(KappaSigmaParams),
    KappaSigmaMedian(KappaSigmaParams),
    CutOffAverage(CutOffParams),
    Maximum,
    Minimum,
    Center(CenterParams),
    Quantile(QuantileParams),
    Rms,
    WeightedMedian,
    WeightedBestScore,
}

impl Default for StackingAlgorithm {
    fn default() -> Self {
        Self::KappaSigmaMean(KappaSigmaParams::default())
    }
}

impl StackingAlgorithm {
    /// Every algorithm name accepted by [`StackingAlgorithm::from_name`].
    pub const NAMES: &'static [&'static str] = &[
        "average",
        "median",
        "kappa-sigma mean",
        "kappa-sigma median",
        "cut-off average",
        "maximum",
        "minimum",
        "center",
        "quantile",
        "rms",
        "weighted median",
        "weighted best score",
    ];

    /// Build an algorithm from its command-line name and `key=value` settings.
    ///
    /// Underscores in the name are read as spaces, and `quantil` is accepted
    /// for `quantile`. Settings the algorithm does not know, and values
    /// outside their range, are rejected.
    pub fn from_name(name: &str, settings: &BTreeMap<String, String>) -> Result<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('_', " ");
        let mut algorithm = match normalized.as_str() {
            "average" | "mean" => Self::Average,
            "median" => Self::Median,
            "kappa-sigma mean" => Self::KappaSigmaMean(KappaSigmaParams::default()),
            "kappa-sigma median" => Self::KappaSigmaMedian(KappaSigmaParams::default()),
            "cut-off average" => Self::CutOffAverage(CutOffParams::default()),
            "maximum" => Self::Maximum,
            "minimum" => Self::Minimum,
            "center" => Self::Center(CenterParams::default()),
            "quantile" | "quantil" => Self::Quantile(QuantileParams::default()),
            "rms" => Self::Rms,
            "weighted median" => Self::WeightedMedian,
            "weighted best score" | "best score" => Self::WeightedBestScore,
            _ => return Err(StackerError::UnknownAlgorithm(name.to_string())),
        };
        for (key, value) in settings {
            algorithm.apply_setting(key, value)?;
        }
        Ok(algorithm)
    }

    /// Command-line name of the algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::Median => "median",
            Self::KappaSigmaMean(_) => "kappa-sigma mean",
            Self::KappaSigmaMedian(_) => "kappa-sigma median",
            Self::CutOffAverage(_) => "cut-off average",
            Self::Maximum => "maximum",
            Self::Minimum => "minimum",
            Self::Center(_) => "center",
            Self::Quantile(_) => "quantile",
            Self::Rms => "rms",
            Self::WeightedMedian => "weighted median",
            Self::WeightedBestScore => "weighted best score",
        }
    }

    /// Whether every frame's value must be kept per pixel until the band is reduced.
    pub fn needs_order_statistics(&self) -> bool {
        !matches!(
            self,
            Self::Average | Self::Maximum | Self::Minimum | Self::Rms | Self::Center(_)
        )
    }

    /// Whether per-sample scores are stored next to the values.
    pub fn is_weighted(&self) -> bool {
        matches!(self, Self::WeightedMedian | Self::WeightedBestScore)
    }

    fn apply_setting(&mut self, key: &str, value: &str) -> Result<()> {
        match (self, key) {
            (Self::KappaSigmaMean(p) | Self::KappaSigmaMedian(p), "kappa") => {
                p.kappa = parse_in_range(key, value, 0.1, 10.0)?;
            }
            (
                Self::KappaSigmaMean(p) | Self::KappaSigmaMedian(p),
                "n_iterations" | "iterations",
            ) => {
                let iterations: f32 = parse_in_range(key, value, 1.0, 20.0)?;
                if iterations.fract() != 0.0 {
                    return Err(invalid(key, "must be a whole number"));
                }
                p.iterations = iterations as usize;
            }
            (Self::CutOffAverage(p), "tail_fraction_to_cut_off" | "tail_fraction") => {
                p.tail_fraction = parse_in_range(key, value, 0.0, 0.45)?;
            }
            (Self::Quantile(p), "quantil_fraction" | "quantile_fraction" | "fraction") => {
                p.fraction = parse_in_range(key, value, 0.0, 1.0)?;
            }
            (Self::Center(p), "central_value") => {
                p.central_value = parse_in_range(key, value, 0.0, 1.0)?;
            }
            (algorithm, _) => {
                return Err(invalid(
                    key,
                    &format!("not a setting of '{}'", algorithm.name()),
                ))
            }
        }
        Ok(())
    }
}

impl fmt::Display for StackingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse `key=value;key=value` algorithm settings.
pub fn parse_settings(settings: &str) -> Result<BTreeMap<String, String>> {
    let mut parsed = BTreeMap::new();
    for entry in settings.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| invalid(entry, "expected key=value"))?;
        parsed.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(parsed)
}

fn parse_in_range(key: &str, value: &str, min: f32, max: f32) -> Result<f32> {
    let parsed: f32 = value
        .parse()
        .map_err(|_| invalid(key, &format!("'{value}' is not a number")))?;
    if !(min..=max).contains(&parsed) {
        return Err(invalid(key, &format!("{parsed} is outside {min}..={max}")));
    }
    Ok(parsed)
}

fn invalid(key: &str, reason: &str) -> StackerError {
    StackerError::InvalidSetting {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Which aligned frames take part in the stack.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FrameSelection {
    All,
    /// Keep the `count` best-ranked frames.
    Best { count: usize },
    /// Keep the best-ranked fraction of frames (0..=1).
    BestFraction { fraction: f32 },
}

impl Default for FrameSelection {
    fn default() -> Self {
        Self::All
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackingConfig {
    pub algorithm: StackingAlgorithm,
    /// Worker threads; also the most calibrated photos held at once.
    pub n_cpu: usize,
    /// Memory ceiling for banded stacking; `None` stacks in a single band.
    pub memory_limit_mb: Option<usize>,
    /// Debayer raw mosaics before resampling.
    pub interpolate_colors: bool,
    pub selection: FrameSelection,
}

impl Default for StackingConfig {
    fn default() -> Self {
        Self {
            algorithm: StackingAlgorithm::default(),
            n_cpu: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            memory_limit_mb: None,
            interpolate_colors: false,
            selection: FrameSelection::All,
        }
    }
}
