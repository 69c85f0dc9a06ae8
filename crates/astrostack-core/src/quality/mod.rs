pub mod gradient;
pub mod laplacian;

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::detection::otsu_threshold;
use crate::error::StackerError;

pub use gradient::sobel_mean;
pub use laplacian::laplacian_variance;

/// Score used to rank frames; higher is better.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FocusMeasure {
    /// Variance of the Laplacian, for star fields and fine surface detail.
    #[default]
    LaplacianVariance,
    /// Mean Sobel gradient magnitude; less sensitive to single-pixel noise.
    Gradient,
    /// Percentage of pixels above the Otsu threshold, for planetary frames
    /// where seeing shows up as how much of the field the disk covers.
    DiskCoverage,
}

impl FocusMeasure {
    pub const NAMES: &'static [&'static str] = &["laplacian-variance", "gradient", "disk-coverage"];

    pub fn name(self) -> &'static str {
        match self {
            Self::LaplacianVariance => "laplacian-variance",
            Self::Gradient => "gradient",
            Self::DiskCoverage => "disk-coverage",
        }
    }

    pub fn score(self, data: ArrayView2<'_, f32>) -> f64 {
        match self {
            Self::LaplacianVariance => laplacian_variance(data),
            Self::Gradient => sobel_mean(data),
            Self::DiskCoverage => disk_coverage(data),
        }
    }
}

impl fmt::Display for FocusMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FocusMeasure {
    type Err = StackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "laplacian-variance" | "laplacian" => Ok(Self::LaplacianVariance),
            "gradient" | "sobel" => Ok(Self::Gradient),
            "disk-coverage" => Ok(Self::DiskCoverage),
            _ => Err(StackerError::InvalidSetting {
                key: "focus_measure".to_string(),
                reason: format!("'{s}' is not one of {}", Self::NAMES.join(", ")),
            }),
        }
    }
}

/// Percentage of pixels strictly above the Otsu threshold.
pub fn disk_coverage(data: ArrayView2<'_, f32>) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let threshold = otsu_threshold(data);
    let above = data.iter().filter(|&&v| v > threshold).count();
    100.0 * above as f64 / data.len() as f64
}
