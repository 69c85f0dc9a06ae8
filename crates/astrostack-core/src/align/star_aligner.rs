use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consts::{
    CANDIDATE_STAR_SIZE_FACTOR, DEFAULT_STAR_PIXEL_FRACTION, MAX_REFERENCE_STARS,
    MIN_REFERENCE_STAR_SIZE, REFERENCE_STAR_SIZE_RANK,
};
use crate::detection::stars::{keep_stars_above_size, sort_by_size};
use crate::detection::{find_stars, threshold_for_fraction, Star};
use crate::error::{Result, StackerError};
use crate::frame::FrameData;
use crate::quality::FocusMeasure;

use super::aligner::FrameAligner;
use super::plate_solver::{PlateSolver, PlateSolverConfig};
use super::result::AlignmentResult;

/// Star selection rules for the reference frame and for candidate frames.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StarDetectionConfig {
    /// Fraction of brightest pixels treated as star pixels.
    pub pixel_fraction: f32,
    pub min_reference_star_size: usize,
    /// Size of the star at this rank becomes the minimum star size.
    pub reference_size_rank: usize,
    pub max_reference_stars: usize,
    /// Candidate stars must be at least this multiple of the minimum size.
    pub candidate_size_factor: f32,
}

impl Default for StarDetectionConfig {
    fn default() -> Self {
        Self {
            pixel_fraction: DEFAULT_STAR_PIXEL_FRACTION,
            min_reference_star_size: MIN_REFERENCE_STAR_SIZE,
            reference_size_rank: REFERENCE_STAR_SIZE_RANK,
            max_reference_stars: MAX_REFERENCE_STARS,
            candidate_size_factor: CANDIDATE_STAR_SIZE_FACTOR,
        }
    }
}

/// Aligns frames to a reference frame by matching star asterisms.
pub struct StarAligner {
    solver: PlateSolver,
    detection: StarDetectionConfig,
    min_star_size: usize,
    focus_measure: FocusMeasure,
}

impl StarAligner {
    pub fn from_reference(
        reference: &FrameData,
        detection: StarDetectionConfig,
        solver_config: PlateSolverConfig,
    ) -> Result<Self> {
        let brightness = reference.brightness();
        let threshold = threshold_for_fraction(&brightness, detection.pixel_fraction);
        let mut stars = find_stars(&brightness, threshold);
        keep_stars_above_size(&mut stars, detection.min_reference_star_size);
        sort_by_size(&mut stars);

        let rank = detection.reference_size_rank.max(1);
        let min_star_size = stars
            .get(rank - 1)
            .or(stars.last())
            .map_or(detection.min_reference_star_size, |s| s.size);
        keep_stars_above_size(&mut stars, min_star_size);
        stars.truncate(detection.max_reference_stars);

        Self::from_stars(
            stars,
            reference.width(),
            reference.height(),
            min_star_size,
            detection,
            solver_config,
        )
    }

    /// Build from an already extracted reference star list.
    pub fn from_stars(
        mut stars: Vec<Star>,
        width: usize,
        height: usize,
        min_star_size: usize,
        detection: StarDetectionConfig,
        solver_config: PlateSolverConfig,
    ) -> Result<Self> {
        if stars.len() < 4 {
            return Err(StackerError::NotEnoughStars { found: stars.len() });
        }
        sort_by_size(&mut stars);
        info!(stars = stars.len(), min_star_size, "Reference stars selected");
        Ok(Self {
            solver: PlateSolver::new(stars, width, height, solver_config),
            detection,
            min_star_size,
            focus_measure: FocusMeasure::default(),
        })
    }

    /// Rank frames with `measure` instead of the Laplacian variance.
    pub fn with_focus_measure(mut self, measure: FocusMeasure) -> Self {
        self.focus_measure = measure;
        self
    }

    pub fn solver(&self) -> &PlateSolver {
        &self.solver
    }

    pub fn min_star_size(&self) -> usize {
        self.min_star_size
    }

    pub fn detection(&self) -> &StarDetectionConfig {
        &self.detection
    }

    /// Stars of a candidate frame, largest first, filtered by size.
    pub fn candidate_stars(&self, frame: &FrameData) -> Vec<Star> {
        self.stars_in(&frame.brightness())
    }

    fn stars_in(&self, brightness: &Array2<f32>) -> Vec<Star> {
        let threshold = threshold_for_fraction(brightness, self.detection.pixel_fraction);
        let mut stars = find_stars(brightness, threshold);
        let min_size = (self.min_star_size as f32 * self.detection.candidate_size_factor) as usize;
        keep_stars_above_size(&mut stars, min_size);
        sort_by_size(&mut stars);
        stars.truncate(self.solver.config().max_candidate_stars);
        stars
    }

    /// Plate-solve `frame` and attach its focus ranking.
    pub fn align(&self, frame: &FrameData) -> AlignmentResult {
        self.align_with_stars(frame).0
    }

    /// Same as [`StarAligner::align`], also returning the candidate stars
    /// the solution was searched with.
    pub fn align_with_stars(&self, frame: &FrameData) -> (AlignmentResult, Vec<Star>) {
        let brightness = frame.brightness();
        let stars = self.stars_in(&brightness);
        let result = self.solver.plate_solve(&stars);
        let ranking = self.focus_measure.score(brightness.view()) as f32;
        debug!(
            stars = stars.len(),
            valid = result.is_valid,
            ranking,
            "Aligned frame"
        );
        (result.with_ranking(ranking), stars)
    }
}

impl FrameAligner for StarAligner {
    fn align_frame(&self, frame: &FrameData) -> Result<AlignmentResult> {
        if frame.width() != self.solver.width() || frame.height() != self.solver.height() {
            return Err(StackerError::DimensionMismatch {
                expected_width: self.solver.width(),
                expected_height: self.solver.height(),
                width: frame.width(),
                height: frame.height(),
            });
        }
        Ok(self.align(frame))
    }
}
