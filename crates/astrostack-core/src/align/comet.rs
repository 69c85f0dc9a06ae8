//! Comet alignment: frames are plate-solved on the stars, then shifted so
//! the comet, moving along a straight path, stays put.

use tracing::debug;

use crate::consts::{COMET_MATCH_RADIUS, SER_TICKS_PER_SECOND};
use crate::detection::Star;
use crate::error::{Result, StackerError};
use crate::frame::FrameData;

use super::aligner::FrameAligner;
use super::result::AlignmentResult;
use super::star_aligner::StarAligner;

/// Comet position in reference-frame coordinates at a capture time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CometObservation {
    /// SER timestamp ticks.
    pub timestamp: u64,
    pub x: f32,
    pub y: f32,
}

impl CometObservation {
    /// Convert a position marked on `frame` to reference coordinates using
    /// the frame's star solution.
    pub fn from_frame(stars: &StarAligner, frame: &FrameData, x: f32, y: f32) -> Result<Self> {
        let timestamp = frame
            .metadata
            .timestamp
            .ok_or_else(|| StackerError::CometPath("a capture timestamp on every marked frame".to_string()))?;
        let result = stars.align(frame);
        if !result.is_valid {
            return Err(StackerError::CometPath("a star solution for every marked frame".to_string()));
        }
        let (x, y) = result.transformer().to_reference(x, y);
        Ok(Self { timestamp, x, y })
    }
}

/// Straight-line comet motion fitted by least squares.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CometPath {
    t0: u64,
    x0: f64,
    y0: f64,
    /// Pixels per second.
    vx: f64,
    vy: f64,
}

impl CometPath {
    /// Fit through observations taken at two or more distinct times.
    pub fn fit(observations: &[CometObservation]) -> Result<Self> {
        let Some(t0) = observations.iter().map(|o| o.timestamp).min() else {
            return Err(StackerError::CometPath("at least two positions".to_string()));
        };
        let seconds = |timestamp: u64| (timestamp as i128 - t0 as i128) as f64 / SER_TICKS_PER_SECOND;

        let n = observations.len() as f64;
        let (mut st, mut stt, mut sx, mut sy, mut stx, mut sty) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        for o in observations {
            let t = seconds(o.timestamp);
            let (x, y) = (o.x as f64, o.y as f64);
            st += t;
            stt += t * t;
            sx += x;
            sy += y;
            stx += t * x;
            sty += t * y;
        }
        let denominator = n * stt - st * st;
        if observations.len() < 2 || denominator <= 0.0 {
            return Err(StackerError::CometPath("positions at two or more distinct times".to_string()));
        }
        let vx = (n * stx - st * sx) / denominator;
        let vy = (n * sty - st * sy) / denominator;
        let path = Self {
            t0,
            x0: (sx - vx * st) / n,
            y0: (sy - vy * st) / n,
            vx,
            vy,
        };
        debug!(x0 = path.x0, y0 = path.y0, vx, vy, points = observations.len(), "Fitted comet path");
        Ok(path)
    }

    pub fn position_at(&self, timestamp: u64) -> (f32, f32) {
        let t = (timestamp as i128 - self.t0 as i128) as f64 / SER_TICKS_PER_SECOND;
        ((self.x0 + self.vx * t) as f32, (self.y0 + self.vy * t) as f32)
    }

    /// Velocity in pixels per second.
    pub fn velocity(&self) -> (f32, f32) {
        (self.vx as f32, self.vy as f32)
    }
}

/// Star alignment followed by a shift that pins the comet to its reference position.
pub struct CometAligner {
    stars: StarAligner,
    path: CometPath,
    reference_position: (f32, f32),
}

impl CometAligner {
    /// `reference_position` is where the comet sits in the reference frame.
    pub fn new(stars: StarAligner, path: CometPath, reference_position: (f32, f32)) -> Self {
        Self {
            stars,
            path,
            reference_position,
        }
    }

    pub fn path(&self) -> &CometPath {
        &self.path
    }

    /// Comet position in reference coordinates for a solved frame: the
    /// detected cluster nearest the predicted position when one lies within
    /// [`COMET_MATCH_RADIUS`], the prediction otherwise.
    fn comet_position(&self, result: &AlignmentResult, clusters: &[Star], timestamp: u64) -> (f32, f32) {
        let expected = self.path.position_at(timestamp);
        let transformer = result.transformer();
        clusters
            .iter()
            .map(|star| transformer.to_reference(star.x, star.y))
            .map(|(x, y)| ((x, y), (x - expected.0).powi(2) + (y - expected.1).powi(2)))
            .filter(|&(_, d2)| d2 < COMET_MATCH_RADIUS * COMET_MATCH_RADIUS)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map_or(expected, |(position, _)| position)
    }
}

impl FrameAligner for CometAligner {
    fn align_frame(&self, frame: &FrameData) -> Result<AlignmentResult> {
        let (mut result, clusters) = self.stars.align_with_stars(frame);
        if !result.is_valid {
            return Ok(result);
        }
        let Some(timestamp) = frame.metadata.timestamp else {
            debug!("Frame has no timestamp, comet cannot be placed");
            return Ok(AlignmentResult::invalid().with_ranking(result.ranking));
        };
        let (x, y) = self.comet_position(&result, &clusters, timestamp);
        result.shift_x -= x - self.reference_position.0;
        result.shift_y -= y - self.reference_position.1;
        Ok(result)
    }
}
