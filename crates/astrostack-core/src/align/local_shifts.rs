use std::fmt;
use std::str::FromStr;

use crate::consts::LOCAL_SHIFT_NEIGHBORS;
use crate::error::{Result, StackerError};
use crate::spatial::KdTree;

/// Positional correction measured at one alignment point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalShift {
    pub x: i32,
    pub y: i32,
    pub dx: i32,
    pub dy: i32,
    pub valid_ap: bool,
    pub score: f32,
}

impl fmt::Display for LocalShift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.x,
            self.y,
            self.dx,
            self.dy,
            u8::from(self.valid_ap),
            self.score
        )
    }
}

impl FromStr for LocalShift {
    type Err = StackerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || StackerError::InvalidLocalShift(s.to_string());
        let fields: Vec<&str> = s.split(',').map(str::trim).collect();
        if fields.len() != 6 {
            return Err(invalid());
        }
        let int = |i: usize| fields[i].parse::<i32>().map_err(|_| invalid());
        let valid_ap = match fields[4] {
            "1" | "true" => true,
            "0" | "false" => false,
            _ => return Err(invalid()),
        };
        Ok(Self {
            x: int(0)?,
            y: int(1)?,
            dx: int(2)?,
            dy: int(3)?,
            valid_ap,
            score: fields[5].parse().map_err(|_| invalid())?,
        })
    }
}

/// Outcome of a local shift lookup.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShiftLookup {
    /// The model holds no points; pass coordinates through unchanged.
    NotApplicable,
    /// Every nearby alignment point is invalid; the pixel must be skipped.
    Rejected,
    Shifted { x: f32, y: f32, score: f32 },
}

/// Sparse field of local shifts, interpolated from the nearest alignment points.
#[derive(Clone, Debug)]
pub struct LocalShiftsHandler {
    shifts: Vec<LocalShift>,
    tree: KdTree<i32, 2, usize>,
}

impl LocalShiftsHandler {
    pub fn new(shifts: Vec<LocalShift>) -> Self {
        let tree = shifts
            .iter()
            .enumerate()
            .map(|(i, shift)| ([shift.x, shift.y], i))
            .collect();
        Self { shifts, tree }
    }

    pub fn shifts(&self) -> &[LocalShift] {
        &self.shifts
    }

    pub fn is_empty(&self) -> bool {
        self.shifts.is_empty()
    }

    /// Interpolate the shifted position of `(x, y)` from the 3 nearest
    /// alignment points, weighting valid ones by inverse squared distance.
    pub fn calculate_shifted_coordinates(&self, x: i32, y: i32) -> ShiftLookup {
        if self.shifts.is_empty() {
            return ShiftLookup::NotApplicable;
        }
        let Ok(neighbors) = self
            .tree
            .get_k_nearest_neighbors(&[x, y], LOCAL_SHIFT_NEIGHBORS)
        else {
            return ShiftLookup::NotApplicable;
        };

        let mut score = None;
        let mut weight_sum = 0.0f64;
        let mut dx_sum = 0.0f64;
        let mut dy_sum = 0.0f64;

        for neighbor in &neighbors {
            let shift = &self.shifts[*neighbor.value];
            if !shift.valid_ap {
                continue;
            }
            let leading_score = *score.get_or_insert(shift.score);
            if neighbor.distance_squared == 0.0 {
                return ShiftLookup::Shifted {
                    x: (x + shift.dx) as f32,
                    y: (y + shift.dy) as f32,
                    score: leading_score,
                };
            }
            let weight = 1.0 / neighbor.distance_squared;
            weight_sum += weight;
            dx_sum += weight * shift.dx as f64;
            dy_sum += weight * shift.dy as f64;
        }

        match score {
            None => ShiftLookup::Rejected,
            Some(score) => ShiftLookup::Shifted {
                x: (x as f64 + dx_sum / weight_sum) as f32,
                y: (y as f64 + dy_sum / weight_sum) as f32,
                score,
            },
        }
    }
}

impl fmt::Display for LocalShiftsHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, shift) in self.shifts.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{shift}")?;
        }
        Ok(())
    }
}

impl FromStr for LocalShiftsHandler {
    type Err = StackerError;

    fn from_str(s: &str) -> Result<Self> {
        let shifts = s
            .split(';')
            .map(str::trim)
            .filter(|record| !record.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<LocalShift>>>()?;
        Ok(Self::new(shifts))
    }
}

impl PartialEq for LocalShiftsHandler {
    fn eq(&self, other: &Self) -> bool {
        self.shifts == other.shifts
    }
}
