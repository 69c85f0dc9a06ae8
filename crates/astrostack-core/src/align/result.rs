use super::local_shifts::LocalShiftsHandler;
use super::transform::GeometricTransformer;

/// Alignment of one frame against the reference frame.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignmentResult {
    pub shift_x: f32,
    pub shift_y: f32,
    pub rotation_center_x: f32,
    pub rotation_center_y: f32,
    /// Radians.
    pub rotation: f32,
    /// Frame scale relative to the reference, 1.0 unless solved with variable zoom.
    pub zoom: f32,
    /// Higher means sharper / more reliable.
    pub ranking: f32,
    pub local_shifts: Option<LocalShiftsHandler>,
    /// `false` when alignment was attempted and failed.
    pub is_valid: bool,
}

impl Default for AlignmentResult {
    fn default() -> Self {
        Self::identity()
    }
}

impl AlignmentResult {
    /// Valid result with no shift and no rotation, used for the reference frame.
    pub fn identity() -> Self {
        Self {
            shift_x: 0.0,
            shift_y: 0.0,
            rotation_center_x: 0.0,
            rotation_center_y: 0.0,
            rotation: 0.0,
            zoom: 1.0,
            ranking: 0.0,
            local_shifts: None,
            is_valid: true,
        }
    }

    pub fn invalid() -> Self {
        Self {
            is_valid: false,
            ..Self::identity()
        }
    }

    pub fn from_transform(transform: &GeometricTransformer) -> Self {
        Self {
            shift_x: transform.shift_x,
            shift_y: transform.shift_y,
            rotation_center_x: transform.rotation_center_x,
            rotation_center_y: transform.rotation_center_y,
            rotation: transform.rotation,
            zoom: transform.zoom,
            ..Self::identity()
        }
    }

    pub fn transformer(&self) -> GeometricTransformer {
        GeometricTransformer::new(
            self.shift_x,
            self.shift_y,
            self.rotation_center_x,
            self.rotation_center_y,
            self.rotation,
        )
        .with_zoom(self.zoom)
    }

    pub fn with_ranking(mut self, ranking: f32) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn with_local_shifts(mut self, local_shifts: LocalShiftsHandler) -> Self {
        self.local_shifts = Some(local_shifts);
        self
    }
}
