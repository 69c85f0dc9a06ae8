/// Similarity mapping between reference-frame and frame-local pixel
/// coordinates: rotation and zoom about a center, then a shift.
///
/// `to_reference` divides by `zoom`, rotates about the rotation center and
/// then translates; `to_shifted` is its exact inverse. `zoom` is the frame's
/// scale relative to the reference (2.0 means the frame is magnified twice).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometricTransformer {
    pub shift_x: f32,
    pub shift_y: f32,
    pub rotation_center_x: f32,
    pub rotation_center_y: f32,
    /// Radians.
    pub rotation: f32,
    pub zoom: f32,
}

impl Default for GeometricTransformer {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, 0.0)
    }
}

impl GeometricTransformer {
    pub fn new(
        shift_x: f32,
        shift_y: f32,
        rotation_center_x: f32,
        rotation_center_y: f32,
        rotation: f32,
    ) -> Self {
        Self {
            shift_x,
            shift_y,
            rotation_center_x,
            rotation_center_y,
            rotation,
            zoom: 1.0,
        }
    }

    pub fn with_zoom(mut self, zoom: f32) -> Self {
        self.zoom = zoom;
        self
    }

    /// Frame-local coordinates -> reference-frame coordinates.
    pub fn to_reference(&self, x: f32, y: f32) -> (f32, f32) {
        let (sin, cos) = self.rotation.sin_cos();
        let dx = (x - self.rotation_center_x) / self.zoom;
        let dy = (y - self.rotation_center_y) / self.zoom;
        (
            dx * cos - dy * sin + self.rotation_center_x + self.shift_x,
            dx * sin + dy * cos + self.rotation_center_y + self.shift_y,
        )
    }

    /// Reference-frame coordinates -> frame-local coordinates.
    pub fn to_shifted(&self, x: f32, y: f32) -> (f32, f32) {
        let (sin, cos) = self.rotation.sin_cos();
        let dx = (x - self.rotation_center_x - self.shift_x) * self.zoom;
        let dy = (y - self.rotation_center_y - self.shift_y) * self.zoom;
        (
            dx * cos + dy * sin + self.rotation_center_x,
            -dx * sin + dy * cos + self.rotation_center_y,
        )
    }

    pub fn is_identity(&self) -> bool {
        self.shift_x == 0.0 && self.shift_y == 0.0 && self.rotation == 0.0 && self.zoom == 1.0
    }
}
