use nalgebra::Point2;

/// A raw ChESS corner in image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corner {
    pub position: Point2<f32>,

    /// Orientation of the corner's white-square diagonal, radians, modulo π.
    pub orientation: f32,

    /// Detector response.
    pub strength: f32,
}

impl Corner {
    pub fn new(x: f32, y: f32, orientation: f32, strength: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            orientation,
            strength,
        }
    }
}
