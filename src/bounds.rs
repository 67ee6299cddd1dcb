use nalgebra::Vector3;
use serde_derive::{Deserialize, Serialize};

/// Axis-aligned box delimiting the captured zone, in world coordinates.
///
/// The six limits are per-deployment constants; every sensor gates its
/// deprojected points against the same box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
    pub z_min: f32,
    pub z_max: f32,
}

impl Aabb {
    pub fn new(x_min: f32, x_max: f32, y_min: f32, y_max: f32, z_min: f32, z_max: f32) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
            z_min,
            z_max,
        }
    }

    pub fn min(&self) -> Vector3<f32> {
        Vector3::new(self.x_min, self.y_min, self.z_min)
    }

    pub fn max(&self) -> Vector3<f32> {
        Vector3::new(self.x_max, self.y_max, self.z_max)
    }

    pub fn extent(&self) -> Vector3<f32> {
        self.max() - self.min()
    }

    /// Strict interior test: points on any face are outside.
    pub fn contains_strict(&self, point: &Vector3<f32>) -> bool {
        point.x > self.x_min
            && point.x < self.x_max
            && point.y > self.y_min
            && point.y < self.y_max
            && point.z > self.z_min
            && point.z < self.z_max
    }

    pub fn is_valid(&self) -> bool {
        self.x_min < self.x_max && self.y_min < self.y_max && self.z_min < self.z_max
    }
}
