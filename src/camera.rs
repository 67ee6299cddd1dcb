use nalgebra::Vector3;
use serde_derive::{Deserialize, Serialize};

/// Pinhole calibration parameters of one sensor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Principal point in the X axis.
    pub cx: f32,
    /// Principal point in the Y axis.
    pub cy: f32,
    /// Focal length and pixel scale in the X axis.
    pub fx: f32,
    /// Focal length and pixel scale in the Y axis.
    pub fy: f32,
}

impl Calibration {
    pub fn new(cx: f32, cy: f32, fx: f32, fy: f32) -> Self {
        Self { cx, cy, fx, fy }
    }

    /// Deproject a depth pixel into sensor-local coordinates.
    ///
    /// `col`/`row` address the depth raster; the forward/depth axis is X.
    pub fn deproject(&self, col: usize, row: usize, depth_m: f32) -> Vector3<f32> {
        let x = depth_m;
        let y = (2.0 * col as f32 - self.cx) * x / self.fx;
        let z = (2.0 * row as f32 - self.cy) * x / self.fy;
        Vector3::new(x, y, z)
    }
}

/// Horizontal and vertical viewing angles of a sensor-local point, off the
/// forward axis.
pub fn viewing_angles(point: &Vector3<f32>) -> (f32, f32) {
    ((point.y / point.x).atan(), (point.z / point.x).atan())
}
