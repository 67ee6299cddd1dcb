use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use serde_derive::{Deserialize, Serialize};

use crate::error::FusionError;

/// Mounting pose of one sensor: position plus rotation angles in radians.
///
/// Rotation component 0 is applied about the Z axis, component 1 about Y
/// and component 2 about X, composed in that order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f32; 3],
    pub rotation: [f32; 3],
}

impl Pose {
    pub fn new(position: [f32; 3], rotation: [f32; 3]) -> Self {
        Self { position, rotation }
    }

    pub fn translation(&self) -> Vector3<f32> {
        Vector3::new(self.position[0], self.position[1], self.position[2])
    }
}

const DET_EPSILON: f32 = 1e-6;

fn rotation_about_x(angle: f32) -> Matrix3<f32> {
    let (sin, cos) = angle.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, cos, -sin, 0.0, sin, cos)
}

fn rotation_about_y(angle: f32) -> Matrix3<f32> {
    let (sin, cos) = angle.sin_cos();
    Matrix3::new(cos, 0.0, sin, 0.0, 1.0, 0.0, -sin, 0.0, cos)
}

fn rotation_about_z(angle: f32) -> Matrix3<f32> {
    let (sin, cos) = angle.sin_cos();
    Matrix3::new(cos, -sin, 0.0, sin, cos, 0.0, 0.0, 0.0, 1.0)
}

/// Rigid transform from sensor-local to world coordinates, with its
/// precomputed inverse.
#[derive(Clone, Debug)]
pub struct RigidTransform {
    matrix: Matrix4<f32>,
    inverse: Matrix4<f32>,
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
            inverse: Matrix4::identity(),
        }
    }

    /// Build the transform of a pose: elementary rotations about Z, then Y,
    /// then X, followed by the translation.
    pub fn from_pose(pose: &Pose) -> Result<Self, FusionError> {
        let rotation = rotation_about_z(pose.rotation[0])
            * rotation_about_y(pose.rotation[1])
            * rotation_about_x(pose.rotation[2]);
        Self::from_parts(rotation, pose.translation())
    }

    /// Build from an explicit rotation block and translation. Fails when
    /// the rotation block is singular.
    pub fn from_parts(
        rotation: Matrix3<f32>,
        translation: Vector3<f32>,
    ) -> Result<Self, FusionError> {
        let det = rotation[(0, 0)]
            * (rotation[(1, 1)] * rotation[(2, 2)] - rotation[(1, 2)] * rotation[(2, 1)])
            - rotation[(1, 0)]
                * (rotation[(0, 1)] * rotation[(2, 2)] - rotation[(0, 2)] * rotation[(2, 1)])
            + rotation[(2, 0)]
                * (rotation[(0, 1)] * rotation[(1, 2)] - rotation[(0, 2)] * rotation[(1, 1)]);
        if !det.is_finite() || det.abs() < DET_EPSILON {
            return Err(FusionError::DegenerateTransform { det });
        }

        // Cofactor/adjugate inversion of the rotation block.
        let inv_rotation = Matrix3::new(
            rotation[(1, 1)] * rotation[(2, 2)] - rotation[(1, 2)] * rotation[(2, 1)],
            -(rotation[(0, 1)] * rotation[(2, 2)] - rotation[(0, 2)] * rotation[(2, 1)]),
            rotation[(0, 1)] * rotation[(1, 2)] - rotation[(0, 2)] * rotation[(1, 1)],
            -(rotation[(1, 0)] * rotation[(2, 2)] - rotation[(1, 2)] * rotation[(2, 0)]),
            rotation[(0, 0)] * rotation[(2, 2)] - rotation[(0, 2)] * rotation[(2, 0)],
            -(rotation[(0, 0)] * rotation[(1, 2)] - rotation[(0, 2)] * rotation[(1, 0)]),
            rotation[(1, 0)] * rotation[(2, 1)] - rotation[(1, 1)] * rotation[(2, 0)],
            -(rotation[(0, 0)] * rotation[(2, 1)] - rotation[(0, 1)] * rotation[(2, 0)]),
            rotation[(0, 0)] * rotation[(1, 1)] - rotation[(0, 1)] * rotation[(1, 0)],
        ) / det;
        let inv_translation = -(inv_rotation * translation);

        let mut matrix = Matrix4::identity();
        matrix
            .fixed_slice_mut::<3, 3>(0, 0)
            .copy_from(&rotation);
        matrix
            .fixed_slice_mut::<3, 1>(0, 3)
            .copy_from(&translation);

        let mut inverse = Matrix4::identity();
        inverse
            .fixed_slice_mut::<3, 3>(0, 0)
            .copy_from(&inv_rotation);
        inverse
            .fixed_slice_mut::<3, 1>(0, 3)
            .copy_from(&inv_translation);

        Ok(Self { matrix, inverse })
    }

    /// Map a sensor-local point into world coordinates.
    pub fn apply(&self, point: &Vector3<f32>) -> Vector3<f32> {
        let h = self.matrix * Vector4::new(point.x, point.y, point.z, 1.0);
        Vector3::new(h.x, h.y, h.z)
    }

    /// Map a world point back into sensor-local coordinates.
    pub fn apply_inverse(&self, point: &Vector3<f32>) -> Vector3<f32> {
        let h = self.inverse * Vector4::new(point.x, point.y, point.z, 1.0);
        Vector3::new(h.x, h.y, h.z)
    }

    pub fn matrix(&self) -> &Matrix4<f32> {
        &self.matrix
    }
}
