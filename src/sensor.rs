use std::fmt;

use serde_derive::{Deserialize, Serialize};
use tracing::debug;

use crate::bounds::Aabb;
use crate::camera::{self, Calibration};
use crate::error::FusionError;
use crate::raster::{ColorRaster, DepthRaster};
use crate::transform::{Pose, RigidTransform};
use crate::voxel::{DownsampledCloud, GridShape, VoxelGrid};

/// Identifier of a registered sensor.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SensorId(pub u32);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Depth raster resolution of one sensor. The color stream runs at twice
/// this resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: usize,
    pub height: usize,
}

impl Resolution {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

/// Static, per-deployment description of one sensor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SensorConfig {
    pub id: SensorId,
    pub pose: Pose,
    pub resolution: Resolution,
    pub calibration: Calibration,
}

/// One sensor's frame state and downsampling pipeline.
///
/// Raw rasters and the per-sensor grid are overwritten every cycle;
/// `process` replaces the previous cycle's output in place.
pub struct SensorFrame {
    config: SensorConfig,
    transform: RigidTransform,
    bounds: Aabb,
    color: Option<ColorRaster>,
    depth: Option<DepthRaster>,
    grid: VoxelGrid,
    output: DownsampledCloud,
}

impl SensorFrame {
    pub fn new(config: SensorConfig, bounds: Aabb, cube_size: f32) -> Result<Self, FusionError> {
        let transform = RigidTransform::from_pose(&config.pose)?;
        let grid = VoxelGrid::new(GridShape::new(&bounds, cube_size, 0));
        Ok(Self {
            config,
            transform,
            bounds,
            color: None,
            depth: None,
            grid,
            output: DownsampledCloud::default(),
        })
    }

    pub fn id(&self) -> SensorId {
        self.config.id
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub fn transform(&self) -> &RigidTransform {
        &self.transform
    }

    /// Last completed downsampled output.
    pub fn output(&self) -> &DownsampledCloud {
        &self.output
    }

    /// Store the latest color raster, rejecting sizes that disagree with
    /// the configured resolution.
    pub fn update_color(&mut self, raster: ColorRaster) -> Result<(), FusionError> {
        let expected = (
            2 * self.config.resolution.height,
            2 * self.config.resolution.width,
        );
        let got = (raster.height(), raster.width());
        if got != expected {
            return Err(FusionError::FrameSizeMismatch {
                sensor: self.config.id,
                expected,
                got,
            });
        }
        self.color = Some(raster);
        Ok(())
    }

    /// Store the latest depth raster, rejecting sizes that disagree with
    /// the configured resolution.
    pub fn update_depth(&mut self, raster: DepthRaster) -> Result<(), FusionError> {
        let expected = (self.config.resolution.height, self.config.resolution.width);
        let got = (raster.height(), raster.width());
        if got != expected {
            return Err(FusionError::FrameSizeMismatch {
                sensor: self.config.id,
                expected,
                got,
            });
        }
        self.depth = Some(raster);
        Ok(())
    }

    /// Deproject, range-gate and downsample the stored frame pair,
    /// replacing the previous cycle's output.
    ///
    /// Pixels with no depth return and points outside (or exactly on) the
    /// capture zone are excluded silently. Each kept point carries a
    /// deviation value `sqrt(angle_h^2 + angle_v^2) * d^2` (d = forward
    /// depth in meters); depth noise grows with distance and off-axis
    /// angle, so larger means noisier.
    pub fn process(&mut self) -> Result<&DownsampledCloud, FusionError> {
        let (color, depth) = match (&self.color, &self.depth) {
            (Some(color), Some(depth)) => (color, depth),
            _ => return Err(FusionError::FrameNotReady(self.config.id)),
        };

        for col in 0..self.config.resolution.width {
            for row in 0..self.config.resolution.height {
                let depth_m = depth.meters_at(col, row);
                if depth_m == 0.0 {
                    continue;
                }
                let local = self.config.calibration.deproject(col, row, depth_m);
                let world = self.transform.apply(&local);
                if !self.bounds.contains_strict(&world) {
                    continue;
                }
                let (angle_h, angle_v) = camera::viewing_angles(&local);
                let deviation =
                    (angle_h * angle_h + angle_v * angle_v).sqrt() * depth_m * depth_m;
                self.grid.insert(&world, color.rgb_at(col, row), deviation);
            }
        }

        self.grid.drain_into(&mut self.output);
        debug!(
            sensor = %self.config.id,
            points = self.output.len(),
            "downsampled frame"
        );
        Ok(&self.output)
    }
}
