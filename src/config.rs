use std::fs;
use std::path::Path;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

use crate::bounds::Aabb;
use crate::error::FusionError;
use crate::scheduler::SchedulerConfig;
use crate::sensor::{SensorConfig, SensorFrame};

/// Per-deployment constants: the captured zone, the grid resolution, every
/// sensor's pose and calibration, and the output pacing. Poses are fixed
/// configuration, not estimated online.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub bounds: Aabb,
    /// Cube edge length of the aggregation grids, meters.
    pub cube_size: f32,
    pub sensors: Vec<SensorConfig>,
    /// Minimum interval between two emitted frames, milliseconds.
    pub emit_interval_ms: u64,
    /// How long a fusion cycle waits for lagging sensors, milliseconds.
    pub straggler_timeout_ms: u64,
    /// Pre-sizing bound for the mesh triangle buffer.
    pub max_expected_points: usize,
}

impl DeploymentConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, FusionError> {
        let data = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FusionError> {
        if !self.bounds.is_valid() {
            return Err(FusionError::invalid_parameter(
                "bounding box must have positive extent",
            ));
        }
        if self.cube_size <= 0.0 {
            return Err(FusionError::invalid_parameter("cube size must be positive"));
        }
        if self.sensors.is_empty() {
            return Err(FusionError::SensorUnavailable);
        }
        Ok(())
    }

    pub fn emit_interval(&self) -> Duration {
        Duration::from_millis(self.emit_interval_ms)
    }

    pub fn straggler_timeout(&self) -> Duration {
        Duration::from_millis(self.straggler_timeout_ms)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            emit_interval: self.emit_interval(),
            straggler_timeout: self.straggler_timeout(),
            max_expected_points: self.max_expected_points,
        }
    }

    /// Instantiate the per-sensor pipelines described by this deployment.
    pub fn build_sensors(&self) -> Result<Vec<SensorFrame>, FusionError> {
        self.sensors
            .iter()
            .map(|sensor| SensorFrame::new(sensor.clone(), self.bounds, self.cube_size))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::DeploymentConfig;
    use crate::bounds::Aabb;
    use crate::camera::Calibration;
    use crate::error::FusionError;
    use crate::sensor::{Resolution, SensorConfig, SensorId};
    use crate::transform::Pose;
    use rstest::*;

    #[fixture]
    fn deployment() -> DeploymentConfig {
        DeploymentConfig {
            bounds: Aabb::new(-0.25, 0.25, -1.0, 0.5, -2.0, -0.1),
            cube_size: 0.03,
            sensors: vec![SensorConfig {
                id: SensorId(0),
                pose: Pose::new([-1.5, 0.0, 0.0], [0.0, 0.0, 0.0]),
                resolution: Resolution::new(320, 240),
                calibration: Calibration::new(335.0, 243.0, 521.0, 514.0),
            }],
            emit_interval_ms: 500,
            straggler_timeout_ms: 200,
            max_expected_points: 4096,
        }
    }

    #[rstest]
    fn valid_deployment_builds_sensors(deployment: DeploymentConfig) {
        deployment.validate().unwrap();
        let sensors = deployment.build_sensors().unwrap();
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].id(), SensorId(0));
    }

    #[rstest]
    fn json_round_trips(deployment: DeploymentConfig) {
        let json = serde_json::to_string(&deployment).unwrap();
        let decoded: DeploymentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.cube_size, deployment.cube_size);
        assert_eq!(decoded.sensors.len(), 1);
        assert_eq!(decoded.sensors[0].pose, deployment.sensors[0].pose);
    }

    #[rstest]
    fn invalid_values_are_rejected(mut deployment: DeploymentConfig) {
        deployment.cube_size = 0.0;
        assert!(matches!(
            deployment.validate(),
            Err(FusionError::InvalidParameter(_))
        ));

        deployment.cube_size = 0.03;
        deployment.sensors.clear();
        assert!(matches!(
            deployment.validate(),
            Err(FusionError::SensorUnavailable)
        ));
    }
}
