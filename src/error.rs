use thiserror::Error;

use crate::sensor::SensorId;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum FusionError {
    /// A sensor pose produced a non-invertible rotation block; a
    /// configuration error, not a per-frame condition.
    #[error("degenerate transform: singular rotation block (det = {det})")]
    DegenerateTransform { det: f32 },

    /// A raw raster does not match the sensor's configured resolution.
    /// The sensor's update is skipped for the cycle.
    #[error("frame size mismatch for sensor {sensor}: expected {expected:?}, got {got:?}")]
    FrameSizeMismatch {
        sensor: SensorId,
        expected: (usize, usize),
        got: (usize, usize),
    },

    /// No sensors registered at startup.
    #[error("no sensors available")]
    SensorUnavailable,

    /// Processing was requested before the sensor's first color+depth
    /// pair arrived.
    #[error("sensor {0} has no complete frame pair yet")]
    FrameNotReady(SensorId),

    /// Used when the user passes a logically invalid parameter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FusionError {
    /// Create an error with the kind `InvalidParameter`.
    pub fn invalid_parameter<T: ToString>(msg: T) -> Self {
        FusionError::InvalidParameter(msg.to_string())
    }
}
