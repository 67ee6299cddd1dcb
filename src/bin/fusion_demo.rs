use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fuse3d::bounds::Aabb;
use fuse3d::camera::Calibration;
use fuse3d::error::FusionError;
use fuse3d::raster::{ColorRaster, DepthRaster};
use fuse3d::scheduler::{FrameEvent, FramePayload, FrameScheduler, SchedulerConfig};
use fuse3d::sensor::{Resolution, SensorConfig, SensorFrame, SensorId};
use fuse3d::source::{ColorFormat, DepthFormat, SensorRegistry, SensorSource};
use fuse3d::transform::Pose;

const RESOLUTION: Resolution = Resolution {
    width: 32,
    height: 24,
};

/// Stands in for a physical device: a flat wall 1.5 m in front of the
/// sensor, one color+depth pair per cycle at roughly 30 fps.
struct SyntheticSensor {
    id: SensorId,
    cycles: usize,
}

#[async_trait]
impl SensorSource for SyntheticSensor {
    fn id(&self) -> SensorId {
        self.id
    }

    async fn enable(
        &mut self,
        depth: DepthFormat,
        color: ColorFormat,
    ) -> Result<(), FusionError> {
        info!(sensor = %self.id, ?depth, ?color, "streams enabled");
        Ok(())
    }

    fn frames(&mut self) -> BoxStream<'_, FrameEvent> {
        let id = self.id;
        let shade = 60 + 40 * id.0 as u8;
        let events: Vec<FrameEvent> = (0..self.cycles)
            .flat_map(|_| {
                let color = ColorRaster::from_bgra(
                    2 * RESOLUTION.width,
                    2 * RESOLUTION.height,
                    vec![shade; 2 * RESOLUTION.width * 2 * RESOLUTION.height * 4],
                )
                .unwrap();
                let depth = DepthRaster::from_millimeters(
                    RESOLUTION.width,
                    RESOLUTION.height,
                    vec![1500; RESOLUTION.width * RESOLUTION.height],
                )
                .unwrap();
                [
                    FrameEvent {
                        sensor: id,
                        payload: FramePayload::Color(color),
                    },
                    FrameEvent {
                        sensor: id,
                        payload: FramePayload::Depth(depth),
                    },
                ]
            })
            .collect();
        Box::pin(stream::iter(events).then(|event| async {
            tokio::time::sleep(Duration::from_millis(33)).await;
            event
        }))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bounds = Aabb::new(0.1, 2.0, -1.0, 1.0, -1.0, 1.0);
    let cube_size = 0.05;

    let sensors: Vec<SensorFrame> = (0..2)
        .map(|id| {
            SensorFrame::new(
                SensorConfig {
                    id: SensorId(id),
                    pose: Pose::new([0.0, 0.01 * id as f32, 0.0], [0.0, 0.0, 0.0]),
                    resolution: RESOLUTION,
                    calibration: Calibration::new(32.0, 24.0, 52.0, 51.0),
                },
                bounds,
                cube_size,
            )
            .unwrap()
        })
        .collect();

    let mut registry = SensorRegistry::new();
    for id in 0..2 {
        registry.register(Box::new(SyntheticSensor {
            id: SensorId(id),
            cycles: 10,
        }));
    }
    registry
        .enable_all(DepthFormat::Res320x240Fps30, ColorFormat::Yuv640x480Fps15)
        .await
        .unwrap();

    let config = SchedulerConfig {
        emit_interval: Duration::from_millis(100),
        ..SchedulerConfig::default()
    };
    let (scheduler, events, mut output) =
        FrameScheduler::new(sensors, &bounds, cube_size, config).unwrap();
    tokio::spawn(scheduler.run());
    registry.pump(events);

    while let Some(frame) = output.recv().await {
        info!(
            cycle = frame.cycle,
            points = frame.packet.nb_points,
            triangles = frame.triangles.len() / 3,
            bytes = frame.packet.to_json().map(|json| json.len()).unwrap_or(0),
            "fused frame"
        );
    }
    info!("sources drained, shutting down");
}
