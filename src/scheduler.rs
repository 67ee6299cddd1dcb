use std::collections::BTreeMap;
use std::time::Duration;

use rayon::iter::{ParallelBridge, ParallelIterator};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::bounds::Aabb;
use crate::error::FusionError;
use crate::fusion::{FusionGrid, MergedCloud};
use crate::mesh::MeshBuilder;
use crate::raster::{ColorRaster, DepthRaster};
use crate::sensor::{SensorFrame, SensorId};
use crate::wire::FramePacket;

/// One sensor stream notification: the latest color or depth raster.
#[derive(Debug)]
pub struct FrameEvent {
    pub sensor: SensorId,
    pub payload: FramePayload,
}

#[derive(Debug)]
pub enum FramePayload {
    Color(ColorRaster),
    Depth(DepthRaster),
}

/// Per-sensor cycle progress.
///
/// Depth frames are dropped until the sensor's color has arrived for the
/// cycle; a depth arrival on top of a stored color completes the pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CycleState {
    AwaitingColor,
    ColorReady,
    PairComplete,
}

struct SensorSlot {
    frame: SensorFrame,
    state: CycleState,
}

/// Timing and sizing knobs of the scheduler.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// Minimum interval between two emitted frames.
    pub emit_interval: Duration,
    /// How long a cycle waits for lagging sensors once the first sensor
    /// has completed its pair, before fusing without them.
    pub straggler_timeout: Duration,
    /// Pre-sizing bound for the mesh index buffer.
    pub max_expected_points: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            emit_interval: Duration::from_millis(500),
            straggler_timeout: Duration::from_millis(200),
            max_expected_points: 4096,
        }
    }
}

/// A fused cycle ready for transport: the encoded wire frame plus the
/// triangle list for in-process consumers. The wire schema carries points
/// and adjacency only, so triangles never leave the process.
#[derive(Clone, Debug)]
pub struct FusedFrame {
    pub cycle: u64,
    pub packet: FramePacket,
    pub triangles: Vec<u32>,
}

/// Senders drop frames when the scheduler is still busy with the previous
/// one: latest wins, nothing queues up.
const EVENT_CHANNEL_CAPACITY: usize = 16;
const OUTPUT_CHANNEL_CAPACITY: usize = 4;

/// Owns every sensor's frame state and serializes fusion passes.
///
/// Sources push `FrameEvent`s through a bounded channel. A fusion pass
/// runs when every registered sensor has delivered a color+depth pair for
/// the current cycle, or when the straggler deadline expires with at least
/// one complete sensor; the pass itself is the single owner of all shared
/// state, so passes never overlap.
pub struct FrameScheduler {
    slots: BTreeMap<SensorId, SensorSlot>,
    fusion: FusionGrid,
    merged: MergedCloud,
    mesh: MeshBuilder,
    config: SchedulerConfig,
    events: mpsc::Receiver<FrameEvent>,
    output: mpsc::Sender<FusedFrame>,
    cycle: u64,
    next_emit: Instant,
    barrier_deadline: Option<Instant>,
}

impl FrameScheduler {
    /// Build the scheduler over the registered sensors. Returns the event
    /// sender handed to sensor sources and the receiver of fused frames.
    pub fn new(
        sensors: Vec<SensorFrame>,
        bounds: &Aabb,
        cube_size: f32,
        config: SchedulerConfig,
    ) -> Result<
        (
            Self,
            mpsc::Sender<FrameEvent>,
            mpsc::Receiver<FusedFrame>,
        ),
        FusionError,
    > {
        if sensors.is_empty() {
            return Err(FusionError::SensorUnavailable);
        }
        let mut slots = BTreeMap::new();
        for frame in sensors {
            info!(sensor = %frame.id(), "adding sensor");
            slots.insert(
                frame.id(),
                SensorSlot {
                    frame,
                    state: CycleState::AwaitingColor,
                },
            );
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let scheduler = Self {
            slots,
            fusion: FusionGrid::new(bounds, cube_size),
            merged: MergedCloud::default(),
            mesh: MeshBuilder::new(config.max_expected_points),
            config,
            events: event_rx,
            output: output_tx,
            cycle: 0,
            next_emit: Instant::now(),
            barrier_deadline: None,
        };
        Ok((scheduler, event_tx, output_rx))
    }

    pub fn sensor_count(&self) -> usize {
        self.slots.len()
    }

    /// Run until every event sender is dropped.
    pub async fn run(mut self) {
        loop {
            let deadline = self.barrier_deadline;
            let straggler_wait = async move {
                match deadline {
                    Some(deadline) => time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.on_event(event),
                    None => break,
                },
                _ = straggler_wait => self.on_straggler_deadline(),
            }
        }
    }

    fn on_event(&mut self, event: FrameEvent) {
        let slot = match self.slots.get_mut(&event.sensor) {
            Some(slot) => slot,
            None => {
                warn!(sensor = %event.sensor, "frame from unregistered sensor");
                return;
            }
        };
        match event.payload {
            FramePayload::Color(raster) => match slot.frame.update_color(raster) {
                Ok(()) => {
                    if slot.state == CycleState::AwaitingColor {
                        slot.state = CycleState::ColorReady;
                    }
                }
                Err(err) => warn!(%err, "skipping color update"),
            },
            FramePayload::Depth(raster) => match slot.state {
                CycleState::AwaitingColor => {
                    debug!(sensor = %event.sensor, "depth before color, dropped");
                }
                CycleState::ColorReady | CycleState::PairComplete => {
                    match slot.frame.update_depth(raster) {
                        Ok(()) => slot.state = CycleState::PairComplete,
                        Err(err) => warn!(%err, "skipping depth update"),
                    }
                }
            },
        }
        self.check_barrier();
    }

    fn check_barrier(&mut self) {
        let complete = self
            .slots
            .values()
            .filter(|slot| slot.state == CycleState::PairComplete)
            .count();
        if complete == self.slots.len() {
            self.run_fusion();
        } else if complete > 0 && self.barrier_deadline.is_none() {
            self.barrier_deadline = Some(Instant::now() + self.config.straggler_timeout);
        }
    }

    fn on_straggler_deadline(&mut self) {
        let stragglers: Vec<SensorId> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.state != CycleState::PairComplete)
            .map(|(id, _)| *id)
            .collect();
        warn!(?stragglers, "straggler deadline expired, fusing without them");
        self.run_fusion();
    }

    /// One serialized fusion pass over the sensors whose pair is complete.
    fn run_fusion(&mut self) {
        self.barrier_deadline = None;

        // Per-sensor deprojection has no cross-sensor dependency.
        let failures: Vec<(SensorId, FusionError)> = self
            .slots
            .values_mut()
            .filter(|slot| slot.state == CycleState::PairComplete)
            .par_bridge()
            .filter_map(|slot| {
                let id = slot.frame.id();
                slot.frame.process().err().map(|err| (id, err))
            })
            .collect();
        for (id, err) in &failures {
            warn!(sensor = %id, %err, "sensor skipped this cycle");
        }
        let failed: Vec<SensorId> = failures.into_iter().map(|(id, _)| id).collect();

        for slot in self
            .slots
            .values()
            .filter(|slot| slot.state == CycleState::PairComplete)
        {
            if failed.contains(&slot.frame.id()) {
                continue;
            }
            self.fusion.accumulate(slot.frame.output());
        }
        self.fusion.finish(&mut self.merged);
        let triangles = self.mesh.build(&self.merged);
        debug!(
            cycle = self.cycle,
            points = self.merged.len(),
            triangles = triangles.len() / 3,
            "fusion pass"
        );

        let now = Instant::now();
        if now >= self.next_emit {
            let packet = FramePacket::from_merged(self.slots.len() as i32, &self.merged);
            let frame = FusedFrame {
                cycle: self.cycle,
                packet,
                triangles: triangles.to_vec(),
            };
            if self.output.try_send(frame).is_ok() {
                self.next_emit = now + self.config.emit_interval;
            } else {
                warn!(cycle = self.cycle, "output consumer lagging, frame dropped");
            }
        }

        for slot in self.slots.values_mut() {
            if slot.state == CycleState::PairComplete {
                slot.state = CycleState::AwaitingColor;
            }
        }
        self.cycle += 1;
    }
}
