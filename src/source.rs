use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::FusionError;
use crate::scheduler::FrameEvent;
use crate::sensor::SensorId;

/// Depth stream modes a sensor driver can be asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthFormat {
    Res320x240Fps30,
    Res640x480Fps30,
}

/// Color stream modes a sensor driver can be asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorFormat {
    Yuv640x480Fps15,
    Rgb640x480Fps30,
}

/// Driver-side capability of one physical sensor: switching its streams on
/// and delivering frame notifications.
///
/// Color and depth arrive independently, each at the device's own rate;
/// the stream yields one event per arrival.
#[async_trait]
pub trait SensorSource: Send {
    fn id(&self) -> SensorId;

    /// Switch the device's depth and color streams on.
    async fn enable(&mut self, depth: DepthFormat, color: ColorFormat)
        -> Result<(), FusionError>;

    /// Live stream of frame notifications.
    fn frames(&mut self) -> BoxStream<'_, FrameEvent>;
}

/// Registry of sensor sources keyed by identifier.
///
/// Dispatch is uniform over the `SensorSource` capability; any number of
/// sensors can be registered.
#[derive(Default)]
pub struct SensorRegistry {
    sources: BTreeMap<SensorId, Box<dyn SensorSource>>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Register a source; re-registering an identifier replaces the
    /// previous source.
    pub fn register(&mut self, source: Box<dyn SensorSource>) {
        info!(sensor = %source.id(), "registering sensor source");
        self.sources.insert(source.id(), source);
    }

    /// Switch every registered device's streams on. Fails with
    /// `SensorUnavailable` when nothing is registered.
    pub async fn enable_all(
        &mut self,
        depth: DepthFormat,
        color: ColorFormat,
    ) -> Result<(), FusionError> {
        if self.sources.is_empty() {
            return Err(FusionError::SensorUnavailable);
        }
        for source in self.sources.values_mut() {
            source.enable(depth, color).await?;
        }
        Ok(())
    }

    /// Spawn one forwarding task per source, pushing frame notifications
    /// into the scheduler's intake channel. When the channel is full the
    /// frame is dropped; the next arrival is the retry mechanism.
    pub fn pump(self, sender: mpsc::Sender<FrameEvent>) -> Vec<JoinHandle<()>> {
        self.sources
            .into_values()
            .map(|mut source| {
                let sender = sender.clone();
                tokio::spawn(async move {
                    let id = source.id();
                    let mut frames = source.frames();
                    while let Some(event) = frames.next().await {
                        if sender.try_send(event).is_err() {
                            warn!(sensor = %id, "scheduler busy, frame dropped");
                        }
                    }
                })
            })
            .collect()
    }
}
