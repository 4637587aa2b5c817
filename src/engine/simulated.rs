//! In-process stand-in for the native engine.
//!
//! Once parameters have been applied and a callback is registered, a
//! background thread synthesises a YUV 4:2:0 frame at the configured size and
//! fires a detection with a fixed 2x4 ROI grid every `interval`.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use flume::{RecvTimeoutError, Sender};
use tracing::{debug, info};

use super::{Detection, DetectionCallback, DetectionEngine};
use crate::analytics::Roi;
use crate::capture::{RawFrame, Yuv420Layout};
use crate::error::{BridgeError, Result};
use crate::params::EngineParameters;
use crate::utils::unix_millis;

const FALLBACK_SIZE: (u32, u32) = (320, 240);
const MAX_SIZE: (u32, u32) = (1920, 1080);

const DEMO_GROUPS: i32 = 2;
const DEMO_NODES: i32 = 4;
const DEMO_ROIS: [Roi; 8] = [
    Roi::new(0, 0),
    Roi::new(10, 10),
    Roi::new(30, 30),
    Roi::new(40, 40),
    Roi::new(50, 50),
    Roi::new(60, 60),
    Roi::new(70, 70),
    Roi::new(80, 80),
];

#[derive(Default)]
struct Shared {
    callback: ArcSwapOption<DetectionCallback>,
    parameters: ArcSwapOption<EngineParameters>,
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct SimulatedEngine {
    interval: Duration,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl SimulatedEngine {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            shared: Arc::new(Shared::default()),
            worker: Mutex::new(None),
        }
    }

    /// Last parameter record pushed by the applier
    pub fn parameters(&self) -> Option<Arc<EngineParameters>> {
        self.shared.parameters.load_full()
    }
}

impl DetectionEngine for SimulatedEngine {
    fn initialize(&self, port: i32) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Err(BridgeError::Engine("engine already initialized".into()));
        }

        let (stop, stop_rx) = flume::bounded::<()>(1);
        let shared = self.shared.clone();
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("simulated-engine".into())
            .spawn(move || {
                info!(port, "Simulated engine running");
                let mut sequence = 0u32;
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }

                    let (Some(callback), Some(params)) =
                        (shared.callback.load_full(), shared.parameters.load_full())
                    else {
                        continue;
                    };

                    let (width, height) = frame_size(&params);
                    let data = synthetic_frame(width, height, sequence);
                    let detection = Detection {
                        frame: RawFrame {
                            channel_id: port,
                            width,
                            height,
                            data: &data,
                            timestamp: unix_millis(),
                        },
                        rois: &DEMO_ROIS,
                        group_count: DEMO_GROUPS,
                        node_count: DEMO_NODES,
                    };

                    debug!(sequence, width, height, "Simulated detection");
                    callback(&detection);
                    sequence = sequence.wrapping_add(1);
                }
                info!("Simulated engine stopped");
            })?;

        *worker = Some(Worker { stop, handle });
        Ok(())
    }

    fn apply_parameters(&self, params: &EngineParameters) -> Result<()> {
        info!(
            url = %params.analytics_event_api_url,
            width = params.image_width,
            height = params.image_height,
            jpg_compress = params.jpg_compress,
            groups = params.active_groups(),
            "Parameters set"
        );
        self.shared.parameters.store(Some(Arc::new(params.clone())));
        Ok(())
    }

    fn register_callback(&self, callback: DetectionCallback) -> Result<()> {
        self.shared.callback.store(Some(Arc::new(callback)));
        Ok(())
    }

    fn unregister_callback(&self) -> Result<()> {
        self.shared.callback.store(None);
        Ok(())
    }

    fn deinitialize(&self) -> Result<()> {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(worker) = worker {
            let _ = worker.stop.send(());
            worker
                .handle
                .join()
                .map_err(|_| BridgeError::Engine("simulated engine thread panicked".into()))?;
        }
        Ok(())
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        let _ = self.deinitialize();
    }
}

/// Configured size rounded down to even, clamped to 1080p
fn frame_size(params: &EngineParameters) -> (u32, u32) {
    match (
        u32::try_from(params.image_width),
        u32::try_from(params.image_height),
    ) {
        (Ok(w), Ok(h)) if w >= 2 && h >= 2 => (w.min(MAX_SIZE.0) & !1, h.min(MAX_SIZE.1) & !1),
        _ => FALLBACK_SIZE,
    }
}

/// Diagonal luma ramp shifted by `sequence`, neutral chroma
fn synthetic_frame(width: u32, height: u32, sequence: u32) -> Vec<u8> {
    let Ok(layout) = Yuv420Layout::new(width, height) else {
        return Vec::new();
    };

    let mut data = Vec::with_capacity(layout.frame_size());
    for y in 0..layout.height {
        for x in 0..layout.width {
            data.push(16 + ((x + y + sequence as usize) % 220) as u8);
        }
    }
    data.resize(layout.frame_size(), 128);
    data
}
