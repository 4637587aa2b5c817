//! Detection callback path: frame conversion, ROI assembly, enqueue

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::EventQueue;
use crate::analytics::{assemble, AnalyticsEvent};
use crate::capture::yuv420_to_base64_jpeg;
use crate::engine::{Detection, DetectionCallback};
use crate::error::Result;
use crate::SharedSettings;

/// Turns borrowed detections into owned events. Safe to call from several
/// engine threads at once.
pub struct EventIngest {
    port_num: i32,
    queue: Arc<EventQueue>,
    settings: SharedSettings,
}

impl EventIngest {
    pub fn new(port_num: i32, queue: Arc<EventQueue>, settings: SharedSettings) -> Self {
        Self {
            port_num,
            queue,
            settings,
        }
    }

    /// Copy everything out of `detection` and queue the resulting event.
    /// Nothing is queued on failure.
    #[instrument(skip_all, fields(channel = detection.frame.channel_id))]
    pub fn handle(&self, detection: &Detection<'_>) -> Result<()> {
        let frame = &detection.frame;
        let quality = self.settings.load().jpeg_quality;

        let keyframe = yuv420_to_base64_jpeg(frame.data, frame.width, frame.height, quality)?;
        let rois = assemble(detection.rois, detection.group_count, detection.node_count)?;

        debug!(
            width = frame.width,
            height = frame.height,
            groups = rois.len(),
            "Event queued"
        );
        self.queue.enqueue(AnalyticsEvent::new(
            self.port_num,
            keyframe,
            frame.timestamp,
            rois,
        ));
        Ok(())
    }

    /// Adapter for [`crate::engine::DetectionEngine::register_callback`]
    pub fn into_callback(self: Arc<Self>) -> DetectionCallback {
        Box::new(move |detection: &Detection<'_>| {
            if let Err(e) = self.handle(detection) {
                warn!(channel = detection.frame.channel_id, "Dropping detection: {}", e);
            }
        })
    }
}
