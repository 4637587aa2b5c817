use serde::{Deserialize, Serialize};

use super::roi::RoiGroup;

/// Schema tag carried by every reported event
pub const EVENT_SCHEMA_VERSION: &str = "1.2";

/// Self-contained record of one detection, POSTed as JSON to the configured
/// endpoint. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub version: String,
    pub port_num: i32,
    /// Base64 JPEG of the frame that triggered the detection
    pub keyframe: String,
    pub timestamp: u64,
    pub rois_rects: Vec<RoiGroup>,
}

impl AnalyticsEvent {
    pub fn new(port_num: i32, keyframe: String, timestamp: u64, rois_rects: Vec<RoiGroup>) -> Self {
        Self {
            version: EVENT_SCHEMA_VERSION.to_string(),
            port_num,
            keyframe,
            timestamp,
            rois_rects,
        }
    }
}
