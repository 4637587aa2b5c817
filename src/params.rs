//! Detection parameters: the JSON accepted by `/SetParameters`, the
//! fixed-capacity record pushed to the engine, and the single-slot mailbox
//! between the two.
//!
//! The engine expects exactly [`MAX_GROUPS`] sensitivity and threshold slots
//! and a [`MAX_GROUPS`] x [`MAX_NODES`] ROI grid flattened row-major. Input
//! beyond those caps is dropped; missing slots are zero (sensitivity,
//! threshold) or [`Roi::UNSET`].

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::analytics::{Roi, EVENT_SCHEMA_VERSION};
use crate::error::{BridgeError, Result};

pub const MAX_GROUPS: usize = 10;
pub const MAX_NODES: usize = 10;
pub const ROI_SLOTS: usize = MAX_GROUPS * MAX_NODES;

/// Body of a `SetParameters` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterUpdate {
    #[serde(default = "default_version")]
    pub version: String,
    pub analytics_event_api_url: String,
    pub image_width: i32,
    pub image_height: i32,
    pub jpg_compress: i32,
    #[serde(default)]
    pub rois: Vec<GroupUpdate>,
}

/// One detection group as sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupUpdate {
    pub sensitivity: i32,
    pub threshold: i32,
    #[serde(default)]
    pub rects: Vec<Roi>,
}

fn default_version() -> String {
    EVENT_SCHEMA_VERSION.to_string()
}

impl ParameterUpdate {
    pub fn from_json(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| BridgeError::InvalidParameters(e.to_string()))
    }
}

/// Normalized parameter record in the engine's fixed-size shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParameters {
    pub version: String,
    pub analytics_event_api_url: String,
    pub image_width: i32,
    pub image_height: i32,
    pub jpg_compress: i32,
    pub sensitivity: [i32; MAX_GROUPS],
    pub threshold: [i32; MAX_GROUPS],
    /// Row-major: slot `group * MAX_NODES + node`
    pub rois: [Roi; ROI_SLOTS],
}

impl Default for EngineParameters {
    fn default() -> Self {
        Self {
            version: default_version(),
            analytics_event_api_url: String::new(),
            image_width: 0,
            image_height: 0,
            jpg_compress: 0,
            sensitivity: [0; MAX_GROUPS],
            threshold: [0; MAX_GROUPS],
            rois: [Roi::UNSET; ROI_SLOTS],
        }
    }
}

impl EngineParameters {
    /// Truncate/pad an update into the fixed-capacity layout
    pub fn normalize(update: &ParameterUpdate) -> Self {
        let mut params = Self {
            version: update.version.clone(),
            analytics_event_api_url: update.analytics_event_api_url.clone(),
            image_width: update.image_width,
            image_height: update.image_height,
            jpg_compress: update.jpg_compress,
            ..Self::default()
        };

        for (i, group) in update.rois.iter().take(MAX_GROUPS).enumerate() {
            params.sensitivity[i] = group.sensitivity;
            params.threshold[i] = group.threshold;

            for (j, rect) in group.rects.iter().take(MAX_NODES).enumerate() {
                params.rois[i * MAX_NODES + j] = *rect;
            }
        }

        params
    }

    /// Nodes of one group, sentinels included. `None` past [`MAX_GROUPS`].
    pub fn group(&self, index: usize) -> Option<&[Roi]> {
        self.rois.chunks_exact(MAX_NODES).nth(index)
    }

    /// Groups with at least one configured node
    pub fn active_groups(&self) -> usize {
        self.rois
            .chunks_exact(MAX_NODES)
            .filter(|group| group.iter().any(|roi| !roi.is_unset()))
            .count()
    }
}

/// Single-slot, last-write-wins mailbox between the configuration server and
/// the applier
#[derive(Debug, Default)]
pub struct PendingParameters {
    slot: Mutex<Option<ParameterUpdate>>,
}

impl PendingParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever is pending. Returns true if an unapplied update was
    /// overwritten.
    pub fn submit(&self, update: ParameterUpdate) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.replace(update).is_some()
    }

    /// Take the pending update and clear the flag in one step
    pub fn take(&self) -> Option<ParameterUpdate> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
