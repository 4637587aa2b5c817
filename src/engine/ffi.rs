//! C ABI boundary with the native detection engine
//!
//! # Memory Ownership Rules
//!
//! - Frame and ROI pointers passed to the callback are owned by the engine
//!   and valid only until the callback returns
//! - `NativeSettingParameters` is owned by the caller; the engine copies it
//!
//! # Thread Safety
//!
//! The engine fires the callback from its own thread. The active callback is
//! held in an atomically swapped slot so registration can race with delivery.

use std::panic::{self, AssertUnwindSafe};
use std::slice;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use libc::{c_char, c_int, c_uchar};
use once_cell::sync::Lazy;
use tracing::{error, warn};

use super::{Detection, DetectionCallback};
use crate::analytics::Roi;
use crate::capture::RawFrame;
use crate::params::{EngineParameters, MAX_GROUPS, ROI_SLOTS};

const VERSION_LEN: usize = 32;
const URL_LEN: usize = 256;

/// Signature of the detection callback the engine invokes
pub type NativeCallback = extern "system" fn(
    channel_id: c_int,
    width: c_int,
    height: c_int,
    frame: *const c_uchar,
    frame_size: c_int,
    timestamp: u64,
    rois: *const Roi,
    rois_count: c_int,
    node_count: c_int,
);

/// C-compatible parameter record, field order matches the engine header
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NativeSettingParameters {
    pub version: [c_char; VERSION_LEN],
    pub analytics_event_api_url: [c_char; URL_LEN],
    pub image_width: c_int,
    pub image_height: c_int,
    pub jpg_compress: c_int,
    pub sensitivity: [c_int; MAX_GROUPS],
    pub threshold: [c_int; MAX_GROUPS],
    /// `ROI rois[10][10]` on the native side
    pub rois: [Roi; ROI_SLOTS],
}

impl From<&EngineParameters> for NativeSettingParameters {
    fn from(params: &EngineParameters) -> Self {
        Self {
            version: c_string_field(&params.version),
            analytics_event_api_url: c_string_field(&params.analytics_event_api_url),
            image_width: params.image_width,
            image_height: params.image_height,
            jpg_compress: params.jpg_compress,
            sensitivity: params.sensitivity,
            threshold: params.threshold,
            rois: params.rois,
        }
    }
}

/// Copy into a fixed NUL-terminated buffer, truncating to `N - 1` bytes
fn c_string_field<const N: usize>(value: &str) -> [c_char; N] {
    let mut field = [0 as c_char; N];
    for (dst, src) in field.iter_mut().zip(value.bytes().take(N - 1)) {
        *dst = src as c_char;
    }
    field
}

static ACTIVE_CALLBACK: Lazy<ArcSwapOption<DetectionCallback>> =
    Lazy::new(|| ArcSwapOption::empty());

pub fn install_callback(callback: DetectionCallback) {
    ACTIVE_CALLBACK.store(Some(Arc::new(callback)));
}

pub fn clear_callback() {
    ACTIVE_CALLBACK.store(None);
}

/// Entry point handed to `registerCallback`.
///
/// Wraps the borrowed buffers in slices, forwards them to the installed
/// callback and never lets a panic unwind into the engine.
pub extern "system" fn detection_trampoline(
    channel_id: c_int,
    width: c_int,
    height: c_int,
    frame: *const c_uchar,
    frame_size: c_int,
    timestamp: u64,
    rois: *const Roi,
    rois_count: c_int,
    node_count: c_int,
) {
    let Some(callback) = ACTIVE_CALLBACK.load_full() else {
        return;
    };

    let (Ok(width), Ok(height), Ok(frame_len)) = (
        u32::try_from(width),
        u32::try_from(height),
        usize::try_from(frame_size),
    ) else {
        warn!(width, height, frame_size, "Ignoring detection with negative sizes");
        return;
    };

    if frame.is_null() && frame_len > 0 {
        warn!("Ignoring detection with null frame pointer");
        return;
    }

    let roi_len = if rois_count > 0 && node_count > 0 {
        rois_count as usize * node_count as usize
    } else {
        0
    };
    if rois.is_null() && roi_len > 0 {
        warn!("Ignoring detection with null ROI pointer");
        return;
    }

    // SAFETY: the engine guarantees `frame_size` readable bytes and
    // `rois_count * node_count` ROI entries for the duration of this call.
    let data = if frame_len == 0 {
        &[][..]
    } else {
        unsafe { slice::from_raw_parts(frame, frame_len) }
    };
    let roi_slice = if roi_len == 0 {
        &[][..]
    } else {
        unsafe { slice::from_raw_parts(rois, roi_len) }
    };

    let detection = Detection {
        frame: RawFrame {
            channel_id,
            width,
            height,
            data,
            timestamp,
        },
        rois: roi_slice,
        group_count: rois_count,
        node_count,
    };

    if panic::catch_unwind(AssertUnwindSafe(|| callback(&detection))).is_err() {
        error!(channel_id, "Detection callback panicked");
    }
}

#[cfg(feature = "native-engine")]
pub use native::NativeEngine;

#[cfg(feature = "native-engine")]
mod native {
    use libc::c_int;

    use tracing::info;

    use super::{
        clear_callback, detection_trampoline, install_callback, NativeCallback,
        NativeSettingParameters,
    };
    use crate::engine::{DetectionCallback, DetectionEngine};
    use crate::error::Result;
    use crate::params::EngineParameters;

    #[link(name = "detection_engine")]
    extern "C" {
        fn Initialize(port: c_int);
        fn SettingParameters(parameters: *const NativeSettingParameters);
        fn registerCallback(callback: NativeCallback);
        fn unregisterCallback();
        fn Deinitialize();
    }

    /// Engine backed by the linked `detection_engine` library
    #[derive(Debug, Default)]
    pub struct NativeEngine;

    impl NativeEngine {
        pub fn new() -> Self {
            Self
        }
    }

    impl DetectionEngine for NativeEngine {
        fn initialize(&self, port: i32) -> Result<()> {
            info!(port, "Initializing native engine");
            unsafe { Initialize(port) };
            Ok(())
        }

        fn apply_parameters(&self, params: &EngineParameters) -> Result<()> {
            let native = NativeSettingParameters::from(params);
            unsafe { SettingParameters(&native) };
            Ok(())
        }

        fn register_callback(&self, callback: DetectionCallback) -> Result<()> {
            install_callback(callback);
            unsafe { registerCallback(detection_trampoline) };
            Ok(())
        }

        fn unregister_callback(&self) -> Result<()> {
            unsafe { unregisterCallback() };
            clear_callback();
            Ok(())
        }

        fn deinitialize(&self) -> Result<()> {
            info!("Deinitializing native engine");
            unsafe { Deinitialize() };
            Ok(())
        }
    }
}
