//! Control surface of the external detection engine

pub mod ffi;
pub mod simulated;

use std::sync::Arc;

use crate::analytics::Roi;
use crate::capture::RawFrame;
use crate::error::{BridgeError, Result};
use crate::params::EngineParameters;
use crate::{EngineConfig, EngineKind};

pub use simulated::SimulatedEngine;

/// Everything the engine hands over when a detection fires. Borrowed for the
/// duration of the callback only.
#[derive(Debug, Clone, Copy)]
pub struct Detection<'a> {
    pub frame: RawFrame<'a>,
    /// Row-major `group_count x node_count` grid
    pub rois: &'a [Roi],
    pub group_count: i32,
    pub node_count: i32,
}

/// Invoked on the engine's own thread, possibly concurrently with itself
pub type DetectionCallback = Box<dyn Fn(&Detection<'_>) + Send + Sync>;

pub trait DetectionEngine: Send + Sync {
    fn initialize(&self, port: i32) -> Result<()>;

    fn apply_parameters(&self, params: &EngineParameters) -> Result<()>;

    fn register_callback(&self, callback: DetectionCallback) -> Result<()>;

    fn unregister_callback(&self) -> Result<()>;

    fn deinitialize(&self) -> Result<()>;
}

pub fn build_engine(config: &EngineConfig) -> Result<Arc<dyn DetectionEngine>> {
    match config.kind {
        EngineKind::Simulated => Ok(Arc::new(SimulatedEngine::new(config.simulated_interval()))),
        #[cfg(feature = "native-engine")]
        EngineKind::Native => Ok(Arc::new(ffi::NativeEngine::new())),
        #[cfg(not(feature = "native-engine"))]
        EngineKind::Native => Err(BridgeError::Engine(
            "built without the native-engine feature".into(),
        )),
    }
}
