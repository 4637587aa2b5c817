//! Polls the pending-parameters mailbox and pushes updates to the engine

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

use crate::engine::DetectionEngine;
use crate::params::{EngineParameters, PendingParameters};
use crate::{ApplierConfig, SharedSettings};

pub struct ConfigApplier {
    pending: Arc<PendingParameters>,
    settings: SharedSettings,
    engine: Arc<dyn DetectionEngine>,
    poll_interval: Duration,
}

impl ConfigApplier {
    pub fn new(
        pending: Arc<PendingParameters>,
        settings: SharedSettings,
        engine: Arc<dyn DetectionEngine>,
        config: &ApplierConfig,
    ) -> Self {
        Self {
            pending,
            settings,
            engine,
            poll_interval: config.poll_interval(),
        }
    }

    pub async fn run(self) {
        info!(interval = ?self.poll_interval, "Configuration applier started");
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick();
        }
    }

    /// Apply the pending update, if any, and return what was pushed.
    ///
    /// The settings snapshot is swapped before the engine call, so events
    /// raised under the new parameters are already sent to the new target.
    pub fn tick(&self) -> Option<EngineParameters> {
        let update = self.pending.take()?;
        let params = EngineParameters::normalize(&update);

        let current = self.settings.load();
        let next = current.with_parameters(&params);
        if next.jpeg_quality != current.jpeg_quality {
            info!(quality = next.jpeg_quality, "JPEG quality changed");
        }
        self.settings.store(Arc::new(next));

        match self.engine.apply_parameters(&params) {
            Ok(()) => {
                metrics::counter!("bridge_parameters_applied").increment(1);
                info!(url = %params.analytics_event_api_url, "Parameters applied");
            }
            Err(e) => error!("Engine rejected parameters: {}", e),
        }

        Some(params)
    }
}
