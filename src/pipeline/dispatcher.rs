//! Periodic delivery of queued events to the configured endpoint

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::EventQueue;
use crate::analytics::AnalyticsEvent;
use crate::error::{BridgeError, Result};
use crate::{DispatchConfig, SharedSettings};

pub struct Dispatcher {
    queue: Arc<EventQueue>,
    settings: SharedSettings,
    client: Client,
    interval: Duration,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<EventQueue>,
        settings: SharedSettings,
        config: &DispatchConfig,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            queue,
            settings,
            client,
            interval: config.interval(),
        })
    }

    /// Tick forever. Deliveries run as their own tasks so a slow endpoint
    /// never delays the next drain.
    pub async fn run(self) {
        info!(interval = ?self.interval, "Dispatcher started");
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick();
        }
    }

    /// Drain the queue and spawn one POST per event. Events drained while no
    /// target URL is configured are discarded.
    pub fn tick(&self) -> Vec<JoinHandle<()>> {
        let events = self.queue.drain_all();
        if events.is_empty() {
            return Vec::new();
        }

        let url = self.settings.load().target_url.clone();
        if url.is_empty() {
            debug!(count = events.len(), "No target URL configured, dropping events");
            metrics::counter!("bridge_delivery_failures").increment(events.len() as u64);
            return Vec::new();
        }

        events
            .into_iter()
            .map(|event| {
                let client = self.client.clone();
                let url = url.clone();
                tokio::spawn(async move {
                    let timestamp = event.timestamp;
                    match deliver(&client, &url, &event).await {
                        Ok(status) => {
                            debug!(timestamp, %status, "Event delivered");
                        }
                        Err(e) => {
                            warn!(timestamp, url = %url, "Event dropped: {}", e);
                        }
                    }
                })
            })
            .collect()
    }
}

/// POST one event as JSON. Anything but 2xx is an error.
pub async fn deliver(client: &Client, url: &str, event: &AnalyticsEvent) -> Result<StatusCode> {
    let outcome = post_event(client, url, event).await;
    match &outcome {
        Ok(_) => metrics::counter!("bridge_events_delivered").increment(1),
        Err(_) => metrics::counter!("bridge_delivery_failures").increment(1),
    }
    outcome
}

async fn post_event(client: &Client, url: &str, event: &AnalyticsEvent) -> Result<StatusCode> {
    let status = client.post(url).json(event).send().await?.status();
    if status.is_success() {
        Ok(status)
    } else {
        Err(BridgeError::DeliveryStatus(status))
    }
}
