pub mod analytics;
pub mod capture;
pub mod engine;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod server;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

pub use error::{BridgeError, Result};
use params::EngineParameters;

/// Config file read when `BRIDGE_CONFIG` is unset. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "analytics-bridge.toml";
pub const DEFAULT_PORT: u16 = 51000;

const DEFAULT_SERVER_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 30_000;

/// A zero timeout means `default_ms`
fn timeout_or(ms: u64, default_ms: u64) -> Duration {
    Duration::from_millis(if ms == 0 { default_ms } else { ms })
}

/// Values read by the callback and dispatch paths, replaced as one snapshot
/// by the applier so readers never see a mix of old and new fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub target_url: String,
    pub jpeg_quality: u8,
}

impl RuntimeSettings {
    /// Next snapshot after applying `params`. A non-positive compression
    /// keeps the current quality.
    pub fn with_parameters(&self, params: &EngineParameters) -> Self {
        let jpeg_quality = if params.jpg_compress > 0 {
            params.jpg_compress.min(100) as u8
        } else {
            self.jpeg_quality
        };

        Self {
            target_url: params.analytics_event_api_url.clone(),
            jpeg_quality,
        }
    }
}

impl From<&DefaultsConfig> for RuntimeSettings {
    fn from(defaults: &DefaultsConfig) -> Self {
        Self {
            target_url: defaults.target_url.clone(),
            jpeg_quality: defaults.jpeg_quality.clamp(1, 100),
        }
    }
}

/// Single-writer, multi-reader cell for [`RuntimeSettings`]
pub type SharedSettings = Arc<ArcSwap<RuntimeSettings>>;

pub fn shared_settings(initial: RuntimeSettings) -> SharedSettings {
    Arc::new(ArcSwap::from_pointee(initial))
}

/// Startup configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub applier: ApplierConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub interval_ms: u64,
    pub request_timeout_ms: u64,
    /// Queue bound with drop-oldest on overflow, 0 = unbounded
    pub max_pending: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplierConfig {
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Simulated,
    Native,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    pub simulated_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub target_url: String,
    pub jpeg_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            request_timeout_ms: DEFAULT_SERVER_TIMEOUT_MS,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            request_timeout_ms: DEFAULT_DELIVERY_TIMEOUT_MS,
            max_pending: 0,
        }
    }
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Simulated,
            simulated_interval_ms: 300,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            jpeg_quality: 50,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        timeout_or(self.request_timeout_ms, DEFAULT_SERVER_TIMEOUT_MS)
    }
}

impl DispatchConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        timeout_or(self.request_timeout_ms, DEFAULT_DELIVERY_TIMEOUT_MS)
    }
}

impl ApplierConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl EngineConfig {
    pub fn simulated_interval(&self) -> Duration {
        Duration::from_millis(self.simulated_interval_ms.max(1))
    }
}

impl Config {
    /// Defaults, then the TOML file named by `BRIDGE_CONFIG` (or
    /// [`DEFAULT_CONFIG_FILE`]), then `BRIDGE__SECTION__KEY` variables.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("BRIDGE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let layered = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("BRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(layered.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{GroupUpdate, ParameterUpdate};

    fn params(url: &str, jpg_compress: i32) -> EngineParameters {
        EngineParameters::normalize(&ParameterUpdate {
            version: "1.2".into(),
            analytics_event_api_url: url.into(),
            image_width: 640,
            image_height: 480,
            jpg_compress,
            rois: vec![GroupUpdate {
                sensitivity: 1,
                threshold: 1,
                rects: vec![],
            }],
        })
    }

    #[test]
    fn non_positive_compression_keeps_quality() {
        let current = RuntimeSettings {
            target_url: "http://old".into(),
            jpeg_quality: 50,
        };

        let next = current.with_parameters(&params("http://new", 0));
        assert_eq!(next.jpeg_quality, 50);
        assert_eq!(next.target_url, "http://new");

        let next = current.with_parameters(&params("http://new", -5));
        assert_eq!(next.jpeg_quality, 50);

        let next = current.with_parameters(&params("http://new", 80));
        assert_eq!(next.jpeg_quality, 80);

        let next = current.with_parameters(&params("http://new", 250));
        assert_eq!(next.jpeg_quality, 100);
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let config = Config::load_from("does-not-exist-analytics-bridge").unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.dispatch.interval(), Duration::from_millis(500));
        assert_eq!(config.applier.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.engine.kind, EngineKind::Simulated);
        assert_eq!(config.defaults.jpeg_quality, 50);
    }

    #[test]
    fn zero_durations_do_not_disable_work() {
        let server = ServerConfig {
            request_timeout_ms: 0,
            ..ServerConfig::default()
        };
        let dispatch = DispatchConfig {
            interval_ms: 0,
            request_timeout_ms: 0,
            max_pending: 0,
        };

        assert_eq!(server.request_timeout(), Duration::from_secs(10));
        assert_eq!(dispatch.request_timeout(), Duration::from_secs(30));
        assert_eq!(dispatch.interval(), Duration::from_millis(1));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("analytics-bridge-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bridge.toml");
        std::fs::write(
            &path,
            "[dispatch]\ninterval_ms = 250\nmax_pending = 64\n\n[engine]\nkind = \"native\"\n",
        )
        .unwrap();

        let config = Config::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.dispatch.interval_ms, 250);
        assert_eq!(config.dispatch.max_pending, 64);
        assert_eq!(config.dispatch.request_timeout_ms, 30_000);
        assert_eq!(config.engine.kind, EngineKind::Native);
        assert_eq!(config.server.port, DEFAULT_PORT);

        std::fs::remove_dir_all(&dir).ok();
    }
}
