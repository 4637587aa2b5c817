//! Error taxonomy shared by the conversion, delivery and engine paths

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid YUV420 frame size: expected {expected} bytes, got {actual}")]
    InvalidFrameSize { expected: usize, actual: usize },

    #[error("index {index} out of range for buffer of {len} entries")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: i64, height: i64 },

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("event delivery failed: {0}")]
    Delivery(#[from] reqwest::Error),

    #[error("event endpoint answered {0}")]
    DeliveryStatus(StatusCode),

    #[error("engine call failed: {0}")]
    Engine(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
