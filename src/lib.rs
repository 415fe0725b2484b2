pub mod audio;
pub mod catalog;
pub mod client;
pub mod config;
pub mod playback;
pub mod state;
pub mod transport;
pub mod voice;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AvatalkError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Playback error: {0}")]
    PlaybackError(String),

    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("Catalog error: {0}")]
    CatalogError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl From<serde_json::Error> for AvatalkError {
    fn from(e: serde_json::Error) -> Self {
        AvatalkError::ProtocolError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AvatalkError>;
