//! Client configuration.

use crate::{AvatalkError, Result};

/// Configuration for the avatar client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Backend base URL; scheme may be omitted, `http(s)` or `ws(s)`.
    pub backend_url: String,

    /// Sample rate of captured speech handed to `user:audio_chunk`.
    pub capture_sample_rate: u32,

    /// Sample rate assumed for bare PCM reply audio.
    pub playback_sample_rate: u32,

    /// Capacity of the bounded capture event channel.
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: "localhost:8000".to_string(),
            capture_sample_rate: 16000,
            playback_sample_rate: 22050,
            channel_capacity: 64,
        }
    }
}

impl ClientConfig {
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            ..Self::default()
        }
    }

    /// Set the capture sample rate
    pub fn with_capture_sample_rate(mut self, rate: u32) -> Self {
        self.capture_sample_rate = rate;
        self
    }

    /// Set the playback sample rate
    pub fn with_playback_sample_rate(mut self, rate: u32) -> Self {
        self.playback_sample_rate = rate;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.backend_url.is_empty() {
            return Err(AvatalkError::ConfigError("backend URL is required".into()));
        }
        if self.capture_sample_rate == 0 || self.playback_sample_rate == 0 {
            return Err(AvatalkError::ConfigError(
                "sample rates must be non-zero".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(AvatalkError::ConfigError(
                "channel capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// REST base URL for the catalog endpoint.
    pub fn http_url(&self) -> String {
        http_url(&self.backend_url)
    }

    /// Websocket base URL for the session connection.
    pub fn ws_url(&self) -> String {
        ws_url(&self.backend_url)
    }
}

pub fn http_url(base_url: &str) -> String {
    if base_url.starts_with("http") {
        base_url.to_string()
    } else {
        format!("http://{}", base_url)
    }
}

pub fn ws_url(base_url: &str) -> String {
    if base_url.starts_with("ws") {
        base_url.to_string()
    } else if let Some(rest) = base_url.strip_prefix("http") {
        format!("ws{}", rest)
    } else {
        format!("ws://{}", base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_url_is_rejected() {
        let config = ClientConfig::new("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn url_scheme_derivation() {
        assert_eq!(http_url("localhost:8000"), "http://localhost:8000");
        assert_eq!(http_url("https://api.example.com"), "https://api.example.com");
        assert_eq!(ws_url("localhost:8000"), "ws://localhost:8000");
        assert_eq!(ws_url("http://api.example.com"), "ws://api.example.com");
        assert_eq!(ws_url("https://api.example.com"), "wss://api.example.com");
        assert_eq!(ws_url("wss://api.example.com"), "wss://api.example.com");
    }
}
