use std::time::Duration;

use crate::errors::{HubError, Result};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Notification Hub configuration
#[derive(Clone)]
pub struct HubConfig {
    /// `Endpoint=sb://...;SharedAccessKeyName=...;SharedAccessKey=...`
    pub connection_string: String,
    /// Hub name within the namespace
    pub hub_path: String,
    /// Per-request timeout of the HTTP transport
    pub timeout: Duration,
}

impl HubConfig {
    /// Create new hub configuration
    pub fn new(connection_string: impl Into<String>, hub_path: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            hub_path: hub_path.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load configuration from environment variables
    ///
    /// `NOTIFICATION_HUB_CONNECTION_STRING` and `NOTIFICATION_HUB_PATH` are
    /// required. `NOTIFICATION_HUB_TIMEOUT_SECS` defaults to 30 and falls back
    /// to the default when it does not parse.
    pub fn from_env() -> Result<Self> {
        let connection_string = std::env::var("NOTIFICATION_HUB_CONNECTION_STRING")
            .map_err(|_| HubError::MissingConfig("NOTIFICATION_HUB_CONNECTION_STRING"))?;
        let hub_path = std::env::var("NOTIFICATION_HUB_PATH")
            .map_err(|_| HubError::MissingConfig("NOTIFICATION_HUB_PATH"))?;
        let timeout_secs = std::env::var("NOTIFICATION_HUB_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string())
            .parse()
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self::new(connection_string, hub_path).with_timeout(Duration::from_secs(timeout_secs)))
    }
}

impl std::fmt::Debug for HubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConfig")
            .field("connection_string", &"<redacted>")
            .field("hub_path", &self.hub_path)
            .field("timeout", &self.timeout)
            .finish()
    }
}
