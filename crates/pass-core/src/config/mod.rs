//! Client configuration.
//!
//! `PassConfig` is read from a JSON file shipped with (or next to) the client
//! and tunes the API endpoint, the acknowledgment debounce window, the event
//! poll cadence and which storage backend to prefer.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::StorageKind;
use crate::util::{normalize_base_url, normalize_text_option};

const DEFAULT_ACK_DEBOUNCE_MS: u64 = 150;
const DEFAULT_EVENT_POLL_INTERVAL_SECS: u64 = 30;
const MAX_ACK_DEBOUNCE_MS: u64 = 10_000;

/// Validated client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassConfig {
    pub api_base_url: String,
    pub app_version: Option<String>,
    pub ack_debounce: Duration,
    pub event_poll_interval: Duration,
    pub storage: StorageKind,
    pub storage_path: Option<PathBuf>,
}

impl PassConfig {
    /// Config with defaults for everything except the API endpoint
    pub fn new(api_base_url: &str) -> Result<Self> {
        RawPassConfig {
            api_base_url: api_base_url.to_string(),
            ..RawPassConfig::default()
        }
        .into_config()
    }

    /// Parse and validate a JSON config payload.
    pub fn parse(payload: &str) -> Result<Self> {
        let raw: RawPassConfig = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))?;
        raw.into_config()
    }

    /// Read and validate a JSON config file.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let payload = tokio::fs::read_to_string(&path).await.map_err(|error| {
            Error::Config(format!("failed to read {}: {error}", path.display()))
        })?;
        Self::parse(&payload)
    }
}

// ---------------------------------------------------------------------------
// Private
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct RawPassConfig {
    api_base_url: String,
    #[serde(default)]
    app_version: Option<String>,
    #[serde(default = "default_ack_debounce_ms")]
    ack_debounce_ms: u64,
    #[serde(default = "default_event_poll_interval_secs")]
    event_poll_interval_secs: u64,
    #[serde(default)]
    storage: StorageKind,
    #[serde(default)]
    storage_path: Option<PathBuf>,
}

impl Default for RawPassConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            app_version: None,
            ack_debounce_ms: DEFAULT_ACK_DEBOUNCE_MS,
            event_poll_interval_secs: DEFAULT_EVENT_POLL_INTERVAL_SECS,
            storage: StorageKind::default(),
            storage_path: None,
        }
    }
}

const fn default_ack_debounce_ms() -> u64 {
    DEFAULT_ACK_DEBOUNCE_MS
}

const fn default_event_poll_interval_secs() -> u64 {
    DEFAULT_EVENT_POLL_INTERVAL_SECS
}

impl RawPassConfig {
    fn into_config(self) -> Result<PassConfig> {
        let api_base_url = normalize_base_url(&self.api_base_url).ok_or_else(|| {
            Error::Config("api_base_url must include http:// or https://".to_string())
        })?;
        if self.ack_debounce_ms > MAX_ACK_DEBOUNCE_MS {
            return Err(Error::Config(format!(
                "ack_debounce_ms must be at most {MAX_ACK_DEBOUNCE_MS} (got {})",
                self.ack_debounce_ms
            )));
        }
        if self.event_poll_interval_secs == 0 {
            return Err(Error::Config(
                "event_poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.storage == StorageKind::Persistent && self.storage_path.is_none() {
            tracing::debug!("No storage_path configured; persistent storage will use the caller's default location");
        }

        Ok(PassConfig {
            api_base_url,
            app_version: normalize_text_option(self.app_version),
            ack_debounce: Duration::from_millis(self.ack_debounce_ms),
            event_poll_interval: Duration::from_secs(self.event_poll_interval_secs),
            storage: self.storage,
            storage_path: self.storage_path,
        })
    }
}
