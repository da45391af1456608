//! Relay pool configuration.
//!
//! Stored as camelCase JSON:
//!
//! ```json
//! {
//!   "relays": [
//!     { "url": "wss://relay.damus.io" },
//!     { "url": "wss://nos.lol", "write": false }
//!   ],
//!   "connectTimeoutSecs": 10
//! }
//! ```

use crate::error::{ClientError, Result};
use crate::policy::Policy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// One configured relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaySpec {
    pub url: String,

    #[serde(flatten)]
    pub policy: Policy,
}

impl RelaySpec {
    pub fn new(url: impl Into<String>, policy: Policy) -> Self {
        Self {
            url: url.into(),
            policy,
        }
    }
}

/// Relay pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    /// Relays connected by `RelayPool::connect_configured`
    #[serde(default)]
    pub relays: Vec<RelaySpec>,

    /// Dial timeout per relay
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Notices buffered per receiver before the oldest are dropped
    #[serde(default = "default_notice_buffer")]
    pub notice_buffer: usize,

    /// Events buffered per subscription before new ones are dropped
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_notice_buffer() -> usize {
    1000
}

fn default_event_buffer() -> usize {
    256
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            relays: Vec::new(),
            connect_timeout_secs: default_connect_timeout_secs(),
            notice_buffer: default_notice_buffer(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl PoolConfig {
    /// Parse configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn with_relay(mut self, url: impl Into<String>, policy: Policy) -> Self {
        self.relays.push(RelaySpec::new(url, policy));
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
