use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::poller::PollConfig;

/// Default cadence between status queries for a converting file.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub poll_interval_ms: u64,
    /// Consecutive failed status queries tolerated before a poll gives up.
    /// `None` keeps polling for as long as the session is converting.
    pub max_consecutive_poll_failures: Option<u32>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_consecutive_poll_failures: None,
        }
    }
}

impl ControllerConfig {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_consecutive_failures: self.max_consecutive_poll_failures,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            poll_interval_ms = self.poll_interval_ms,
            max_consecutive_poll_failures = ?self.max_consecutive_poll_failures,
            "Loaded ControllerConfig"
        );
        debug!(?self, "ControllerConfig loaded (full debug)");
    }
}
