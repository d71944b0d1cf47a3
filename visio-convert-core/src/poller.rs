//! Status poller: one cancellable task per converting session.
//!
//! The first query fires immediately, later ones `interval` apart. Polling
//! continues only while the service keeps answering `converting`; a failed
//! query is retried on the same cadence. Every observed status is handed to
//! the `on_update` callback in the order the queries were issued.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_POLL_INTERVAL_MS;
use crate::contract::{ConversionBackend, ConversionResponse, ConversionStatus, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// `None` retries failed queries indefinitely.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_consecutive_failures: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    Status(ConversionResponse),
    /// Emitted once, as the last event, when the failure cap is reached.
    GaveUp { error: TransportError },
}

/// Handle to a running poll. Dropping it cancels the poll.
#[derive(Debug)]
pub struct PollHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Stop scheduling queries. A query already in flight is not delivered.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub fn poll<B, F>(
    backend: Arc<B>,
    id: impl Into<String>,
    mut on_update: F,
    config: &PollConfig,
) -> PollHandle
where
    B: ConversionBackend + ?Sized + 'static,
    F: FnMut(PollEvent) + Send + 'static,
{
    let id = id.into();
    let token = CancellationToken::new();
    let cancelled = token.clone();
    let PollConfig {
        interval,
        max_consecutive_failures,
    } = config.clone();

    let task = tokio::spawn(async move {
        info!(
            file_id = %id,
            interval_ms = interval.as_millis() as u64,
            "Polling conversion status"
        );
        let mut failures: u32 = 0;
        loop {
            if cancelled.is_cancelled() {
                break;
            }
            let result = backend.query_status(&id).await;
            if cancelled.is_cancelled() {
                debug!(file_id = %id, "Discarding status that arrived after cancellation");
                break;
            }

            match result {
                Ok(report) => {
                    failures = 0;
                    let keep_going = report.status == ConversionStatus::Converting;
                    debug!(file_id = %id, status = %report.status, "Observed conversion status");
                    on_update(PollEvent::Status(report));
                    if !keep_going {
                        break;
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(file_id = %id, error = ?e, failures, "Status query failed, will retry");
                    if max_consecutive_failures.is_some_and(|cap| failures >= cap) {
                        warn!(file_id = %id, failures, "Giving up on status polling");
                        on_update(PollEvent::GaveUp { error: e });
                        break;
                    }
                }
            }

            tokio::select! {
                _ = cancelled.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!(file_id = %id, "Stopped polling conversion status");
    });

    PollHandle { token, task }
}
