//! Per-file conversion session.
//!
//! A [`Session`] is an immutable value: every transition returns a new session
//! that replaces the old one wholesale in the controller's collection. The
//! status and its payload share one enum, so a result handle can only exist on
//! a completed session and error text only on a failed one.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::contract::{ConversionResponse, ConversionStatus, FileInfo};

/// Error text used when the service reports a failure without saying why.
pub const DEFAULT_FAILURE_TEXT: &str = "Conversion failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uploaded,
    Converting,
    /// `result_handle` is `None` when the service reported completion without
    /// a download address.
    Completed { result_handle: Option<String> },
    Failed { error_text: String },
}

impl SessionState {
    pub fn status(&self) -> ConversionStatus {
        match self {
            SessionState::Uploaded => ConversionStatus::Uploaded,
            SessionState::Converting => ConversionStatus::Converting,
            SessionState::Completed { .. } => ConversionStatus::Completed,
            SessionState::Failed { .. } => ConversionStatus::Failed,
        }
    }

    fn from_report(report: &ConversionResponse) -> Self {
        match report.status {
            ConversionStatus::Uploaded => SessionState::Uploaded,
            ConversionStatus::Converting => SessionState::Converting,
            ConversionStatus::Completed => {
                if report.download_url.is_none() {
                    warn!(
                        file_id = %report.file_id,
                        "Service reported completion without a download_url"
                    );
                }
                SessionState::Completed {
                    result_handle: report.download_url.clone(),
                }
            }
            ConversionStatus::Failed => SessionState::Failed {
                error_text: if report.message.is_empty() {
                    DEFAULT_FAILURE_TEXT.to_string()
                } else {
                    report.message.clone()
                },
            },
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot retry file {id} while it is {status}; only failed conversions can be retried")]
pub struct InvalidTransition {
    pub id: String,
    pub status: ConversionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    original_name: String,
    size_bytes: u64,
    uploaded_at: DateTime<Utc>,
    state: SessionState,
}

impl Session {
    /// A freshly uploaded file, before conversion has been triggered.
    pub fn uploaded(
        id: impl Into<String>,
        original_name: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            id: id.into(),
            original_name: original_name.into(),
            size_bytes,
            uploaded_at: Utc::now(),
            state: SessionState::Uploaded,
        }
    }

    /// Rebuild a session from the service's file listing.
    pub fn from_file_info(info: &FileInfo, result_location: impl FnOnce(&str) -> String) -> Self {
        let state = match info.status {
            ConversionStatus::Uploaded => SessionState::Uploaded,
            ConversionStatus::Converting => SessionState::Converting,
            ConversionStatus::Completed => SessionState::Completed {
                result_handle: info
                    .converted_filename
                    .as_ref()
                    .map(|_| result_location(&info.id)),
            },
            ConversionStatus::Failed => SessionState::Failed {
                error_text: info
                    .error_message
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FAILURE_TEXT.to_string()),
            },
        };
        Self {
            id: info.id.clone(),
            original_name: info.original_filename.clone(),
            size_bytes: info.size,
            uploaded_at: parse_upload_time(&info.upload_time),
            state,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn uploaded_at(&self) -> DateTime<Utc> {
        self.uploaded_at
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> ConversionStatus {
        self.state.status()
    }

    pub fn result_handle(&self) -> Option<&str> {
        match &self.state {
            SessionState::Completed { result_handle } => result_handle.as_deref(),
            _ => None,
        }
    }

    pub fn error_text(&self) -> Option<&str> {
        match &self.state {
            SessionState::Failed { error_text } => Some(error_text),
            _ => None,
        }
    }

    /// The session as described by a status report from the service.
    pub fn with_report(&self, report: &ConversionResponse) -> Self {
        Self {
            state: SessionState::from_report(report),
            ..self.clone()
        }
    }

    /// The session moved back to `converting` for a user-initiated retry.
    pub fn retried(&self) -> Result<Self, InvalidTransition> {
        match self.state {
            SessionState::Failed { .. } => Ok(Self {
                state: SessionState::Converting,
                ..self.clone()
            }),
            _ => Err(InvalidTransition {
                id: self.id.clone(),
                status: self.status(),
            }),
        }
    }

    /// The session given up on after its status could no longer be observed.
    pub fn lost(&self, reason: &str) -> Self {
        Self {
            state: SessionState::Failed {
                error_text: format!("Lost contact with conversion service: {reason}"),
            },
            ..self.clone()
        }
    }
}

/// The service writes naive local ISO-8601 timestamps; RFC 3339 is accepted too.
fn parse_upload_time(raw: &str) -> DateTime<Utc> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Utc);
    }
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => naive.and_utc(),
        Err(e) => {
            warn!(upload_time = %raw, error = ?e, "Unparseable upload_time, using now");
            Utc::now()
        }
    }
}
