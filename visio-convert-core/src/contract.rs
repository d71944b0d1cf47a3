//! # contract: wire types and the transport seam
//!
//! This module defines the [`ConversionBackend`] trait, the single interface
//! through which the lifecycle code reaches the remote conversion service,
//! together with the plain data types that travel over that interface.
//!
//! ## Interface
//! - Every remote action maps to exactly one trait method and one remote call.
//! - Non-success responses become a [`TransportError`] carrying a human-readable
//!   message; implementations never retry.
//! - `result_location` is synchronous: the converted artifact is fetched out of
//!   band by whoever holds the address.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; `MockConversionBackend` is exported
//!   under the default `test-export-mocks` feature so dependent crates and
//!   integration tests can script backend behaviour.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Conversion status exactly as the service spells it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    Uploaded,
    Converting,
    Completed,
    Failed,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStatus::Uploaded => "uploaded",
            ConversionStatus::Converting => "converting",
            ConversionStatus::Completed => "completed",
            ConversionStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` see no further automatic transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversionStatus::Completed | ConversionStatus::Failed)
    }
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response to `POST /api/upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_id: String,
    pub message: String,
}

/// Response to both triggering a conversion and querying its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResponse {
    pub file_id: String,
    pub status: ConversionStatus,
    pub message: String,
    /// Only present once the converted artifact can be fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

/// One entry of `GET /api/files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    pub filename: String,
    pub original_filename: String,
    pub status: ConversionStatus,
    pub size: u64,
    pub upload_time: String,
    #[serde(default)]
    pub converted_filename: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListResponse {
    pub files: Vec<FileInfo>,
    pub total: usize,
}

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The service answered with a non-success status.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(String),

    /// The response arrived but its body could not be understood.
    #[error("Unexpected response from conversion service: {0}")]
    Decode(String),
}

/// Transport seam to the remote conversion service.
///
/// Implemented by the HTTP client in the CLI crate and by test mocks.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Upload a document; the service assigns its id.
    async fn submit(&self, bytes: Vec<u8>, name: &str) -> Result<UploadResponse, TransportError>;

    /// Ask the service to start converting an uploaded document.
    async fn trigger_convert(&self, id: &str) -> Result<ConversionResponse, TransportError>;

    /// Current conversion status of one document.
    async fn query_status(&self, id: &str) -> Result<ConversionResponse, TransportError>;

    /// Every document the service currently knows about.
    async fn list_all(&self) -> Result<FileListResponse, TransportError>;

    /// Delete a document and any converted output.
    async fn remove(&self, id: &str) -> Result<(), TransportError>;

    /// Service-relative address of the converted artifact of `id`, in the
    /// same form as a status report's `download_url`.
    fn result_location(&self, id: &str) -> String;
}
