#![doc = "HTTP transport for the conversion service, backing `ConversionBackend` with reqwest."]
//
//! # Conversion service client
//!
//! This module wires the [`ConversionBackend`] trait from `visio-convert-core`
//! to the real REST API of the conversion service.
//!
//! - Construct [`HttpBackend`] with the service base URL (see `load_config`).
//! - Each trait method issues exactly one request; nothing is retried here.
//! - Non-success responses are turned into [`TransportError::Api`], using the
//!   body's `detail` field when the service provides one.
//! - [`HttpBackend::download_to`] fetches a converted artifact and writes it
//!   to disk atomically.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use visio_convert_core::contract::{
    ConversionBackend, ConversionResponse, FileListResponse, TransportError, UploadResponse,
};

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// Human-readable message for a failed response body, or `fallback`.
pub(crate) fn error_message(body: &str, fallback: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: Some(serde_json::Value::String(detail)),
        }) if !detail.is_empty() => detail,
        Ok(ErrorBody {
            detail: Some(detail),
        }) if !detail.is_null() && !detail.is_string() => detail.to_string(),
        _ => fallback.to_string(),
    }
}

fn network(e: reqwest::Error) -> TransportError {
    TransportError::Network(e.to_string())
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            tracing::error!(error = ?e, "Failed to build HTTP client");
            network(e)
        })?;
        tracing::info!(
            base_url,
            timeout_secs = timeout.as_secs(),
            "Initialised conversion service client"
        );
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and hand back the response if its status is a success.
    async fn send(
        &self,
        request: RequestBuilder,
        fallback: &str,
    ) -> Result<Response, TransportError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!(error = ?e, "Request to conversion service failed");
            network(e)
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body, fallback);
        tracing::error!(status = status.as_u16(), %message, "Conversion service returned an error");
        Err(TransportError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        fallback: &str,
    ) -> Result<T, TransportError> {
        let response = self.send(request, fallback).await?;
        response.json::<T>().await.map_err(|e| {
            tracing::error!(error = ?e, "Could not decode conversion service response");
            TransportError::Decode(e.to_string())
        })
    }

    /// Fetch the converted artifact of `id` into `dest`. Returns the bytes written.
    pub async fn download_to(&self, id: &str, dest: &Path) -> anyhow::Result<u64> {
        use anyhow::Context;

        tracing::info!(file_id = id, dest = %dest.display(), "Downloading converted file");
        let request = self.client.get(self.url(&self.result_location(id)));
        let response = self.send(request, "Download failed").await?;
        let bytes = response.bytes().await.map_err(network)?;

        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
        tmp.write_all(&bytes)
            .context("Failed to write downloaded content")?;
        tmp.persist(dest)
            .with_context(|| format!("Failed to move download into place at {}", dest.display()))?;

        tracing::info!(
            file_id = id,
            bytes = bytes.len(),
            dest = %dest.display(),
            "Saved converted file"
        );
        Ok(bytes.len() as u64)
    }
}

#[async_trait]
impl ConversionBackend for HttpBackend {
    async fn submit(&self, bytes: Vec<u8>, name: &str) -> Result<UploadResponse, TransportError> {
        tracing::info!(file = name, size_bytes = bytes.len(), "Uploading file");
        let part = Part::bytes(bytes).file_name(name.to_string());
        let form = Form::new().part("file", part);
        let request = self.client.post(self.url("/api/upload")).multipart(form);
        let uploaded: UploadResponse = self.send_json(request, "Upload failed").await?;
        tracing::info!(file_id = %uploaded.file_id, "Upload accepted");
        Ok(uploaded)
    }

    async fn trigger_convert(&self, id: &str) -> Result<ConversionResponse, TransportError> {
        tracing::info!(file_id = id, "Triggering conversion");
        let request = self.client.post(self.url(&format!("/api/convert/{id}")));
        self.send_json(request, "Conversion failed").await
    }

    async fn query_status(&self, id: &str) -> Result<ConversionResponse, TransportError> {
        let request = self.client.get(self.url(&format!("/api/convert/{id}/status")));
        let report: ConversionResponse = self.send_json(request, "Failed to get status").await?;
        tracing::debug!(file_id = id, status = %report.status, "Fetched conversion status");
        Ok(report)
    }

    async fn list_all(&self) -> Result<FileListResponse, TransportError> {
        let request = self.client.get(self.url("/api/files"));
        let listing: FileListResponse = self.send_json(request, "Failed to get files").await?;
        tracing::info!(count = listing.files.len(), "Fetched file listing");
        Ok(listing)
    }

    async fn remove(&self, id: &str) -> Result<(), TransportError> {
        tracing::info!(file_id = id, "Deleting file");
        let request = self.client.delete(self.url(&format!("/api/files/{id}")));
        self.send(request, "Failed to delete file").await?;
        Ok(())
    }

    fn result_location(&self, id: &str) -> String {
        format!("/api/download/{id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_string_is_used_as_message() {
        assert_eq!(
            error_message(r#"{"detail":"File not found"}"#, "Failed to delete file"),
            "File not found"
        );
    }

    #[test]
    fn missing_or_empty_detail_falls_back() {
        assert_eq!(error_message("{}", "Upload failed"), "Upload failed");
        assert_eq!(error_message(r#"{"detail":""}"#, "Upload failed"), "Upload failed");
        assert_eq!(error_message(r#"{"detail":null}"#, "Upload failed"), "Upload failed");
        assert_eq!(error_message("<html>502</html>", "Upload failed"), "Upload failed");
        assert_eq!(error_message("", "Upload failed"), "Upload failed");
    }

    #[test]
    fn structured_detail_is_rendered_as_json() {
        let msg = error_message(r#"{"detail":[{"msg":"field required"}]}"#, "Upload failed");
        assert!(msg.contains("field required"), "got: {msg}");
    }

    #[test]
    fn urls_are_built_from_a_trimmed_base() {
        let backend = HttpBackend::new("http://localhost:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:8000");
        assert_eq!(backend.url("/api/files"), "http://localhost:8000/api/files");
    }

    #[test]
    fn result_location_matches_the_service_download_url() {
        let backend = HttpBackend::new("http://localhost:8000", Duration::from_secs(5)).unwrap();
        let body = r#"{
            "file_id": "f1",
            "status": "completed",
            "message": "done",
            "download_url": "/api/download/f1"
        }"#;
        let report: ConversionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            Some(backend.result_location("f1")),
            report.download_url,
            "listing and polling must yield the same handle"
        );
    }
}
