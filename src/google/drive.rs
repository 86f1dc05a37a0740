//! Drive v3 client: multipart upload and link sharing.

use super::{endpoint, expect_success, json_body, TokenProvider};
use crate::error::RemoteError;
use crate::pipeline::upload::{CreatedFile, StorageService};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

const SERVICE: &str = "drive";

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3/";
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3/";

/// [`StorageService`] backed by Google Drive.
pub struct DriveClient {
    http: reqwest::Client,
    token: Arc<dyn TokenProvider>,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    pub fn new(http: reqwest::Client, token: Arc<dyn TokenProvider>) -> Self {
        Self::with_base_urls(http, token, DRIVE_API_BASE, DRIVE_UPLOAD_BASE)
    }

    /// Point the client at another host, e.g. a local test server.
    pub fn with_base_urls(
        http: reqwest::Client,
        token: Arc<dyn TokenProvider>,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token,
            api_base: api_base.into(),
            upload_base: upload_base.into(),
        }
    }
}

/// Body and boundary for a `multipart/related` upload: JSON metadata, then content.
pub fn multipart_related(metadata: &serde_json::Value, mime_type: &str, content: &[u8]) -> (String, Vec<u8>) {
    let boundary = format!(
        "pdf2sheet-{:016x}",
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );

    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (boundary, body)
}

#[async_trait]
impl StorageService for DriveClient {
    async fn create_file(
        &self,
        name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
        folder_id: &str,
    ) -> Result<CreatedFile, RemoteError> {
        let token = self.token.access_token().await?;
        let metadata = json!({
            "name": name,
            "parents": [folder_id],
            "mimeType": mime_type,
        });
        let (boundary, body) = multipart_related(&metadata, mime_type, &bytes);

        let url = endpoint(SERVICE, &self.upload_base, &["files"])?;
        debug!("Drive: uploading {} ({} bytes)", name, bytes.len());
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .query(&[
                ("uploadType", "multipart"),
                ("fields", "id,name,webViewLink"),
                ("supportsAllDrives", "true"),
            ])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| RemoteError::transport(SERVICE, e))?;

        json_body(SERVICE, response).await
    }

    async fn grant_public_read(&self, file_id: &str) -> Result<(), RemoteError> {
        let token = self.token.access_token().await?;
        let url = endpoint(SERVICE, &self.api_base, &["files", file_id, "permissions"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .query(&[("supportsAllDrives", "true")])
            .json(&json!({ "type": "anyone", "role": "reader" }))
            .send()
            .await
            .map_err(|e| RemoteError::transport(SERVICE, e))?;

        expect_success(SERVICE, response).await?;
        debug!("Drive: {} is now readable by anyone with the link", file_id);
        Ok(())
    }
}
