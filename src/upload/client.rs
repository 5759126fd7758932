use crate::error::UploadError;
use async_trait::async_trait;
use reqwest::{header, Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Path of the collector's upload endpoint, relative to the site root
pub const UPLOAD_PATH: &str = "/Images/UploadImage";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration returned by the collector after a successful upload.
///
/// The cadence is server-authoritative: the collector reads it from its own
/// configuration and never computes it from traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(rename = "Duration")]
    pub duration_seconds: u64,
}

/// Validate a destination site address before any network attempt.
///
/// Only absolute http/https URLs qualify; anything else is user-correctable
/// `InvalidDestination`.
pub fn validate_destination(url: &str) -> Result<Url, UploadError> {
    Url::parse(url)
        .ok()
        .filter(|parsed| matches!(parsed.scheme(), "http" | "https"))
        .ok_or_else(|| UploadError::InvalidDestination {
            url: url.to_string(),
        })
}

/// Seam for driving the scheduler without a live collector in tests
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, jpeg: &[u8], destination: &Url) -> Result<ServerConfig, UploadError>;
}

/// HTTP upload client for the collector's wire contract.
///
/// The JPEG body is posted raw (no multipart envelope) and written in full
/// before the response is awaited. An attempt in flight cannot be cancelled
/// short of process shutdown.
pub struct HttpUploadClient {
    http: Client,
}

impl HttpUploadClient {
    pub fn new() -> Result<Self, UploadError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| UploadError::transfer(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ImageUploader for HttpUploadClient {
    async fn upload(&self, jpeg: &[u8], destination: &Url) -> Result<ServerConfig, UploadError> {
        let endpoint = destination
            .join(UPLOAD_PATH)
            .map_err(|_| UploadError::InvalidDestination {
                url: destination.to_string(),
            })?;

        debug!("Uploading {} bytes to {}", jpeg.len(), endpoint);

        let response = self
            .http
            .post(endpoint.clone())
            .header(header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg.to_vec())
            .send()
            .await
            .map_err(|e| UploadError::transfer(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Collector returned {} for {}", status, endpoint);
            return Err(UploadError::transfer(format!(
                "collector returned {}",
                status
            )));
        }

        let config: ServerConfig = response
            .json()
            .await
            .map_err(|e| UploadError::transfer(format!("unparsable response body: {}", e)))?;

        debug!(
            "Upload accepted, server cadence {}s",
            config.duration_seconds
        );
        Ok(config)
    }
}
