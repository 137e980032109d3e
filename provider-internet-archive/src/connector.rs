//! S3-compatible archive gateway connector
//!
//! Implements the `ArchiveStore` trait over the gateway's three surfaces:
//! the S3-style bucket endpoint for writes, the metadata endpoint for
//! reads, and the download endpoint for file retrieval.

use async_trait::async_trait;
use bytes::Bytes;
use core_runtime::ArchiveCredentials;
use futures_util::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use archive_traits::{ArchiveStore, ItemMetadata, RemoteFileInfo, UploadMetadata};

use crate::error::{IaError, Result};
use crate::types::IaMetadataResponse;

/// Timeout for metadata and control operations (lock markers, deletes).
const CONTROL_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for payload transfers (uploads, downloads, fetch-from-source).
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(900);

/// Retry budget for idempotent metadata reads.
const METADATA_RETRIES: u32 = 3;

/// Gateway endpoint set, overridable for tests and alternate deployments.
#[derive(Debug, Clone)]
pub struct IaEndpoints {
    /// S3-style write endpoint, e.g. `https://s3.us.archive.org`
    pub s3_base: String,
    /// Metadata read endpoint, e.g. `https://archive.org/metadata`
    pub metadata_base: String,
    /// File download endpoint, e.g. `https://archive.org/download`
    pub download_base: String,
    /// Human-facing item page endpoint, e.g. `https://archive.org/details`
    pub details_base: String,
}

impl Default for IaEndpoints {
    fn default() -> Self {
        Self {
            s3_base: "https://s3.us.archive.org".to_string(),
            metadata_base: "https://archive.org/metadata".to_string(),
            download_base: "https://archive.org/download".to_string(),
            details_base: "https://archive.org/details".to_string(),
        }
    }
}

/// Archive gateway connector
///
/// # Features
///
/// - Bucket-per-item uploads with metadata headers
/// - Zero-copy fetch-from-source transfers
/// - Exponential backoff for rate limiting on metadata reads
/// - Streaming file uploads and downloads
///
/// # Example
///
/// ```ignore
/// use provider_internet_archive::IaS3Connector;
/// use archive_traits::ArchiveStore;
///
/// let connector = IaS3Connector::new(credentials);
/// let meta = connector.get_metadata("agency-corpus-db").await?;
/// ```
pub struct IaS3Connector {
    client: reqwest::Client,
    credentials: ArchiveCredentials,
    endpoints: IaEndpoints,
}

impl IaS3Connector {
    /// Create a connector against the default public endpoints.
    pub fn new(credentials: ArchiveCredentials) -> Self {
        Self::with_endpoints(credentials, IaEndpoints::default())
    }

    /// Create a connector against explicit endpoints.
    pub fn with_endpoints(credentials: ArchiveCredentials, endpoints: IaEndpoints) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            endpoints,
        }
    }

    /// Build the gateway authorization header value.
    fn auth_header(&self) -> String {
        format!(
            "LOW {}:{}",
            self.credentials.access_key, self.credentials.secret_key
        )
    }

    /// Derive the remote filename for a fetched source URL.
    fn filename_from_url(source_url: &str) -> String {
        source_url
            .split('?')
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|segment| !segment.is_empty() && segment.contains('.'))
            .map(|segment| segment.to_string())
            .unwrap_or_else(|| "document.pdf".to_string())
    }

    /// Apply auth, bucket-creation, and metadata headers to a write request.
    fn write_headers(
        &self,
        request: reqwest::RequestBuilder,
        metadata: &UploadMetadata,
    ) -> reqwest::RequestBuilder {
        let mut request = request
            .header("Authorization", self.auth_header())
            .header("x-amz-auto-make-bucket", "1");

        for (key, value) in metadata.fields() {
            request = request.header(format!("x-archive-meta-{}", key), value);
        }

        request
    }

    /// Turn a non-success response into a classified provider error.
    async fn error_from_response(response: reqwest::Response) -> IaError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let mut message = body.trim().to_string();
        message.truncate(512);
        IaError::ApiError {
            status_code: status,
            message,
        }
    }

    /// Execute an idempotent GET with retry on rate limits and 5xx.
    #[instrument(skip(self), fields(url = %url))]
    async fn get_with_retry(&self, url: &str, timeout: Duration) -> Result<reqwest::Response> {
        let mut attempt = 0;

        loop {
            let result = self
                .client
                .get(url)
                .header("Accept", "application/json")
                .timeout(timeout)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if response.status().is_success() {
                        debug!("gateway request succeeded: status={}", status);
                        return Ok(response);
                    } else if status == 429 || (500..600).contains(&status) {
                        attempt += 1;
                        if attempt >= METADATA_RETRIES {
                            warn!(
                                "gateway request failed after {} attempts: status={}",
                                METADATA_RETRIES, status
                            );
                            return Err(Self::error_from_response(response).await);
                        }

                        let backoff_ms = 100u64 * 2u64.pow(attempt);
                        warn!(
                            "gateway request failed (attempt {}/{}): status={}, retrying in {}ms",
                            attempt, METADATA_RETRIES, status, backoff_ms
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    } else {
                        warn!("gateway request failed: status={}", status);
                        return Err(Self::error_from_response(response).await);
                    }
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= METADATA_RETRIES {
                        warn!("gateway request failed after {} attempts: {}", METADATA_RETRIES, e);
                        return Err(IaError::from_transport(e));
                    }

                    let backoff_ms = 100u64 * 2u64.pow(attempt);
                    warn!(
                        "gateway request failed (attempt {}/{}): {}, retrying in {}ms",
                        attempt, METADATA_RETRIES, e, backoff_ms
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }

    async fn put_ok(&self, request: reqwest::RequestBuilder) -> Result<()> {
        let response = request.send().await.map_err(IaError::from_transport)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(response).await)
        }
    }
}

#[async_trait]
impl ArchiveStore for IaS3Connector {
    #[instrument(skip(self, metadata), fields(identifier = %identifier, source_url = %source_url))]
    async fn upload_from_url(
        &self,
        identifier: &str,
        source_url: &str,
        metadata: &UploadMetadata,
    ) -> archive_traits::Result<()> {
        info!("Requesting fetch-from-source transfer");

        let filename = Self::filename_from_url(source_url);
        let url = format!("{}/{}/{}", self.endpoints.s3_base, identifier, filename);

        let request = self
            .write_headers(self.client.put(&url), metadata)
            .header("x-archive-fetch-url", source_url)
            .header("x-archive-queue-derive", "0")
            .timeout(TRANSFER_TIMEOUT);

        self.put_ok(request).await?;
        info!("Fetch-from-source transfer accepted");
        Ok(())
    }

    #[instrument(skip(self, metadata), fields(identifier = %identifier, path = %local_path.display()))]
    async fn upload_file(
        &self,
        identifier: &str,
        local_path: &Path,
        metadata: &UploadMetadata,
    ) -> archive_traits::Result<()> {
        let filename = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                archive_traits::ArchiveError::Fatal(format!(
                    "Upload path has no usable filename: {}",
                    local_path.display()
                ))
            })?
            .to_string();

        let file = tokio::fs::File::open(local_path)
            .await
            .map_err(IaError::Io)?;
        let length = file.metadata().await.map_err(IaError::Io)?.len();
        let stream = tokio_util::io::ReaderStream::new(file);

        info!("Uploading {} bytes as {}", length, filename);

        let url = format!("{}/{}/{}", self.endpoints.s3_base, identifier, filename);
        let request = self
            .write_headers(self.client.put(&url), metadata)
            .header("Content-Length", length)
            .body(reqwest::Body::wrap_stream(stream))
            .timeout(TRANSFER_TIMEOUT);

        self.put_ok(request).await?;
        info!("Upload complete");
        Ok(())
    }

    #[instrument(skip(self, bytes, metadata), fields(identifier = %identifier, remote_filename = %remote_filename))]
    async fn upload_bytes(
        &self,
        identifier: &str,
        remote_filename: &str,
        bytes: Bytes,
        metadata: &UploadMetadata,
    ) -> archive_traits::Result<()> {
        debug!("Uploading {} control bytes", bytes.len());

        let url = format!(
            "{}/{}/{}",
            self.endpoints.s3_base, identifier, remote_filename
        );
        let request = self
            .write_headers(self.client.put(&url), metadata)
            .body(bytes)
            .timeout(CONTROL_TIMEOUT);

        self.put_ok(request).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(identifier = %identifier, remote_filename = %remote_filename))]
    async fn download_file(
        &self,
        identifier: &str,
        remote_filename: &str,
        dest_path: &Path,
    ) -> archive_traits::Result<()> {
        info!("Downloading to {}", dest_path.display());

        let url = format!(
            "{}/{}/{}",
            self.endpoints.download_base,
            identifier,
            urlencoding::encode(remote_filename)
        );

        let response = self
            .client
            .get(&url)
            .timeout(TRANSFER_TIMEOUT)
            .send()
            .await
            .map_err(IaError::from_transport)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await.into());
        }

        let mut file = tokio::fs::File::create(dest_path)
            .await
            .map_err(IaError::Io)?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(IaError::from_transport)?;
            written += chunk.len() as u64;
            file.write_all(&chunk).await.map_err(IaError::Io)?;
        }
        file.flush().await.map_err(IaError::Io)?;

        info!("Downloaded {} bytes", written);
        Ok(())
    }

    #[instrument(skip(self), fields(identifier = %identifier))]
    async fn get_metadata(&self, identifier: &str) -> archive_traits::Result<Option<ItemMetadata>> {
        let url = format!("{}/{}", self.endpoints.metadata_base, identifier);
        let response = self.get_with_retry(&url, CONTROL_TIMEOUT).await?;

        let body = response.bytes().await.map_err(IaError::from_transport)?;
        let parsed: IaMetadataResponse = serde_json::from_slice(&body).map_err(|e| {
            IaError::ParseError(format!("Failed to parse metadata response: {}", e))
        })?;

        // The gateway answers unknown identifiers with an empty document.
        if parsed.is_missing() {
            debug!("Item not found");
            return Ok(None);
        }

        let files = parsed
            .files
            .iter()
            .map(|f| RemoteFileInfo {
                name: f.name.clone(),
                size: f.size_bytes(),
                mtime: f.mtime_epoch(),
                etag: f.checksum(),
            })
            .collect();

        Ok(Some(ItemMetadata {
            files,
            metadata: parsed.metadata,
        }))
    }

    #[instrument(skip(self), fields(identifier = %identifier))]
    async fn delete_item(&self, identifier: &str) -> archive_traits::Result<()> {
        info!("Deleting item");

        let url = format!("{}/{}", self.endpoints.s3_base, identifier);
        let response = self
            .client
            .delete(&url)
            .header("Authorization", self.auth_header())
            .header("x-archive-cascade-delete", "1")
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await
            .map_err(IaError::from_transport)?;

        // Deleting an absent item is success: the desired state holds.
        if response.status().is_success() || response.status().as_u16() == 404 {
            Ok(())
        } else {
            Err(Self::error_from_response(response).await.into())
        }
    }

    fn item_url(&self, identifier: &str) -> String {
        format!("{}/{}", self.endpoints.details_base, identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector() -> IaS3Connector {
        IaS3Connector::new(ArchiveCredentials::new("acct", "AKID", "SECRET"))
    }

    #[test]
    fn test_auth_header_format() {
        assert_eq!(connector().auth_header(), "LOW AKID:SECRET");
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            IaS3Connector::filename_from_url("https://example.gov/docs/report-17.pdf"),
            "report-17.pdf"
        );
        assert_eq!(
            IaS3Connector::filename_from_url("https://example.gov/docs/report.pdf?v=2"),
            "report.pdf"
        );
        // No extension in the last segment: fall back to a stable default.
        assert_eq!(
            IaS3Connector::filename_from_url("https://example.gov/view"),
            "document.pdf"
        );
        assert_eq!(
            IaS3Connector::filename_from_url("https://example.gov/"),
            "document.pdf"
        );
    }

    #[test]
    fn test_item_url_points_at_details_page() {
        assert_eq!(
            connector().item_url("agency-doc-1"),
            "https://archive.org/details/agency-doc-1"
        );
    }

    #[test]
    fn test_default_endpoints() {
        let endpoints = IaEndpoints::default();
        assert!(endpoints.s3_base.starts_with("https://s3."));
        assert!(endpoints.metadata_base.ends_with("/metadata"));
    }
}
