//! Remote Archive Storage Abstraction
//!
//! Defines the [`ArchiveStore`] trait consumed by the ingestion pipeline,
//! the distributed lock manager, and the database reconciler. Concrete
//! implementations live in provider crates (e.g. `provider-internet-archive`)
//! so an alternate transport can be substituted without touching
//! orchestration logic.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;

/// Metadata describing a single file stored under an archive item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileInfo {
    /// File name within the item.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time as a Unix timestamp, when the archive
    /// reports one.
    pub mtime: Option<i64>,
    /// Content checksum reported by the archive, when available.
    pub etag: Option<String>,
}

/// Metadata for an archive item: its files plus the free-form key/value
/// metadata attached at upload time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub files: Vec<RemoteFileInfo>,
    pub metadata: HashMap<String, String>,
}

impl ItemMetadata {
    /// Look up a file entry by name.
    pub fn file(&self, name: &str) -> Option<&RemoteFileInfo> {
        self.files.iter().find(|f| f.name == name)
    }
}

/// Key/value metadata attached to an upload.
///
/// Providers translate these into whatever their transport supports
/// (e.g. `x-archive-meta-*` headers on an S3-style gateway).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadMetadata {
    fields: Vec<(String, String)>,
}

impl UploadMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a metadata field, builder-style.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Iterate over all fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Remote archive operations.
///
/// Every method carries a bounded timeout inside the implementation and
/// returns a classified [`ArchiveError`](crate::ArchiveError) on failure so
/// callers can branch on [`ErrorClass`](crate::ErrorClass) rather than
/// diagnostic text.
///
/// # Example
///
/// ```ignore
/// use archive_traits::{ArchiveStore, UploadMetadata};
///
/// async fn mirror(store: &dyn ArchiveStore) -> archive_traits::Result<()> {
///     let meta = UploadMetadata::new()
///         .with_field("collection", "opensource")
///         .with_field("mediatype", "texts");
///     store
///         .upload_from_url("doc-2024-0117", "https://example.gov/a.pdf", &meta)
///         .await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Zero-copy transfer: instruct the archive to fetch `source_url`
    /// itself and store the payload under `identifier`.
    async fn upload_from_url(
        &self,
        identifier: &str,
        source_url: &str,
        metadata: &UploadMetadata,
    ) -> Result<()>;

    /// Upload a local file under `identifier`.
    async fn upload_file(
        &self,
        identifier: &str,
        local_path: &Path,
        metadata: &UploadMetadata,
    ) -> Result<()>;

    /// Upload an in-memory payload as `remote_filename` under `identifier`.
    ///
    /// Used for small control artifacts (lock records) that have no local
    /// file backing.
    async fn upload_bytes(
        &self,
        identifier: &str,
        remote_filename: &str,
        bytes: Bytes,
        metadata: &UploadMetadata,
    ) -> Result<()>;

    /// Download `remote_filename` from `identifier` to `dest_path`.
    async fn download_file(
        &self,
        identifier: &str,
        remote_filename: &str,
        dest_path: &Path,
    ) -> Result<()>;

    /// Fetch item metadata. Returns `Ok(None)` when the identifier does not
    /// exist in the archive.
    async fn get_metadata(&self, identifier: &str) -> Result<Option<ItemMetadata>>;

    /// Delete an item and all of its files.
    async fn delete_item(&self, identifier: &str) -> Result<()>;

    /// Check whether an item exists.
    async fn item_exists(&self, identifier: &str) -> Result<bool> {
        Ok(self.get_metadata(identifier).await?.is_some())
    }

    /// Public URL of an item, recorded in progress state on completion.
    fn item_url(&self, identifier: &str) -> String {
        format!("archive://{}", identifier)
    }
}
