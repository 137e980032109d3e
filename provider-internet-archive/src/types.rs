//! Archive gateway response types
//!
//! Data structures for deserializing the JSON metadata endpoint. The
//! gateway reports numeric fields (sizes, timestamps) as strings, so each
//! entry carries parse helpers.

use serde::Deserialize;
use std::collections::HashMap;

/// One file entry in an item's metadata document.
#[derive(Debug, Clone, Deserialize)]
pub struct IaFileEntry {
    /// File name within the item
    pub name: String,

    /// Size in bytes, reported as a decimal string
    #[serde(default)]
    pub size: Option<String>,

    /// Modification time as a Unix-epoch decimal string
    #[serde(default)]
    pub mtime: Option<String>,

    /// Content checksum when the gateway has computed one
    #[serde(default)]
    pub sha1: Option<String>,

    /// MD5 checksum
    #[serde(default)]
    pub md5: Option<String>,
}

impl IaFileEntry {
    /// Parsed size in bytes; unparseable or absent sizes collapse to 0.
    pub fn size_bytes(&self) -> u64 {
        self.size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    /// Parsed modification time as a Unix timestamp.
    pub fn mtime_epoch(&self) -> Option<i64> {
        self.mtime.as_deref().and_then(|s| s.parse().ok())
    }

    /// Best available checksum: sha1 when present, md5 otherwise.
    pub fn checksum(&self) -> Option<String> {
        self.sha1.clone().or_else(|| self.md5.clone())
    }
}

/// Metadata endpoint response for one item.
///
/// A nonexistent identifier yields an empty JSON object, so every field
/// defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IaMetadataResponse {
    #[serde(default)]
    pub files: Vec<IaFileEntry>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl IaMetadataResponse {
    /// True when the gateway returned the empty document it uses for
    /// unknown identifiers.
    pub fn is_missing(&self) -> bool {
        self.files.is_empty() && self.metadata.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_file_entry() {
        let json = r#"{
            "name": "report.pdf",
            "size": "482133",
            "mtime": "1700001234",
            "sha1": "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        }"#;

        let entry: IaFileEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.name, "report.pdf");
        assert_eq!(entry.size_bytes(), 482_133);
        assert_eq!(entry.mtime_epoch(), Some(1_700_001_234));
        assert!(entry.checksum().unwrap().starts_with("da39"));
    }

    #[test]
    fn test_deserialize_metadata_response() {
        let json = r#"{
            "files": [{"name": "report.pdf", "size": "10", "mtime": "5"}],
            "metadata": {"collection": "opensource", "sha256": "abc"}
        }"#;

        let response: IaMetadataResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.files.len(), 1);
        assert_eq!(response.metadata.get("collection").unwrap(), "opensource");
        assert!(!response.is_missing());
    }

    #[test]
    fn test_missing_item_is_empty_object() {
        let response: IaMetadataResponse = serde_json::from_str("{}").unwrap();
        assert!(response.is_missing());
    }

    #[test]
    fn test_unparseable_size_collapses_to_zero() {
        let entry: IaFileEntry =
            serde_json::from_str(r#"{"name": "x", "size": "n/a"}"#).unwrap();
        assert_eq!(entry.size_bytes(), 0);
        assert_eq!(entry.mtime_epoch(), None);
    }
}
