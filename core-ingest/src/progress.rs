//! # Progress Tracker
//!
//! Durable per-item progress, keyed by archive identifier.
//!
//! ## Overview
//!
//! The progress file is a single JSON document mapping identifiers to
//! [`ProcessingStatus`], rewritten wholesale after every state transition.
//! Rewrites go through a temp file followed by a rename so a crash mid-write
//! never leaves a truncated document behind.
//!
//! The file is single-writer-per-path: one pipeline instance per progress
//! file, with no cross-process locking.

use crate::item::ProcessingStatus;
use crate::{IngestError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Durable progress map persistence.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    path: PathBuf,
}

impl ProgressTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the persisted progress file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted progress map.
    ///
    /// A missing file yields an empty map. A file that exists but does not
    /// parse fails with [`IngestError::CorruptProgressState`]; the caller
    /// may treat that as "start fresh" after logging.
    pub async fn load(&self) -> Result<HashMap<String, ProcessingStatus>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No progress file at {}, starting empty", self.path.display());
                return Ok(HashMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes).map_err(|e| IngestError::CorruptProgressState {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Atomically overwrite the progress file with the full current state.
    ///
    /// Called after every state transition touching any item; the cost of a
    /// full rewrite on the hot path is accepted.
    pub async fn save(&self, state: &HashMap<String, ProcessingStatus>) -> Result<()> {
        let json = serde_json::to_vec_pretty(state).map_err(|e| {
            IngestError::CorruptProgressState {
                path: self.path.display().to_string(),
                reason: format!("serialization failed: {}", e),
            }
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Temp-then-rename keeps the file parseable across a crash mid-write.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            "Persisted progress for {} items to {}",
            state.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemState;
    use uuid::Uuid;

    fn temp_progress_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("core-ingest-test-{}", Uuid::new_v4()))
            .join("progress.json")
    }

    fn sample_state() -> HashMap<String, ProcessingStatus> {
        let mut state = HashMap::new();
        let mut status = ProcessingStatus::new();
        status.transition(ItemState::Downloading).unwrap();
        status.transition(ItemState::Downloaded).unwrap();
        status.sha256 = Some("cafebabe".to_string());
        status.size_bytes = 1024;
        state.insert("doc-1".to_string(), status);
        state.insert("doc-2".to_string(), ProcessingStatus::new());
        state
    }

    #[tokio::test]
    async fn test_missing_file_yields_empty_map() {
        let tracker = ProgressTracker::new(temp_progress_path());
        let state = tracker.load().await.unwrap();
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let path = temp_progress_path();
        let tracker = ProgressTracker::new(&path);

        let state = sample_state();
        tracker.save(&state).await.unwrap();
        let loaded = tracker.load().await.unwrap();

        assert_eq!(loaded, state);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_save_is_full_rewrite() {
        let path = temp_progress_path();
        let tracker = ProgressTracker::new(&path);

        tracker.save(&sample_state()).await.unwrap();

        let mut smaller = HashMap::new();
        smaller.insert("doc-9".to_string(), ProcessingStatus::new());
        tracker.save(&smaller).await.unwrap();

        let loaded = tracker.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("doc-9"));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let path = temp_progress_path();
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&path, b"{\"doc-1\": {\"state\": \"pend")
            .await
            .unwrap();

        let tracker = ProgressTracker::new(&path);
        let result = tracker.load().await;

        assert!(matches!(
            result,
            Err(IngestError::CorruptProgressState { .. })
        ));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let path = temp_progress_path();
        let tracker = ProgressTracker::new(&path);

        tracker.save(&sample_state()).await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
