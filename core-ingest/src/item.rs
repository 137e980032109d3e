//! # Work Item State Machine
//!
//! Per-document ingestion state with validated transitions.
//!
//! ## State Machine
//!
//! ```text
//! pending → downloading → downloaded → uploading → completed
//!     ↓           ↓            ↑           ↓ ↓
//!     └→ uploading (direct)    └───────────┘ └→ failed
//!                 downloading → pending (retry)
//!                 downloading → failed (retry budget exhausted)
//! ```
//!
//! Terminal states: `completed`, `failed`. Progress is persisted after
//! every transition, so interrupted transient states (`downloading`,
//! `uploading`) are normalized back to their resumable predecessors at
//! load time.

use crate::{IngestError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// Work Item
// ============================================================================

/// Immutable description of one document to ingest.
///
/// Created by the external discovery collaborator; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Globally unique name under which the document is stored remotely.
    pub archive_identifier: String,
    /// Where the document is currently hosted.
    pub source_url: String,
    /// Filename used for the staged local copy and the archived file.
    pub canonical_filename: String,
    /// Document date (publication or filing date, not ingestion time).
    pub logical_date: NaiveDate,
}

impl WorkItem {
    pub fn new(
        archive_identifier: impl Into<String>,
        source_url: impl Into<String>,
        canonical_filename: impl Into<String>,
        logical_date: NaiveDate,
    ) -> Self {
        Self {
            archive_identifier: archive_identifier.into(),
            source_url: source_url.into(),
            canonical_filename: canonical_filename.into(),
            logical_date,
        }
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// The current lifecycle state of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// Not yet transferred; eligible for a direct upload attempt
    Pending,
    /// A download is in flight
    Downloading,
    /// A validated local copy exists; eligible for staged upload
    Downloaded,
    /// An upload is in flight
    Uploading,
    /// Stored in the archive; local copy released
    Completed,
    /// Retry budget exhausted
    Failed,
}

impl ItemState {
    /// Check if this state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Completed | ItemState::Failed)
    }

    /// Get the string representation for persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Pending => "pending",
            ItemState::Downloading => "downloading",
            ItemState::Downloaded => "downloaded",
            ItemState::Uploading => "uploading",
            ItemState::Completed => "completed",
            ItemState::Failed => "failed",
        }
    }
}

impl FromStr for ItemState {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ItemState::Pending),
            "downloading" => Ok(ItemState::Downloading),
            "downloaded" => Ok(ItemState::Downloaded),
            "uploading" => Ok(ItemState::Uploading),
            "completed" => Ok(ItemState::Completed),
            "failed" => Ok(ItemState::Failed),
            _ => Err(IngestError::InvalidState(s.to_string())),
        }
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Processing Status
// ============================================================================

/// Mutable per-item state, keyed by archive identifier in the progress file.
///
/// Invariants:
/// - `attempts` grows only on a download or staged-upload attempt
/// - `completed` implies `remote_url` is set and `local_path` released
/// - `failed` implies the retry budget was exhausted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    /// Current lifecycle state
    pub state: ItemState,
    /// Staged local copy, when one exists
    pub local_path: Option<PathBuf>,
    /// Archive URL, set on completion
    pub remote_url: Option<String>,
    /// SHA-256 of the payload, once known
    pub sha256: Option<String>,
    /// Payload size in bytes, once known
    pub size_bytes: u64,
    /// Download/upload attempts consumed so far
    pub attempts: u32,
    /// Most recent failure, for operator triage
    pub last_error: Option<String>,
    /// Total wall-clock seconds spent processing this item
    pub elapsed_seconds: f64,
}

impl ProcessingStatus {
    /// Create status for a freshly discovered item.
    pub fn new() -> Self {
        Self {
            state: ItemState::Pending,
            local_path: None,
            remote_url: None,
            sha256: None,
            size_bytes: 0,
            attempts: 0,
            last_error: None,
            elapsed_seconds: 0.0,
        }
    }

    /// Transition to a new state, validating the edge.
    ///
    /// # Errors
    ///
    /// Returns an error for any edge not in the state machine, including
    /// every transition out of a terminal state.
    pub fn transition(&mut self, to: ItemState) -> Result<()> {
        self.validate_transition(to)?;
        self.state = to;
        Ok(())
    }

    /// Record a failed download/upload attempt.
    pub fn record_attempt_failure(&mut self, error: impl Into<String>) {
        self.attempts += 1;
        self.last_error = Some(error.into());
    }

    /// Check whether the retry budget allows another attempt.
    pub fn can_retry(&self, retry_limit: u32) -> bool {
        self.attempts < retry_limit
    }

    /// Mark the item completed, releasing the local copy reference.
    ///
    /// # Errors
    ///
    /// Returns an error unless the item is currently `uploading`.
    pub fn complete(&mut self, remote_url: impl Into<String>) -> Result<()> {
        self.transition(ItemState::Completed)?;
        self.remote_url = Some(remote_url.into());
        self.local_path = None;
        Ok(())
    }

    /// Normalize a state interrupted by a crash back to its resumable
    /// predecessor: an in-flight download restarts, an in-flight upload
    /// resumes from the staged copy when one survives.
    pub fn normalize_interrupted(&mut self) {
        match self.state {
            ItemState::Downloading => self.state = ItemState::Pending,
            ItemState::Uploading => {
                self.state = if self.local_path.is_some() {
                    ItemState::Downloaded
                } else {
                    ItemState::Pending
                };
            }
            _ => {}
        }
    }

    fn validate_transition(&self, to: ItemState) -> Result<()> {
        let valid = matches!(
            (self.state, to),
            (ItemState::Pending, ItemState::Downloading)
                | (ItemState::Pending, ItemState::Uploading)
                | (ItemState::Downloading, ItemState::Downloaded)
                | (ItemState::Downloading, ItemState::Pending)
                | (ItemState::Downloading, ItemState::Failed)
                | (ItemState::Downloaded, ItemState::Uploading)
                | (ItemState::Uploading, ItemState::Completed)
                | (ItemState::Uploading, ItemState::Downloaded)
                | (ItemState::Uploading, ItemState::Pending)
                | (ItemState::Uploading, ItemState::Failed)
        );

        if !valid {
            return Err(IngestError::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!("Cannot transition from {} to {}", self.state, to),
            });
        }

        Ok(())
    }
}

impl Default for ProcessingStatus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 17).unwrap()
    }

    #[test]
    fn test_work_item_new() {
        let item = WorkItem::new(
            "agency-doc-2024-0117",
            "https://example.gov/docs/report.pdf",
            "agency-doc-2024-0117.pdf",
            date(),
        );
        assert_eq!(item.archive_identifier, "agency-doc-2024-0117");
        assert_eq!(item.canonical_filename, "agency-doc-2024-0117.pdf");
    }

    #[test]
    fn test_item_state_is_terminal() {
        assert!(!ItemState::Pending.is_terminal());
        assert!(!ItemState::Downloading.is_terminal());
        assert!(!ItemState::Downloaded.is_terminal());
        assert!(!ItemState::Uploading.is_terminal());
        assert!(ItemState::Completed.is_terminal());
        assert!(ItemState::Failed.is_terminal());
    }

    #[test]
    fn test_item_state_from_str() {
        assert_eq!("pending".parse::<ItemState>().unwrap(), ItemState::Pending);
        assert_eq!(
            "DOWNLOADED".parse::<ItemState>().unwrap(),
            ItemState::Downloaded
        );
        assert!("invalid".parse::<ItemState>().is_err());
    }

    #[test]
    fn test_item_state_serde_roundtrip() {
        let json = serde_json::to_string(&ItemState::Downloaded).unwrap();
        assert_eq!(json, "\"downloaded\"");
        let back: ItemState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ItemState::Downloaded);
    }

    #[test]
    fn test_staged_transfer_path() {
        let mut status = ProcessingStatus::new();

        status.transition(ItemState::Downloading).unwrap();
        status.transition(ItemState::Downloaded).unwrap();
        status.local_path = Some(PathBuf::from("/tmp/doc.pdf"));
        status.transition(ItemState::Uploading).unwrap();
        status.complete("https://archive.example/details/doc").unwrap();

        assert_eq!(status.state, ItemState::Completed);
        assert!(status.remote_url.is_some());
        assert!(status.local_path.is_none());
    }

    #[test]
    fn test_direct_transfer_path() {
        let mut status = ProcessingStatus::new();

        status.transition(ItemState::Uploading).unwrap();
        status.complete("https://archive.example/details/doc").unwrap();

        assert_eq!(status.state, ItemState::Completed);
    }

    #[test]
    fn test_download_retry_returns_to_pending() {
        let mut status = ProcessingStatus::new();

        status.transition(ItemState::Downloading).unwrap();
        status.record_attempt_failure("connection reset");
        status.transition(ItemState::Pending).unwrap();

        assert_eq!(status.state, ItemState::Pending);
        assert_eq!(status.attempts, 1);
        assert_eq!(status.last_error.as_deref(), Some("connection reset"));
    }

    #[test]
    fn test_upload_retry_returns_to_downloaded() {
        let mut status = ProcessingStatus::new();
        status.transition(ItemState::Downloading).unwrap();
        status.transition(ItemState::Downloaded).unwrap();
        status.transition(ItemState::Uploading).unwrap();
        status.record_attempt_failure("503");
        status.transition(ItemState::Downloaded).unwrap();

        assert_eq!(status.state, ItemState::Downloaded);
        assert_eq!(status.attempts, 1);
    }

    #[test]
    fn test_terminal_states_cannot_transition() {
        let mut completed = ProcessingStatus::new();
        completed.transition(ItemState::Uploading).unwrap();
        completed.complete("url").unwrap();
        assert!(completed.transition(ItemState::Pending).is_err());
        assert!(completed.transition(ItemState::Uploading).is_err());

        let mut failed = ProcessingStatus::new();
        failed.transition(ItemState::Downloading).unwrap();
        failed.transition(ItemState::Failed).unwrap();
        assert!(failed.transition(ItemState::Pending).is_err());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut status = ProcessingStatus::new();
        // Cannot skip the download
        assert!(status.transition(ItemState::Downloaded).is_err());
        // Cannot complete from pending
        assert!(status.transition(ItemState::Completed).is_err());
        // Cannot fail from pending without an in-flight attempt
        assert!(status.transition(ItemState::Failed).is_err());
    }

    #[test]
    fn test_can_retry() {
        let mut status = ProcessingStatus::new();
        assert!(status.can_retry(3));
        status.record_attempt_failure("e1");
        status.record_attempt_failure("e2");
        assert!(status.can_retry(3));
        status.record_attempt_failure("e3");
        assert!(!status.can_retry(3));
    }

    #[test]
    fn test_normalize_interrupted_download() {
        let mut status = ProcessingStatus::new();
        status.transition(ItemState::Downloading).unwrap();
        status.normalize_interrupted();
        assert_eq!(status.state, ItemState::Pending);
    }

    #[test]
    fn test_normalize_interrupted_upload_with_staged_copy() {
        let mut status = ProcessingStatus::new();
        status.transition(ItemState::Downloading).unwrap();
        status.transition(ItemState::Downloaded).unwrap();
        status.local_path = Some(PathBuf::from("/tmp/doc.pdf"));
        status.transition(ItemState::Uploading).unwrap();

        status.normalize_interrupted();
        assert_eq!(status.state, ItemState::Downloaded);
    }

    #[test]
    fn test_normalize_interrupted_direct_upload() {
        let mut status = ProcessingStatus::new();
        status.transition(ItemState::Uploading).unwrap();

        status.normalize_interrupted();
        assert_eq!(status.state, ItemState::Pending);
    }

    #[test]
    fn test_normalize_leaves_stable_states_alone() {
        let mut status = ProcessingStatus::new();
        status.normalize_interrupted();
        assert_eq!(status.state, ItemState::Pending);
    }

    #[test]
    fn test_status_serde_roundtrip() {
        let mut status = ProcessingStatus::new();
        status.transition(ItemState::Downloading).unwrap();
        status.transition(ItemState::Downloaded).unwrap();
        status.local_path = Some(PathBuf::from("/tmp/doc.pdf"));
        status.sha256 = Some("deadbeef".to_string());
        status.size_bytes = 48_213;
        status.attempts = 1;

        let json = serde_json::to_string(&status).unwrap();
        let back: ProcessingStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}
