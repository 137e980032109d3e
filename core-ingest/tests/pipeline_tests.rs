//! Integration tests for the ingest pipeline against an in-memory archive
//! store.

use archive_traits::{ArchiveError, ArchiveStore, ItemMetadata, UploadMetadata};
use async_trait::async_trait;
use chrono::NaiveDate;
use core_ingest::{
    IngestPipeline, ItemState, PipelineConfig, ProcessingStatus, ProgressTracker, WorkItem,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// How the fake store answers direct-transfer requests.
#[derive(Clone, Copy)]
enum DirectMode {
    Succeed,
    Blocked,
}

/// In-memory store recording every archive call.
struct RecordingStore {
    calls: Mutex<Vec<String>>,
    direct_mode: DirectMode,
    fail_staged_uploads: bool,
    staged_upload_count: AtomicUsize,
}

impl RecordingStore {
    fn new(direct_mode: DirectMode) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            direct_mode,
            fail_staged_uploads: false,
            staged_upload_count: AtomicUsize::new(0),
        }
    }

    fn failing_staged_uploads(direct_mode: DirectMode) -> Self {
        Self {
            fail_staged_uploads: true,
            ..Self::new(direct_mode)
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArchiveStore for RecordingStore {
    async fn upload_from_url(
        &self,
        identifier: &str,
        _source_url: &str,
        _metadata: &UploadMetadata,
    ) -> archive_traits::Result<()> {
        self.record(format!("upload_from_url:{}", identifier));
        match self.direct_mode {
            DirectMode::Succeed => Ok(()),
            DirectMode::Blocked => Err(ArchiveError::classify(
                Some(403),
                "source blocked the fetcher",
            )),
        }
    }

    async fn upload_file(
        &self,
        identifier: &str,
        _local_path: &Path,
        _metadata: &UploadMetadata,
    ) -> archive_traits::Result<()> {
        self.record(format!("upload_file:{}", identifier));
        self.staged_upload_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_staged_uploads {
            Err(ArchiveError::Transient("gateway overloaded".to_string()))
        } else {
            Ok(())
        }
    }

    async fn upload_bytes(
        &self,
        identifier: &str,
        remote_filename: &str,
        _bytes: bytes::Bytes,
        _metadata: &UploadMetadata,
    ) -> archive_traits::Result<()> {
        self.record(format!("upload_bytes:{}:{}", identifier, remote_filename));
        Ok(())
    }

    async fn download_file(
        &self,
        identifier: &str,
        remote_filename: &str,
        _dest_path: &Path,
    ) -> archive_traits::Result<()> {
        self.record(format!("download_file:{}:{}", identifier, remote_filename));
        Ok(())
    }

    async fn get_metadata(
        &self,
        identifier: &str,
    ) -> archive_traits::Result<Option<ItemMetadata>> {
        self.record(format!("get_metadata:{}", identifier));
        Ok(None)
    }

    async fn delete_item(&self, identifier: &str) -> archive_traits::Result<()> {
        self.record(format!("delete_item:{}", identifier));
        Ok(())
    }
}

struct TestHarness {
    base: PathBuf,
    config: PipelineConfig,
    tracker: ProgressTracker,
}

impl TestHarness {
    fn new() -> Self {
        let base = std::env::temp_dir().join(format!("pipeline-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(base.join("downloads")).unwrap();

        let config = PipelineConfig {
            download_dir: base.join("downloads"),
            retry_limit: 2,
            inter_request_delay: Duration::ZERO,
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(5),
            min_pdf_bytes: 4,
            stats_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let tracker = ProgressTracker::new(base.join("progress.json"));

        Self {
            base,
            config,
            tracker,
        }
    }

    fn pipeline(&self, store: Arc<RecordingStore>) -> IngestPipeline {
        IngestPipeline::new(self.config.clone(), store, self.tracker.clone())
    }

    /// Seed the progress file with a completed item.
    async fn seed_completed(&self, identifier: &str) {
        let mut status = ProcessingStatus::new();
        status.transition(ItemState::Uploading).unwrap();
        status.complete("archive://seeded").unwrap();

        let mut state = HashMap::new();
        state.insert(identifier.to_string(), status);
        self.tracker.save(&state).await.unwrap();
    }

    /// Seed a downloaded item with a staged PDF on disk.
    async fn seed_downloaded(&self, identifier: &str, filename: &str) -> PathBuf {
        let staged = self.base.join("downloads").join(filename);
        std::fs::write(&staged, b"%PDF-1.7 staged body").unwrap();

        let mut status = ProcessingStatus::new();
        status.transition(ItemState::Downloading).unwrap();
        status.transition(ItemState::Downloaded).unwrap();
        status.local_path = Some(staged.clone());
        status.sha256 = Some("feedface".to_string());
        status.size_bytes = 20;

        let mut state = HashMap::new();
        state.insert(identifier.to_string(), status);
        self.tracker.save(&state).await.unwrap();
        staged
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.base);
    }
}

fn item(identifier: &str, filename: &str) -> WorkItem {
    WorkItem::new(
        identifier,
        // Unroutable source: tests that reach the network fail fast.
        "http://127.0.0.1:9/source.pdf",
        filename,
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
    )
}

#[tokio::test]
async fn test_completed_items_perform_zero_archive_calls() {
    let harness = TestHarness::new();
    harness.seed_completed("doc-a").await;

    let store = Arc::new(RecordingStore::new(DirectMode::Succeed));
    let pipeline = harness.pipeline(store.clone());

    let stats = pipeline.run(&[item("doc-a", "doc-a.pdf")]).await.unwrap();

    assert!(store.calls().is_empty());
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn test_direct_transfer_completes_without_download() {
    let harness = TestHarness::new();
    let store = Arc::new(RecordingStore::new(DirectMode::Succeed));
    let pipeline = harness.pipeline(store.clone());

    let stats = pipeline.run(&[item("doc-b", "doc-b.pdf")]).await.unwrap();

    assert_eq!(store.calls(), vec!["upload_from_url:doc-b".to_string()]);
    assert_eq!(stats.completed, 1);

    let persisted = harness.tracker.load().await.unwrap();
    let status = &persisted["doc-b"];
    assert_eq!(status.state, ItemState::Completed);
    assert_eq!(status.remote_url.as_deref(), Some("archive://doc-b"));
    // Direct failures never consume the retry budget; successes neither.
    assert_eq!(status.attempts, 0);
}

#[tokio::test]
async fn test_downloaded_item_resumes_at_upload() {
    let harness = TestHarness::new();
    let staged = harness.seed_downloaded("doc-c", "doc-c.pdf").await;

    let store = Arc::new(RecordingStore::new(DirectMode::Succeed));
    let pipeline = harness.pipeline(store.clone());

    let stats = pipeline.run(&[item("doc-c", "doc-c.pdf")]).await.unwrap();

    // No direct attempt, no re-download: straight to the staged upload.
    assert_eq!(store.calls(), vec!["upload_file:doc-c".to_string()]);
    assert_eq!(stats.completed, 1);
    // The staged copy is released on completion.
    assert!(!staged.exists());

    let persisted = harness.tracker.load().await.unwrap();
    assert!(persisted["doc-c"].local_path.is_none());
}

#[tokio::test]
async fn test_upload_retry_exhaustion_marks_item_failed() {
    let harness = TestHarness::new();
    harness.seed_downloaded("doc-d", "doc-d.pdf").await;

    let store = Arc::new(RecordingStore::failing_staged_uploads(DirectMode::Succeed));
    let pipeline = harness.pipeline(store.clone());

    let stats = pipeline.run(&[item("doc-d", "doc-d.pdf")]).await.unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(store.staged_upload_count.load(Ordering::SeqCst), 2);

    let persisted = harness.tracker.load().await.unwrap();
    let status = &persisted["doc-d"];
    assert_eq!(status.state, ItemState::Failed);
    assert_eq!(status.attempts, 2);
    assert!(status.last_error.as_deref().unwrap().contains("overloaded"));
}

#[tokio::test]
async fn test_failed_items_are_not_retried_on_rerun() {
    let harness = TestHarness::new();
    harness.seed_downloaded("doc-e", "doc-e.pdf").await;

    let failing = Arc::new(RecordingStore::failing_staged_uploads(DirectMode::Succeed));
    harness
        .pipeline(failing.clone())
        .run(&[item("doc-e", "doc-e.pdf")])
        .await
        .unwrap();

    // Second run with a healthy store: the failed item stays excluded until
    // an operator intervenes.
    let healthy = Arc::new(RecordingStore::new(DirectMode::Succeed));
    let stats = harness
        .pipeline(healthy.clone())
        .run(&[item("doc-e", "doc-e.pdf")])
        .await
        .unwrap();

    assert!(healthy.calls().is_empty());
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn test_duplicate_identifiers_processed_once() {
    let harness = TestHarness::new();
    harness.seed_downloaded("doc-f", "doc-f.pdf").await;

    let store = Arc::new(RecordingStore::new(DirectMode::Succeed));
    let pipeline = harness.pipeline(store.clone());

    let stats = pipeline
        .run(&[item("doc-f", "doc-f.pdf"), item("doc-f", "doc-f.pdf")])
        .await
        .unwrap();

    assert_eq!(store.calls(), vec!["upload_file:doc-f".to_string()]);
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn test_blocked_direct_transfer_falls_back_to_download() {
    let harness = TestHarness::new();
    let store = Arc::new(RecordingStore::new(DirectMode::Blocked));
    let pipeline = harness.pipeline(store.clone());

    let stats = pipeline.run(&[item("doc-g", "doc-g.pdf")]).await.unwrap();

    // One direct attempt, then the staged path: the unroutable source makes
    // every download attempt fail until the budget runs out.
    assert_eq!(store.calls(), vec!["upload_from_url:doc-g".to_string()]);
    assert_eq!(stats.failed, 1);

    let persisted = harness.tracker.load().await.unwrap();
    let status = &persisted["doc-g"];
    assert_eq!(status.state, ItemState::Failed);
    assert_eq!(status.attempts, 2);
}

#[tokio::test]
async fn test_rerun_after_completion_is_stable() {
    let harness = TestHarness::new();
    harness.seed_downloaded("doc-h", "doc-h.pdf").await;

    let store = Arc::new(RecordingStore::new(DirectMode::Succeed));
    harness
        .pipeline(store.clone())
        .run(&[item("doc-h", "doc-h.pdf")])
        .await
        .unwrap();

    let before = harness.tracker.load().await.unwrap();

    let quiet = Arc::new(RecordingStore::new(DirectMode::Succeed));
    let stats = harness
        .pipeline(quiet.clone())
        .run(&[item("doc-h", "doc-h.pdf")])
        .await
        .unwrap();

    assert!(quiet.calls().is_empty());
    assert_eq!(stats.completed, 1);

    let after = harness.tracker.load().await.unwrap();
    assert_eq!(
        before["doc-h"].remote_url, after["doc-h"].remote_url,
        "state must be unchanged by an idempotent rerun"
    );
}
