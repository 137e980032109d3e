//! # Ingest Pipeline
//!
//! Bounded-parallelism hybrid download/upload orchestrator.
//!
//! ## Overview
//!
//! The pipeline drives each work item through its state machine, favoring
//! zero-local-copy transfers where the archive fetches the source itself
//! and falling back to a staged local download when the source refuses the
//! archive's fetcher.
//!
//! ## Workflow
//!
//! 1. Load persisted progress; normalize states interrupted by a crash
//! 2. Fan out over pending items bounded by `max_concurrency`
//! 3. Per item: try a direct transfer, fall back to download + staged upload
//! 4. Persist progress after every sub-step
//! 5. Report aggregate counters at a fixed interval
//!
//! Per-item failures never abort the batch; only items individually
//! exhausting their retry budget become `failed`.

use crate::item::{ItemState, ProcessingStatus, WorkItem};
use crate::progress::ProgressTracker;
use crate::{IngestError, Result};
use archive_traits::{ArchiveStore, ErrorClass, UploadMetadata};
use futures::StreamExt;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, instrument, warn};

/// Leading bytes every accepted payload must carry.
const PDF_MAGIC: &[u8] = b"%PDF";

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum concurrent source downloads. Kept low to stay polite to the
    /// source server.
    pub max_concurrent_downloads: usize,

    /// Maximum concurrent archive uploads. Sized independently because the
    /// archive tolerates different rates than the source.
    pub max_concurrent_uploads: usize,

    /// Maximum concurrently in-flight items overall.
    pub max_concurrency: usize,

    /// Download/upload attempts allowed per item before it is marked failed.
    pub retry_limit: u32,

    /// Fixed politeness delay after every source request.
    pub inter_request_delay: Duration,

    /// Base delay for exponential retry backoff.
    pub backoff_base: Duration,

    /// Upper bound on any single backoff sleep.
    pub backoff_cap: Duration,

    /// Minimum size for a staged file to be considered a valid prior
    /// download.
    pub min_pdf_bytes: u64,

    /// Absolute timeout for one source download.
    pub download_timeout: Duration,

    /// Interval between aggregate progress reports.
    pub stats_interval: Duration,

    /// Directory where downloads are staged.
    pub download_dir: PathBuf,

    /// Target archive collection recorded in upload metadata.
    pub collection: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 3,
            max_concurrent_uploads: 3,
            max_concurrency: 8,
            retry_limit: 3,
            inter_request_delay: Duration::from_secs(1),
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(10),
            min_pdf_bytes: 1024,
            download_timeout: Duration::from_secs(300),
            stats_interval: Duration::from_secs(30),
            download_dir: PathBuf::from("downloads"),
            collection: "opensource".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Derive a pipeline configuration from the run-level mirror config,
    /// keeping the tuning defaults.
    pub fn from_mirror(config: &core_runtime::MirrorConfig) -> Self {
        Self {
            download_dir: config.download_dir.clone(),
            collection: config.collection.clone(),
            ..Self::default()
        }
    }
}

/// Aggregate batch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub completed: u64,
    pub failed: u64,
    pub pending: u64,
}

/// Bounded-parallelism ingestion orchestrator.
///
/// Constructed once per run with its collaborators injected; configuration
/// is captured at construction time.
pub struct IngestPipeline {
    config: PipelineConfig,
    archive: Arc<dyn ArchiveStore>,
    tracker: ProgressTracker,
    http: reqwest::Client,
    download_slots: Arc<Semaphore>,
    upload_slots: Arc<Semaphore>,
    state: Arc<Mutex<HashMap<String, ProcessingStatus>>>,
}

impl IngestPipeline {
    pub fn new(
        config: PipelineConfig,
        archive: Arc<dyn ArchiveStore>,
        tracker: ProgressTracker,
    ) -> Self {
        let download_slots = Arc::new(Semaphore::new(config.max_concurrent_downloads));
        let upload_slots = Arc::new(Semaphore::new(config.max_concurrent_uploads));
        Self {
            config,
            archive,
            tracker,
            http: reqwest::Client::new(),
            download_slots,
            upload_slots,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run the pipeline over a batch of work items.
    ///
    /// Duplicate identifiers are processed once. Per-item failures are
    /// absorbed into the aggregate counters; this method only errors on
    /// infrastructure problems (progress persistence).
    pub async fn run(&self, items: &[WorkItem]) -> Result<IngestStats> {
        let loaded = match self.tracker.load().await {
            Ok(map) => map,
            Err(e @ IngestError::CorruptProgressState { .. }) => {
                warn!("{}; starting with empty progress state", e);
                HashMap::new()
            }
            Err(e) => return Err(e),
        };

        {
            let mut state = self.state.lock().await;
            *state = loaded;
            for status in state.values_mut() {
                status.normalize_interrupted();
            }
            for item in items {
                state.entry(item.archive_identifier.clone()).or_default();
            }
        }
        self.repair_missing_staged_copies().await;
        self.persist().await?;

        let mut seen = HashSet::new();
        let work: Vec<&WorkItem> = items
            .iter()
            .filter(|i| seen.insert(i.archive_identifier.clone()))
            .collect();

        info!(
            "Starting batch of {} items ({} duplicates dropped)",
            work.len(),
            items.len() - work.len()
        );

        let reporter = self.spawn_stats_reporter();

        futures::stream::iter(work)
            .for_each_concurrent(self.config.max_concurrency, |item| async move {
                self.process_item(item).await;
            })
            .await;

        reporter.abort();
        self.persist().await?;

        let stats = self.stats().await;
        info!(
            "Batch finished: {} completed, {} failed, {} pending",
            stats.completed, stats.failed, stats.pending
        );
        Ok(stats)
    }

    /// Drive one item to a terminal state if possible.
    ///
    /// Returns `true` when the item is (or already was) completed.
    #[instrument(skip(self, item), fields(identifier = %item.archive_identifier))]
    pub async fn process_item(&self, item: &WorkItem) -> bool {
        let started = Instant::now();
        let current = {
            let state = self.state.lock().await;
            state
                .get(&item.archive_identifier)
                .cloned()
                .unwrap_or_default()
        };

        let outcome = match current.state {
            ItemState::Completed => {
                debug!("Already completed, nothing to do");
                return true;
            }
            ItemState::Failed => {
                debug!("Retry budget exhausted in an earlier run; skipping");
                return false;
            }
            ItemState::Downloaded => self.upload_local(item).await,
            _ => self.ingest_from_pending(item).await,
        };

        let finished = match outcome {
            Ok(done) => done,
            Err(e) => {
                warn!("Item processing stopped: {}", e);
                false
            }
        };

        let elapsed = started.elapsed().as_secs_f64();
        if let Err(e) = self
            .update_status(&item.archive_identifier, |status| {
                status.elapsed_seconds += elapsed;
                Ok(())
            })
            .await
        {
            warn!("Failed to persist elapsed time: {}", e);
        }

        finished
    }

    /// Current aggregate counters.
    pub async fn stats(&self) -> IngestStats {
        let state = self.state.lock().await;
        let mut stats = IngestStats::default();
        for status in state.values() {
            match status.state {
                ItemState::Completed => stats.completed += 1,
                ItemState::Failed => stats.failed += 1,
                _ => stats.pending += 1,
            }
        }
        stats
    }

    // ------------------------------------------------------------------
    // Hybrid strategy
    // ------------------------------------------------------------------

    async fn ingest_from_pending(&self, item: &WorkItem) -> Result<bool> {
        if self.upload_direct(item).await? {
            return Ok(true);
        }
        if !self.download_item(item).await? {
            return Ok(false);
        }
        self.upload_local(item).await
    }

    /// Attempt a zero-copy transfer: the archive fetches the source URL
    /// itself.
    ///
    /// Any failure routes to the staged fallback; a failed direct attempt
    /// does not consume the item's retry budget.
    async fn upload_direct(&self, item: &WorkItem) -> Result<bool> {
        let _permit = self.acquire(&self.upload_slots).await?;

        self.update_status(&item.archive_identifier, |s| {
            s.transition(ItemState::Uploading)
        })
        .await?;

        let metadata = self
            .base_metadata(item)
            .with_field("upload-method", "direct");

        match self
            .archive
            .upload_from_url(&item.archive_identifier, &item.source_url, &metadata)
            .await
        {
            Ok(()) => {
                let url = self.archive.item_url(&item.archive_identifier);
                self.update_status(&item.archive_identifier, |s| s.complete(url))
                    .await?;
                info!("Direct transfer succeeded");
                Ok(true)
            }
            Err(e) => {
                match e.class() {
                    ErrorClass::Blocked => {
                        info!("Source blocked the archive fetcher; staging locally instead")
                    }
                    ErrorClass::Transient | ErrorClass::Fatal => {
                        warn!("Direct transfer failed ({}); staging locally instead", e)
                    }
                }
                self.update_status(&item.archive_identifier, |s| {
                    s.transition(ItemState::Pending)
                })
                .await?;
                Ok(false)
            }
        }
    }

    /// Download the source document to the staging directory.
    ///
    /// Skips the network entirely when a plausibly complete staged copy
    /// already exists, making the step idempotent across restarts. Returns
    /// `true` when a validated staged copy is in place, `false` when the
    /// retry budget ran out.
    async fn download_item(&self, item: &WorkItem) -> Result<bool> {
        let dest = self.config.download_dir.join(&item.canonical_filename);

        loop {
            if let Ok(meta) = tokio::fs::metadata(&dest).await {
                if meta.len() >= self.config.min_pdf_bytes {
                    info!(
                        "Staged copy already present ({} bytes), skipping download",
                        meta.len()
                    );
                    let (sha256, size) = hash_file(&dest).await?;
                    let dest = dest.clone();
                    self.update_status(&item.archive_identifier, move |s| {
                        s.transition(ItemState::Downloading)?;
                        s.transition(ItemState::Downloaded)?;
                        s.local_path = Some(dest);
                        s.sha256 = Some(sha256);
                        s.size_bytes = size;
                        Ok(())
                    })
                    .await?;
                    return Ok(true);
                }
            }

            self.update_status(&item.archive_identifier, |s| {
                s.transition(ItemState::Downloading)
            })
            .await?;

            let result = {
                let _permit = self.acquire(&self.download_slots).await?;
                let result = self.fetch_to_file(item, &dest).await;
                // Politeness throttle toward the source server.
                tokio::time::sleep(self.config.inter_request_delay).await;
                result
            };

            match result {
                Ok((sha256, size)) => {
                    let dest = dest.clone();
                    self.update_status(&item.archive_identifier, move |s| {
                        s.transition(ItemState::Downloaded)?;
                        s.local_path = Some(dest);
                        s.sha256 = Some(sha256);
                        s.size_bytes = size;
                        Ok(())
                    })
                    .await?;
                    debug!("Download complete ({} bytes)", size);
                    return Ok(true);
                }
                Err(e) => {
                    let status = self
                        .update_status(&item.archive_identifier, |s| {
                            s.record_attempt_failure(e.to_string());
                            Ok(())
                        })
                        .await?;

                    if !status.can_retry(self.config.retry_limit) {
                        self.update_status(&item.archive_identifier, |s| {
                            s.transition(ItemState::Failed)
                        })
                        .await?;
                        warn!(
                            "Download retry budget exhausted after {} attempts: {}",
                            status.attempts, e
                        );
                        return Ok(false);
                    }

                    self.update_status(&item.archive_identifier, |s| {
                        s.transition(ItemState::Pending)
                    })
                    .await?;

                    let delay = self.backoff_delay(status.attempts);
                    debug!("Download failed ({}); retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Upload the staged local copy, then release it to reclaim disk.
    ///
    /// Returns `true` on completion, `false` when the retry budget ran out.
    async fn upload_local(&self, item: &WorkItem) -> Result<bool> {
        loop {
            let status = {
                let state = self.state.lock().await;
                state
                    .get(&item.archive_identifier)
                    .cloned()
                    .unwrap_or_default()
            };
            let local_path = status.local_path.clone().ok_or_else(|| {
                IngestError::Internal(format!(
                    "item {} is downloaded but has no staged copy",
                    item.archive_identifier
                ))
            })?;

            self.update_status(&item.archive_identifier, |s| {
                s.transition(ItemState::Uploading)
            })
            .await?;

            let mut metadata = self
                .base_metadata(item)
                .with_field("upload-method", "staged");
            if let Some(sha256) = &status.sha256 {
                metadata = metadata.with_field("sha256", sha256);
            }

            let result = {
                let _permit = self.acquire(&self.upload_slots).await?;
                self.archive
                    .upload_file(&item.archive_identifier, &local_path, &metadata)
                    .await
            };

            match result {
                Ok(()) => {
                    // Release the staged copy to bound disk usage.
                    if let Err(e) = tokio::fs::remove_file(&local_path).await {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            warn!(
                                "Failed to remove staged copy {}: {}",
                                local_path.display(),
                                e
                            );
                        }
                    }
                    let url = self.archive.item_url(&item.archive_identifier);
                    self.update_status(&item.archive_identifier, |s| s.complete(url))
                        .await?;
                    info!("Staged transfer succeeded");
                    return Ok(true);
                }
                Err(e) => {
                    let status = self
                        .update_status(&item.archive_identifier, |s| {
                            s.record_attempt_failure(e.to_string());
                            Ok(())
                        })
                        .await?;

                    if !status.can_retry(self.config.retry_limit) {
                        self.update_status(&item.archive_identifier, |s| {
                            s.transition(ItemState::Failed)
                        })
                        .await?;
                        warn!(
                            "Upload retry budget exhausted after {} attempts: {}",
                            status.attempts, e
                        );
                        return Ok(false);
                    }

                    self.update_status(&item.archive_identifier, |s| {
                        s.transition(ItemState::Downloaded)
                    })
                    .await?;

                    let delay = self.backoff_delay(status.attempts);
                    debug!("Upload failed ({}); retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn fetch_to_file(&self, item: &WorkItem, dest: &Path) -> Result<(String, u64)> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let response = self
            .http
            .get(&item.source_url)
            .timeout(self.config.download_timeout)
            .send()
            .await
            .map_err(|e| IngestError::Download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IngestError::Download(format!(
                "source returned status {}",
                response.status()
            )));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| IngestError::Download(e.to_string())))
            .boxed();

        write_validated_stream(stream, dest).await
    }

    fn base_metadata(&self, item: &WorkItem) -> UploadMetadata {
        UploadMetadata::new()
            .with_field("collection", &self.config.collection)
            .with_field("mediatype", "texts")
            .with_field("originalurl", &item.source_url)
            .with_field("date", item.logical_date.to_string())
            .with_field(
                "ingested-at",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            )
    }

    /// Exponential backoff with jitter, capped.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .config
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)));
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=250));
        (exp + jitter).min(self.config.backoff_cap)
    }

    async fn acquire<'a>(
        &self,
        slots: &'a Semaphore,
    ) -> Result<tokio::sync::SemaphorePermit<'a>> {
        slots
            .acquire()
            .await
            .map_err(|_| IngestError::Internal("semaphore closed".to_string()))
    }

    /// Mutate one item's status and persist the whole map.
    ///
    /// The state lock is held across the save so persisted snapshots are
    /// monotone.
    async fn update_status<F>(&self, identifier: &str, mutate: F) -> Result<ProcessingStatus>
    where
        F: FnOnce(&mut ProcessingStatus) -> Result<()>,
    {
        let mut state = self.state.lock().await;
        let status = state.entry(identifier.to_string()).or_default();
        mutate(status)?;
        let updated = status.clone();
        self.tracker.save(&state).await?;
        Ok(updated)
    }

    async fn persist(&self) -> Result<()> {
        let state = self.state.lock().await;
        self.tracker.save(&state).await
    }

    /// Load-time repair: a `downloaded` item whose staged file vanished
    /// restarts from `pending`.
    async fn repair_missing_staged_copies(&self) {
        let staged: Vec<(String, PathBuf)> = {
            let state = self.state.lock().await;
            state
                .iter()
                .filter(|(_, s)| s.state == ItemState::Downloaded)
                .filter_map(|(id, s)| s.local_path.clone().map(|p| (id.clone(), p)))
                .collect()
        };

        for (identifier, path) in staged {
            if tokio::fs::metadata(&path).await.is_err() {
                warn!(
                    "Staged copy for {} missing at {}; restarting from pending",
                    identifier,
                    path.display()
                );
                let mut state = self.state.lock().await;
                if let Some(status) = state.get_mut(&identifier) {
                    status.state = ItemState::Pending;
                    status.local_path = None;
                }
            }
        }
    }

    fn spawn_stats_reporter(&self) -> tokio::task::JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let interval = self.config.stats_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let (completed, failed, pending) = {
                    let state = state.lock().await;
                    let mut counts = (0u64, 0u64, 0u64);
                    for status in state.values() {
                        match status.state {
                            ItemState::Completed => counts.0 += 1,
                            ItemState::Failed => counts.1 += 1,
                            _ => counts.2 += 1,
                        }
                    }
                    counts
                };
                info!(
                    "Progress: {} completed, {} failed, {} pending",
                    completed, failed, pending
                );
            }
        })
    }
}

/// Stream a payload to disk, validating the PDF magic and hashing as it
/// goes.
///
/// The destination file is removed again when validation fails, so a
/// rejected payload never masquerades as a staged copy.
pub(crate) async fn write_validated_stream<S>(mut stream: S, dest: &Path) -> Result<(String, u64)>
where
    S: futures::Stream<Item = Result<bytes::Bytes>> + Unpin,
{
    let mut file = tokio::fs::File::create(dest).await?;
    let mut hasher = Sha256::new();
    let mut total = 0u64;
    let mut header: Vec<u8> = Vec::with_capacity(PDF_MAGIC.len());
    let mut validated = false;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Err(e);
            }
        };

        if !validated {
            header.extend_from_slice(&chunk);
            if header.len() >= PDF_MAGIC.len() {
                if &header[..PDF_MAGIC.len()] != PDF_MAGIC {
                    drop(file);
                    let _ = tokio::fs::remove_file(dest).await;
                    return Err(IngestError::Validation(
                        "payload does not begin with the PDF magic bytes".to_string(),
                    ));
                }
                validated = true;
            }
        }

        hasher.update(&chunk);
        total += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }

    if !validated {
        drop(file);
        let _ = tokio::fs::remove_file(dest).await;
        return Err(IngestError::Validation(format!(
            "payload too short to be a PDF ({} bytes)",
            total
        )));
    }

    file.flush().await?;
    Ok((format!("{:x}", hasher.finalize()), total))
}

/// Hash an existing file off the async runtime's worker threads.
async fn hash_file(path: &Path) -> Result<(String, u64)> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(String, u64)> {
        use std::io::Read;

        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            total += n as u64;
        }
        Ok((format!("{:x}", hasher.finalize()), total))
    })
    .await
    .map_err(|e| IngestError::Internal(format!("hashing task panicked: {}", e)))?
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use uuid::Uuid;

    fn temp_file() -> PathBuf {
        std::env::temp_dir().join(format!("core-ingest-stream-{}.pdf", Uuid::new_v4()))
    }

    fn chunks(parts: &[&[u8]]) -> impl futures::Stream<Item = Result<bytes::Bytes>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(bytes::Bytes::copy_from_slice(p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_valid_pdf_stream_is_written_and_hashed() {
        let dest = temp_file();
        let payload = b"%PDF-1.7 fake document body";

        let (sha256, size) = write_validated_stream(chunks(&[payload]), &dest)
            .await
            .unwrap();

        assert_eq!(size, payload.len() as u64);
        let expected = format!("{:x}", Sha256::digest(payload));
        assert_eq!(sha256, expected);
        assert_eq!(std::fs::read(&dest).unwrap(), payload);
        let _ = std::fs::remove_file(&dest);
    }

    #[tokio::test]
    async fn test_magic_split_across_chunks() {
        let dest = temp_file();

        let result = write_validated_stream(chunks(&[b"%P", b"DF-1.4 rest"]), &dest).await;

        assert!(result.is_ok());
        let _ = std::fs::remove_file(&dest);
    }

    #[tokio::test]
    async fn test_non_pdf_payload_is_rejected_and_removed() {
        let dest = temp_file();

        let result =
            write_validated_stream(chunks(&[b"<html>not a pdf</html>"]), &dest).await;

        assert!(matches!(result, Err(IngestError::Validation(_))));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_too_short_payload_is_rejected() {
        let dest = temp_file();

        let result = write_validated_stream(chunks(&[b"%P"]), &dest).await;

        assert!(matches!(result, Err(IngestError::Validation(_))));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_stream_error_removes_partial_file() {
        let dest = temp_file();
        let parts: Vec<Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from_static(b"%PDF-1.5 start")),
            Err(IngestError::Download("connection reset".to_string())),
        ];

        let result = write_validated_stream(stream::iter(parts), &dest).await;

        assert!(matches!(result, Err(IngestError::Download(_))));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_hash_file_matches_streaming_hash() {
        let dest = temp_file();
        let payload = b"%PDF-1.7 body bytes for hashing";
        std::fs::write(&dest, payload).unwrap();

        let (sha256, size) = hash_file(&dest).await.unwrap();

        assert_eq!(size, payload.len() as u64);
        assert_eq!(sha256, format!("{:x}", Sha256::digest(payload)));
        let _ = std::fs::remove_file(&dest);
    }

    #[test]
    fn test_backoff_is_capped() {
        let pipeline_config = PipelineConfig {
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(10),
            ..Default::default()
        };
        // Construct a pipeline solely for the helper; collaborators unused.
        let pipeline = IngestPipeline::new(
            pipeline_config,
            Arc::new(NullStore),
            ProgressTracker::new(temp_file()),
        );

        for attempt in 0..20 {
            assert!(pipeline.backoff_delay(attempt) <= Duration::from_secs(10));
        }
        // Early attempts grow roughly exponentially.
        assert!(pipeline.backoff_delay(0) < Duration::from_secs(1));
    }

    #[test]
    fn test_config_from_mirror() {
        let mirror = core_runtime::MirrorConfig::builder()
            .download_dir("/data/downloads")
            .progress_path("/data/progress.json")
            .database_path("/data/corpus.db")
            .database_identifier("agency-corpus-db")
            .lock_identifier("agency-corpus-db-lock")
            .collection("agency-mirror")
            .credentials(core_runtime::ArchiveCredentials::new("acct", "k", "s"))
            .build()
            .unwrap();

        let config = PipelineConfig::from_mirror(&mirror);
        assert_eq!(config.download_dir, PathBuf::from("/data/downloads"));
        assert_eq!(config.collection, "agency-mirror");
        assert_eq!(config.retry_limit, PipelineConfig::default().retry_limit);
    }

    #[test]
    fn test_default_config_is_polite() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_concurrent_downloads, 3);
        assert_eq!(config.retry_limit, 3);
        assert!(config.inter_request_delay >= Duration::from_secs(1));
    }

    /// Inert store for tests that never touch the archive.
    struct NullStore;

    #[async_trait::async_trait]
    impl ArchiveStore for NullStore {
        async fn upload_from_url(
            &self,
            _identifier: &str,
            _source_url: &str,
            _metadata: &UploadMetadata,
        ) -> archive_traits::Result<()> {
            Ok(())
        }

        async fn upload_file(
            &self,
            _identifier: &str,
            _local_path: &Path,
            _metadata: &UploadMetadata,
        ) -> archive_traits::Result<()> {
            Ok(())
        }

        async fn upload_bytes(
            &self,
            _identifier: &str,
            _remote_filename: &str,
            _bytes: bytes::Bytes,
            _metadata: &UploadMetadata,
        ) -> archive_traits::Result<()> {
            Ok(())
        }

        async fn download_file(
            &self,
            _identifier: &str,
            _remote_filename: &str,
            _dest_path: &Path,
        ) -> archive_traits::Result<()> {
            Ok(())
        }

        async fn get_metadata(
            &self,
            _identifier: &str,
        ) -> archive_traits::Result<Option<archive_traits::ItemMetadata>> {
            Ok(None)
        }

        async fn delete_item(&self, _identifier: &str) -> archive_traits::Result<()> {
            Ok(())
        }
    }
}
