//! # Database Reconciler
//!
//! Decides, for the shared database file, whether to push local state to
//! the archive, pull archive state to local, or do nothing — without a
//! central source of truth.
//!
//! ## Decision procedure
//!
//! 1. Wait (bounded) for any remote lock to clear
//! 2. Neither copy exists → `NoDatabaseFound`
//! 3. Only local exists → push
//! 4. Only remote exists → pull
//! 5. Both exist: compare the last-synced hash to the local file's current
//!    hash; unchanged copies pull only when the remote is strictly newer,
//!    changed copies fall back to a timestamp comparison with a
//!    `prefer_local` tie-break
//!
//! The procedure never merges. It is an overwrite-the-loser policy: data
//! loss is possible when both sides changed since the last sync, accepted
//! because normal operation has a single primary writer at a time.

use crate::lock::LockManager;
use crate::{Result, SyncError};
use archive_traits::{ArchiveStore, RemoteFileInfo, UploadMetadata};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Which way the last successful sync moved data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Upload,
    Download,
}

/// Outcome of the decision procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Local copy wins; push it to the archive.
    Upload,
    /// Remote copy wins; pull it down.
    Download,
    /// Copies are already synchronized.
    InSync,
}

/// What a full `sync()` actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Uploaded,
    Downloaded,
    InSync,
}

/// Local-only record of the last known synchronization state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Hash of the database file as of the last sync.
    pub sha256: String,
    /// Local modification time (Unix epoch) recorded at the last sync.
    pub local_modified_time: i64,
    /// When the last sync completed (Unix epoch).
    pub last_sync_timestamp: i64,
    /// Direction of the last sync.
    pub last_sync_direction: SyncDirection,
}

/// Persistence for [`SyncMetadata`], colocated with the database file.
#[derive(Debug, Clone)]
pub struct SyncMetadataStore {
    path: PathBuf,
}

impl SyncMetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The conventional sibling path for a database file.
    pub fn for_database(database_path: &Path) -> Self {
        let mut os = database_path.as_os_str().to_owned();
        os.push(".sync.json");
        Self::new(PathBuf::from(os))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last sync record; a missing file yields `None`.
    pub async fn load(&self) -> Result<Option<SyncMetadata>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| SyncError::CorruptSyncMetadata {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })
    }

    /// Atomically overwrite the record.
    pub async fn save(&self, metadata: &SyncMetadata) -> Result<()> {
        let json = serde_json::to_vec_pretty(metadata)
            .map_err(|e| SyncError::Internal(format!("sync metadata serialization: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Path of the local database file.
    pub database_path: PathBuf,

    /// Archive identifier under which the database is stored.
    pub database_identifier: String,

    /// Filename of the database within the archive item.
    pub remote_filename: String,

    /// Tie-break: treat the local copy as authoritative when timestamps
    /// are unavailable or equal. Defaults to true because the primary
    /// write path in normal operation is local.
    pub prefer_local: bool,

    /// Lease length for the lock taken around a sync.
    pub lock_timeout_minutes: i64,

    /// How long to wait for another writer's lock before giving up.
    pub max_lock_wait: Duration,
}

impl ReconcilerConfig {
    pub fn new(database_path: impl Into<PathBuf>, database_identifier: impl Into<String>) -> Self {
        let database_path = database_path.into();
        let remote_filename = database_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("corpus.db")
            .to_string();

        Self {
            database_path,
            database_identifier: database_identifier.into(),
            remote_filename,
            prefer_local: true,
            lock_timeout_minutes: 15,
            max_lock_wait: Duration::from_secs(600),
        }
    }

    /// Derive a reconciler configuration from the run-level mirror config,
    /// keeping the tuning defaults.
    pub fn from_mirror(config: &core_runtime::MirrorConfig) -> Self {
        Self::new(&config.database_path, &config.database_identifier)
    }

    pub fn with_prefer_local(mut self, prefer_local: bool) -> Self {
        self.prefer_local = prefer_local;
        self
    }

    pub fn with_max_lock_wait(mut self, max_wait: Duration) -> Self {
        self.max_lock_wait = max_wait;
        self
    }
}

/// Point-in-time view of the local database file.
#[derive(Debug, Clone)]
struct LocalSnapshot {
    sha256: String,
    mtime_epoch: i64,
}

/// Bidirectional reconciler for the shared database file.
pub struct DatabaseReconciler {
    config: ReconcilerConfig,
    archive: Arc<dyn ArchiveStore>,
    lock: LockManager,
    metadata_store: SyncMetadataStore,
}

impl DatabaseReconciler {
    pub fn new(config: ReconcilerConfig, archive: Arc<dyn ArchiveStore>, lock: LockManager) -> Self {
        let metadata_store = SyncMetadataStore::for_database(&config.database_path);
        Self {
            config,
            archive,
            lock,
            metadata_store,
        }
    }

    /// The sync metadata store backing this reconciler.
    pub fn metadata_store(&self) -> &SyncMetadataStore {
        &self.metadata_store
    }

    /// Decide what a sync would do, waiting out any remote lock first.
    ///
    /// # Errors
    ///
    /// [`SyncError::LockTimeout`] when the lock does not clear within the
    /// configured wait; [`SyncError::NoDatabaseFound`] when neither copy
    /// exists.
    #[instrument(skip(self), fields(identifier = %self.config.database_identifier))]
    pub async fn reconcile(&self) -> Result<SyncDecision> {
        if !self.lock.wait_for_release(self.config.max_lock_wait).await? {
            return Err(SyncError::LockTimeout {
                waited_secs: self.config.max_lock_wait.as_secs(),
            });
        }
        self.decide().await
    }

    /// Reconcile and apply the resulting transfer under the lock.
    ///
    /// The lock is released on every path out, including failures.
    #[instrument(skip(self), fields(identifier = %self.config.database_identifier))]
    pub async fn sync(&self) -> Result<SyncOutcome> {
        if !self.lock.wait_for_release(self.config.max_lock_wait).await? {
            return Err(SyncError::LockTimeout {
                waited_secs: self.config.max_lock_wait.as_secs(),
            });
        }

        if !self
            .lock
            .acquire("db_sync", self.config.lock_timeout_minutes)
            .await?
        {
            // Another writer slipped in between our wait and our acquire.
            return Err(SyncError::LockContended);
        }

        let outcome = self.sync_locked().await;

        if let Err(e) = self.lock.release().await {
            warn!("Failed to release sync lock: {}", e);
        }

        outcome
    }

    async fn sync_locked(&self) -> Result<SyncOutcome> {
        match self.decide().await? {
            SyncDecision::Upload => {
                self.push().await?;
                Ok(SyncOutcome::Uploaded)
            }
            SyncDecision::Download => {
                self.pull().await?;
                Ok(SyncOutcome::Downloaded)
            }
            SyncDecision::InSync => {
                debug!("Copies already synchronized");
                Ok(SyncOutcome::InSync)
            }
        }
    }

    /// The decision procedure proper. Assumes lock handling happened
    /// upstream.
    async fn decide(&self) -> Result<SyncDecision> {
        let local = self.local_snapshot().await?;
        let remote = self.remote_snapshot().await?;

        match (local, remote) {
            (None, None) => Err(SyncError::NoDatabaseFound),
            (Some(_), None) => {
                info!("No remote copy; local database will be pushed");
                Ok(SyncDecision::Upload)
            }
            (None, Some(_)) => {
                info!("No local copy; remote database will be pulled");
                Ok(SyncDecision::Download)
            }
            (Some(local), Some(remote)) => Ok(self.decide_both(&local, &remote).await?),
        }
    }

    async fn decide_both(
        &self,
        local: &LocalSnapshot,
        remote: &RemoteFileInfo,
    ) -> Result<SyncDecision> {
        let baseline = self.metadata_store.load().await?;
        let unchanged = baseline
            .as_ref()
            .map(|m| m.sha256 == local.sha256)
            .unwrap_or(false);

        if unchanged {
            // Nothing happened locally since the last sync; only a strictly
            // newer remote copy warrants a pull.
            let recorded_mtime = baseline
                .as_ref()
                .map(|m| m.local_modified_time)
                .unwrap_or(local.mtime_epoch);
            match remote.mtime {
                Some(remote_mtime) if remote_mtime > recorded_mtime => {
                    info!("Remote copy is newer than the last sync; pulling");
                    Ok(SyncDecision::Download)
                }
                _ => Ok(SyncDecision::InSync),
            }
        } else {
            // Local was edited since the last sync (or no baseline exists).
            match remote.mtime {
                Some(remote_mtime) if remote_mtime > local.mtime_epoch => {
                    info!("Both changed but remote is newer; remote wins");
                    Ok(SyncDecision::Download)
                }
                Some(remote_mtime) if remote_mtime < local.mtime_epoch => {
                    info!("Local copy is newer; pushing");
                    Ok(SyncDecision::Upload)
                }
                _ => {
                    // Timestamps unavailable or equal: prefer_local governs.
                    if self.config.prefer_local {
                        info!("Timestamp tie; local copy treated as authoritative");
                        Ok(SyncDecision::Upload)
                    } else {
                        info!("Timestamp tie; remote copy treated as authoritative");
                        Ok(SyncDecision::Download)
                    }
                }
            }
        }
    }

    async fn push(&self) -> Result<()> {
        let snapshot = self.local_snapshot().await?.ok_or_else(|| {
            SyncError::Internal("push decided but local database is missing".to_string())
        })?;

        let metadata = UploadMetadata::new()
            .with_field("sha256", &snapshot.sha256)
            .with_field("role", "database")
            .with_field("synced-at", Utc::now().to_rfc3339());

        self.archive
            .upload_file(
                &self.config.database_identifier,
                &self.config.database_path,
                &metadata,
            )
            .await?;

        self.metadata_store
            .save(&SyncMetadata {
                sha256: snapshot.sha256,
                local_modified_time: snapshot.mtime_epoch,
                last_sync_timestamp: Utc::now().timestamp(),
                last_sync_direction: SyncDirection::Upload,
            })
            .await?;

        info!("Database pushed to archive");
        Ok(())
    }

    async fn pull(&self) -> Result<()> {
        // Download beside the target, then rename, so a failed transfer
        // never clobbers the existing database.
        let staging = self.config.database_path.with_extension("download.tmp");

        self.archive
            .download_file(
                &self.config.database_identifier,
                &self.config.remote_filename,
                &staging,
            )
            .await?;

        tokio::fs::rename(&staging, &self.config.database_path).await?;

        let snapshot = self.local_snapshot().await?.ok_or_else(|| {
            SyncError::Internal("pull finished but local database is missing".to_string())
        })?;

        self.metadata_store
            .save(&SyncMetadata {
                sha256: snapshot.sha256,
                local_modified_time: snapshot.mtime_epoch,
                last_sync_timestamp: Utc::now().timestamp(),
                last_sync_direction: SyncDirection::Download,
            })
            .await?;

        info!("Database pulled from archive");
        Ok(())
    }

    /// Hash and stat the local database off the runtime's worker threads.
    async fn local_snapshot(&self) -> Result<Option<LocalSnapshot>> {
        let path = self.config.database_path.clone();

        tokio::task::spawn_blocking(move || -> Result<Option<LocalSnapshot>> {
            use std::io::Read;

            let mut file = match std::fs::File::open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            let mtime_epoch = file
                .metadata()?
                .modified()?
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            let mut hasher = Sha256::new();
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }

            Ok(Some(LocalSnapshot {
                sha256: format!("{:x}", hasher.finalize()),
                mtime_epoch,
            }))
        })
        .await
        .map_err(|e| SyncError::Internal(format!("hashing task panicked: {}", e)))?
    }

    async fn remote_snapshot(&self) -> Result<Option<RemoteFileInfo>> {
        let Some(item) = self
            .archive
            .get_metadata(&self.config.database_identifier)
            .await?
        else {
            return Ok(None);
        };

        Ok(item.file(&self.config.remote_filename).cloned())
    }
}
