//! # Remote Lock Manager
//!
//! Best-effort mutual exclusion for operations against the shared database,
//! built on a dedicated archive item since the archive offers no native
//! locking API.
//!
//! ## Overview
//!
//! A lock is an archive item holding a small JSON record plus a metadata
//! mirror of the same fields, so holders and waiters can evaluate the lease
//! from the metadata API alone. Leases expire: any party that observes
//! `now > expires_at` may delete the record unilaterally and take over.
//!
//! Acquisition is **not atomic** — two processes racing to acquire may both
//! observe "no lock" and both publish a record. The protocol tolerates this
//! by treating the lock as advisory rather than a hard guarantee.

use crate::{Result, SyncError};
use archive_traits::{ArchiveStore, UploadMetadata};
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Filename of the lock record within the lock item.
const LOCK_FILENAME: &str = "lock.json";

/// Default interval between polls while waiting for a release.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// A time-bounded advisory lock token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// The operation the holder is performing (e.g. "db_sync", "export").
    pub operation: String,
    /// Identity of the process that created the record.
    pub holder: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Lease length in minutes.
    pub timeout_minutes: i64,
}

impl LockRecord {
    pub fn new(operation: impl Into<String>, holder: impl Into<String>, timeout_minutes: i64) -> Self {
        Self {
            operation: operation.into(),
            holder: holder.into(),
            created_at: Utc::now(),
            timeout_minutes,
        }
    }

    /// When the lease lapses and the record becomes reclaimable.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + ChronoDuration::minutes(self.timeout_minutes)
    }

    /// Whether the lease has lapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Mirror the record into item metadata so waiters can evaluate the
    /// lease without downloading the record file.
    fn to_upload_metadata(&self) -> UploadMetadata {
        UploadMetadata::new()
            .with_field("lock-operation", &self.operation)
            .with_field("lock-holder", &self.holder)
            .with_field("lock-created-at", self.created_at.to_rfc3339())
            .with_field("lock-timeout-minutes", self.timeout_minutes.to_string())
    }

    /// Recover a record from the item-metadata mirror.
    ///
    /// Returns `None` when the metadata does not carry a complete record
    /// (e.g. the item predates this convention).
    pub fn from_item_metadata(metadata: &HashMap<String, String>) -> Option<Self> {
        let operation = metadata.get("lock-operation")?.clone();
        let holder = metadata.get("lock-holder")?.clone();
        let created_at = metadata
            .get("lock-created-at")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))?;
        let timeout_minutes = metadata
            .get("lock-timeout-minutes")
            .and_then(|s| s.parse().ok())?;

        Some(Self {
            operation,
            holder,
            created_at,
            timeout_minutes,
        })
    }
}

/// Lease-based advisory lock over a dedicated archive item.
pub struct LockManager {
    archive: Arc<dyn ArchiveStore>,
    lock_identifier: String,
    holder: String,
    poll_interval: Duration,
}

impl LockManager {
    pub fn new(archive: Arc<dyn ArchiveStore>, lock_identifier: impl Into<String>) -> Self {
        Self {
            archive,
            lock_identifier: lock_identifier.into(),
            holder: format!("holder-{}", Uuid::new_v4()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the generated holder identity (e.g. hostname + pid).
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    /// Override the wait-loop poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The identity recorded in locks this manager creates.
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Attempt to take the lock for `operation`.
    ///
    /// Returns `Ok(false)` when an unexpired lock is already held by
    /// someone. An expired lock is reclaimed before acquiring.
    ///
    /// This check-then-create sequence is not atomic; callers must accept
    /// the narrow race window at acquire time as a design trade-off.
    #[instrument(skip(self), fields(lock = %self.lock_identifier, operation = %operation))]
    pub async fn acquire(&self, operation: &str, timeout_minutes: i64) -> Result<bool> {
        if let Some(existing) = self.current_lock().await? {
            if existing.is_expired(Utc::now()) {
                info!(
                    "Reclaiming expired lock held by {} since {}",
                    existing.holder, existing.created_at
                );
                self.archive.delete_item(&self.lock_identifier).await?;
            } else {
                debug!(
                    "Lock held by {} for {} until {}",
                    existing.holder,
                    existing.operation,
                    existing.expires_at()
                );
                return Ok(false);
            }
        }

        let record = LockRecord::new(operation, self.holder.clone(), timeout_minutes);
        let body = serde_json::to_vec_pretty(&record)
            .map_err(|e| SyncError::Internal(format!("lock record serialization: {}", e)))?;

        self.archive
            .upload_bytes(
                &self.lock_identifier,
                LOCK_FILENAME,
                Bytes::from(body),
                &record.to_upload_metadata(),
            )
            .await?;

        info!(
            "Acquired lock for {} (lease {} min)",
            operation, timeout_minutes
        );
        Ok(true)
    }

    /// Wait until no unexpired lock exists, polling at the configured
    /// interval.
    ///
    /// An expired lock encountered while waiting is deleted unilaterally.
    /// Returns `Ok(false)` when `max_wait` elapses with the lock still
    /// held.
    #[instrument(skip(self), fields(lock = %self.lock_identifier))]
    pub async fn wait_for_release(&self, max_wait: Duration) -> Result<bool> {
        let started = Instant::now();

        loop {
            match self.current_lock().await? {
                None => return Ok(true),
                Some(existing) if existing.is_expired(Utc::now()) => {
                    info!(
                        "Deleting stale lock held by {} (expired {})",
                        existing.holder,
                        existing.expires_at()
                    );
                    self.archive.delete_item(&self.lock_identifier).await?;
                    return Ok(true);
                }
                Some(existing) => {
                    let waited = started.elapsed();
                    if waited >= max_wait {
                        warn!(
                            "Gave up waiting after {:?}; lock still held by {}",
                            waited, existing.holder
                        );
                        return Ok(false);
                    }
                    debug!(
                        "Lock held by {} for {}; polling again in {:?}",
                        existing.holder, existing.operation, self.poll_interval
                    );
                    let remaining = max_wait - waited;
                    tokio::time::sleep(self.poll_interval.min(remaining)).await;
                }
            }
        }
    }

    /// Release the lock. Releasing an already-absent lock is success.
    #[instrument(skip(self), fields(lock = %self.lock_identifier))]
    pub async fn release(&self) -> Result<()> {
        self.archive.delete_item(&self.lock_identifier).await?;
        debug!("Lock released");
        Ok(())
    }

    async fn current_lock(&self) -> Result<Option<LockRecord>> {
        let Some(item) = self.archive.get_metadata(&self.lock_identifier).await? else {
            return Ok(None);
        };

        match LockRecord::from_item_metadata(&item.metadata) {
            Some(record) => Ok(Some(record)),
            None => {
                // An item without a parseable record is not a usable lock;
                // treat it as absent rather than blocking forever.
                warn!(
                    "Lock item {} exists but carries no parseable record",
                    self.lock_identifier
                );
                Ok(None)
            }
        }
    }
}
