use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Timed out waiting {waited_secs}s for the remote lock to be released")]
    LockTimeout { waited_secs: u64 },

    #[error("Another writer acquired the lock first")]
    LockContended,

    #[error("No database found locally or in the archive")]
    NoDatabaseFound,

    #[error("Corrupt sync metadata in {path}: {reason}")]
    CorruptSyncMetadata { path: String, reason: String },

    #[error("Archive error: {0}")]
    Archive(#[from] archive_traits::ArchiveError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
