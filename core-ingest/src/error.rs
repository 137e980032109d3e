use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Corrupt progress state in {path}: {reason}")]
    CorruptProgressState { path: String, reason: String },

    #[error("Invalid item state: {0}")]
    InvalidState(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Payload validation failed: {0}")]
    Validation(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Archive error: {0}")]
    Archive(#[from] archive_traits::ArchiveError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;
