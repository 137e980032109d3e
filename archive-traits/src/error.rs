use thiserror::Error;

/// Coarse failure class, derived once at the transport boundary.
///
/// Orchestration code branches on this instead of re-parsing diagnostic
/// text at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The remote end refused to perform the transfer (e.g. the source
    /// blocked the archive's fetcher). A structural fallback is expected
    /// to succeed where a plain retry would not.
    Blocked,
    /// Transient fault: timeouts, rate limits, 5xx responses. Retrying the
    /// same operation with backoff is reasonable.
    Transient,
    /// Anything else. Retrying as-is is unlikely to help.
    Fatal,
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("remote refused transfer: {0}")]
    Blocked(String),

    #[error("transient archive error: {0}")]
    Transient(String),

    #[error("archive operation failed: {0}")]
    Fatal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Diagnostic substrings that indicate the source refused the archive's
/// fetcher rather than a transient fault.
const BLOCKED_SIGNATURES: &[&str] = &["403", "forbidden", "blocked", "refused"];

impl ArchiveError {
    /// Derive a classified error from an HTTP status code (when available)
    /// and the raw diagnostic text of the underlying transport.
    ///
    /// This is the single place where free-text failure heuristics live.
    pub fn classify(status: Option<u16>, diagnostic: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        let lowered = diagnostic.to_lowercase();

        if let Some(code) = status {
            return match code {
                403 => Self::Blocked(diagnostic),
                429 | 500..=599 => Self::Transient(diagnostic),
                _ => Self::Fatal(diagnostic),
            };
        }

        if BLOCKED_SIGNATURES.iter().any(|sig| lowered.contains(sig)) {
            Self::Blocked(diagnostic)
        } else if lowered.contains("timeout") || lowered.contains("timed out") {
            Self::Transient(diagnostic)
        } else {
            Self::Fatal(diagnostic)
        }
    }

    /// The failure class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Blocked(_) => ErrorClass::Blocked,
            Self::Transient(_) => ErrorClass::Transient,
            Self::Fatal(_) | Self::Io(_) => ErrorClass::Fatal,
        }
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
