//! Error types for the Internet Archive provider

use archive_traits::ArchiveError;
use thiserror::Error;

/// Internet Archive provider errors
#[derive(Error, Debug)]
pub enum IaError {
    /// Gateway request returned an error status
    #[error("Archive gateway error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Failed to parse a gateway response
    #[error("Failed to parse gateway response: {0}")]
    ParseError(String),

    /// Network-level failure (DNS, connect, timeout)
    #[error("Network error: {message}")]
    NetworkError { message: String, timed_out: bool },

    /// Local I/O failure while staging or writing a payload
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, IaError>;

impl IaError {
    /// Wrap a `reqwest` transport error, preserving whether it was a timeout.
    pub fn from_transport(e: reqwest::Error) -> Self {
        Self::NetworkError {
            timed_out: e.is_timeout(),
            message: e.to_string(),
        }
    }
}

impl From<IaError> for ArchiveError {
    /// Classification happens here, once, at the boundary.
    fn from(error: IaError) -> Self {
        match error {
            IaError::ApiError {
                status_code,
                message,
            } => ArchiveError::classify(Some(status_code), message),
            IaError::NetworkError { message, timed_out } => {
                if timed_out {
                    ArchiveError::Transient(message)
                } else {
                    ArchiveError::classify(None, message)
                }
            }
            IaError::ParseError(msg) => ArchiveError::Fatal(format!("Parse error: {}", msg)),
            IaError::Io(e) => ArchiveError::Io(e),
        }
    }
}
