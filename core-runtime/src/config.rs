//! # Mirror Configuration
//!
//! Configuration for a mirror run, constructed once and passed by reference
//! to the pipeline, lock manager, and reconciler.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`MirrorConfig`] instance holding every path, identifier, and credential
//! the core needs. It enforces fail-fast validation so a misconfigured run
//! dies at startup with an actionable message rather than mid-batch.
//!
//! Credentials are loaded explicitly via [`ArchiveCredentials::from_env`];
//! nothing in the core reads the process environment at arbitrary call
//! sites.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{ArchiveCredentials, MirrorConfig};
//!
//! let config = MirrorConfig::builder()
//!     .download_dir("/var/lib/mirror/downloads")
//!     .progress_path("/var/lib/mirror/progress.json")
//!     .database_path("/var/lib/mirror/corpus.db")
//!     .database_identifier("agency-corpus-db")
//!     .lock_identifier("agency-corpus-db-lock")
//!     .collection("opensource")
//!     .credentials(ArchiveCredentials::from_env()?)
//!     .build()?;
//! # Ok::<(), core_runtime::Error>(())
//! ```

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Environment variable holding the archive account identifier.
pub const ENV_ACCOUNT_ID: &str = "ARCHIVE_ACCOUNT_ID";
/// Environment variable holding the archive access key.
pub const ENV_ACCESS_KEY: &str = "ARCHIVE_ACCESS_KEY";
/// Environment variable holding the archive secret key.
pub const ENV_SECRET_KEY: &str = "ARCHIVE_SECRET_KEY";

/// Credentials for the remote archive account.
#[derive(Clone, PartialEq, Eq)]
pub struct ArchiveCredentials {
    /// Archive account identifier (e.g. the uploader email or account name).
    pub account_id: String,
    /// API access key.
    pub access_key: String,
    /// API secret key.
    pub secret_key: String,
}

impl ArchiveCredentials {
    /// Create credentials from explicit values.
    pub fn new(
        account_id: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Load credentials from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingEnv`] naming the first absent or empty
    /// variable. Missing credentials are a hard failure, never a silent
    /// default.
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| -> Result<String> {
            match std::env::var(name) {
                Ok(value) if !value.trim().is_empty() => Ok(value),
                _ => Err(Error::MissingEnv(name.to_string())),
            }
        };

        Ok(Self {
            account_id: read(ENV_ACCOUNT_ID)?,
            access_key: read(ENV_ACCESS_KEY)?,
            secret_key: read(ENV_SECRET_KEY)?,
        })
    }
}

impl std::fmt::Debug for ArchiveCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets never reach logs.
        f.debug_struct("ArchiveCredentials")
            .field("account_id", &self.account_id)
            .field("access_key", &"***")
            .field("secret_key", &"***")
            .finish()
    }
}

/// Configuration for a mirror run.
///
/// Use [`MirrorConfig::builder`] to construct instances.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Directory where downloaded documents are staged before upload.
    pub download_dir: PathBuf,

    /// Path of the durable per-item progress file.
    pub progress_path: PathBuf,

    /// Path of the local shared database file.
    pub database_path: PathBuf,

    /// Archive identifier under which the database file is stored.
    pub database_identifier: String,

    /// Archive identifier used for the lock marker artifact.
    pub lock_identifier: String,

    /// Target archive collection for mirrored documents.
    pub collection: String,

    /// Archive account credentials.
    pub credentials: ArchiveCredentials,
}

impl MirrorConfig {
    /// Creates a new builder for constructing a `MirrorConfig`.
    pub fn builder() -> MirrorConfigBuilder {
        MirrorConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.download_dir.as_os_str().is_empty() {
            return Err(Error::Config("Download directory cannot be empty".to_string()));
        }
        if self.progress_path.as_os_str().is_empty() {
            return Err(Error::Config("Progress file path cannot be empty".to_string()));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }
        if self.database_identifier.is_empty() {
            return Err(Error::Config(
                "Database archive identifier cannot be empty".to_string(),
            ));
        }
        if self.lock_identifier.is_empty() {
            return Err(Error::Config(
                "Lock archive identifier cannot be empty".to_string(),
            ));
        }
        if self.lock_identifier == self.database_identifier {
            return Err(Error::Config(
                "Lock identifier must differ from the database identifier".to_string(),
            ));
        }
        if self.collection.is_empty() {
            return Err(Error::Config("Collection cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for [`MirrorConfig`] instances.
#[derive(Default)]
pub struct MirrorConfigBuilder {
    download_dir: Option<PathBuf>,
    progress_path: Option<PathBuf>,
    database_path: Option<PathBuf>,
    database_identifier: Option<String>,
    lock_identifier: Option<String>,
    collection: Option<String>,
    credentials: Option<ArchiveCredentials>,
}

impl MirrorConfigBuilder {
    /// Sets the staging directory for downloads.
    pub fn download_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.download_dir = Some(path.into());
        self
    }

    /// Sets the progress file path.
    pub fn progress_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.progress_path = Some(path.into());
        self
    }

    /// Sets the local database file path.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the archive identifier for the database file.
    pub fn database_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.database_identifier = Some(identifier.into());
        self
    }

    /// Sets the archive identifier for the lock marker.
    pub fn lock_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.lock_identifier = Some(identifier.into());
        self
    }

    /// Sets the target archive collection.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Sets the archive credentials.
    pub fn credentials(mut self, credentials: ArchiveCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Builds the final `MirrorConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns an error naming the missing field or the failed validation
    /// rule.
    pub fn build(self) -> Result<MirrorConfig> {
        let download_dir = self.download_dir.ok_or_else(|| {
            Error::Config("Download directory is required. Use .download_dir() to set it.".to_string())
        })?;
        let progress_path = self.progress_path.ok_or_else(|| {
            Error::Config("Progress path is required. Use .progress_path() to set it.".to_string())
        })?;
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;
        let database_identifier = self.database_identifier.ok_or_else(|| {
            Error::Config(
                "Database identifier is required. Use .database_identifier() to set it.".to_string(),
            )
        })?;
        let lock_identifier = self.lock_identifier.ok_or_else(|| {
            Error::Config(
                "Lock identifier is required. Use .lock_identifier() to set it.".to_string(),
            )
        })?;
        let collection = self.collection.ok_or_else(|| {
            Error::Config("Collection is required. Use .collection() to set it.".to_string())
        })?;
        let credentials = self.credentials.ok_or_else(|| {
            Error::Config(
                "Credentials are required. Use .credentials() with ArchiveCredentials::from_env() \
                 or explicit values."
                    .to_string(),
            )
        })?;

        let config = MirrorConfig {
            download_dir,
            progress_path,
            database_path,
            database_identifier,
            lock_identifier,
            collection,
            credentials,
        };

        config.validate()?;

        Ok(config)
    }
}
