//! # Runtime Configuration & Logging
//!
//! Shared plumbing for the document mirror core: configuration captured once
//! at construction time (never read from ambient environment at call sites)
//! and the `tracing` logging bootstrap.
//!
//! ## Components
//!
//! - **Configuration** (`config`): [`MirrorConfig`] builder with fail-fast
//!   validation, plus [`ArchiveCredentials`] loaded explicitly from the
//!   environment with a hard failure when required variables are absent.
//! - **Logging** (`logging`): `tracing-subscriber` initialization with
//!   env-filter support and selectable output formats.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{ArchiveCredentials, MirrorConfig, MirrorConfigBuilder};
pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat, LoggingConfig};
