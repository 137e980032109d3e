//! # Ingestion Pipeline
//!
//! Drives a corpus of remotely-hosted PDF documents into the remote archive
//! under bounded concurrency and partial failure.
//!
//! ## Overview
//!
//! This module manages the per-document ingestion lifecycle:
//! - Attempting a zero-copy transfer where the archive fetches the source
//!   URL itself
//! - Falling back to a staged local download (streaming, validated,
//!   hashed) followed by an upload
//! - Persisting per-item progress after every transition so a crashed run
//!   resumes at the next appropriate sub-step
//! - Bounding download and upload parallelism independently
//!
//! ## Components
//!
//! - **Work Item State Machine** (`item`): per-document state with
//!   validated transitions
//! - **Progress Tracker** (`progress`): durable JSON progress map with
//!   atomic rewrite
//! - **Ingest Pipeline** (`pipeline`): bounded-parallelism hybrid
//!   download/upload orchestrator

pub mod error;
pub mod item;
pub mod pipeline;
pub mod progress;

pub use error::{IngestError, Result};
pub use item::{ItemState, ProcessingStatus, WorkItem};
pub use pipeline::{IngestPipeline, IngestStats, PipelineConfig};
pub use progress::ProgressTracker;
