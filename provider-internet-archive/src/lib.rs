//! # Internet Archive Provider
//!
//! Implements the `ArchiveStore` trait against an S3-compatible archive
//! gateway.
//!
//! ## Overview
//!
//! This module provides:
//! - Bucket-per-item uploads with `x-archive-meta-*` metadata headers
//! - Zero-copy fetch-from-source transfers
//! - JSON metadata endpoint queries with retry and exponential backoff
//! - Streaming uploads/downloads with bounded per-operation timeouts
//! - Cascade deletes of whole items

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{IaEndpoints, IaS3Connector};
pub use error::{IaError, Result};
