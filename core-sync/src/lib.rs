//! # Distributed Lock & Database Sync
//!
//! Coordinates the shared database file across independent, non-colocated
//! writers that have no central lock server, using the remote archive's
//! metadata API as the only available coordination primitive.
//!
//! ## Components
//!
//! - **Lock Manager** (`lock`): lease-based advisory mutex built on a
//!   dedicated archive item, with stale-lease reclamation
//! - **Database Reconciler** (`reconciler`): bidirectional push/pull/no-op
//!   decision procedure for the shared database file, guarded by the lock
//!
//! The lock is advisory: acquisition is not atomic, and two racing
//! acquirers may both succeed. The reconciler never merges; it overwrites
//! the losing side, which is accepted because normal operation has a single
//! primary writer at a time.

pub mod error;
pub mod lock;
pub mod reconciler;

pub use error::{Result, SyncError};
pub use lock::{LockManager, LockRecord};
pub use reconciler::{
    DatabaseReconciler, ReconcilerConfig, SyncDecision, SyncDirection, SyncMetadata,
    SyncMetadataStore, SyncOutcome,
};
