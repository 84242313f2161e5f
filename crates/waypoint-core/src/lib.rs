//! waypoint-core - Core library for Waypoint
//!
//! This crate contains the shared models, the local store, the remote backend
//! contract and the offline-first sync engine used by every Waypoint client.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod network;
pub mod photos;
pub mod remote;
pub mod retry;
pub mod status;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{EntityKind, Record, RecordId, SyncStatus};
pub use sync::{SyncEngine, SyncError, SyncHandle, SyncReport};
