//! Local store for Waypoint

mod connection;
mod migrations;
mod store;

pub use connection::Database;
pub use store::{LocalStore, MergeOutcome, RecordFilter, StoredRecord, SyncCounts, Tombstone};
