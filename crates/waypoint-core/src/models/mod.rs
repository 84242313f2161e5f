//! Data models for Waypoint

mod id;
mod log;
mod photo;
mod place;
mod record;
mod trip;

pub use id::RecordId;
pub use log::Log;
pub use photo::{new_placeholder, PhotoRef};
pub use place::Place;
pub use record::{EntityKind, Record, SyncStatus, Syncable};
pub use trip::Trip;
