//! Record kinds, synchronization status and the shared sync capability

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::remote::Row;

use super::{Log, Place, RecordId, Trip};

/// The kinds of records the sync engine reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Place,
    Log,
    Trip,
}

impl EntityKind {
    /// Every kind, in pull order.
    pub const ALL: [Self; 3] = [Self::Place, Self::Log, Self::Trip];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Place => "place",
            Self::Log => "log",
            Self::Trip => "trip",
        }
    }

    /// Remote table holding rows of this kind.
    pub const fn table(self) -> &'static str {
        match self {
            Self::Place => "places",
            Self::Log => "logs",
            Self::Trip => "trips",
        }
    }

    pub fn from_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.table() == table)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "place" | "places" => Ok(Self::Place),
            "log" | "logs" => Ok(Self::Log),
            "trip" | "trips" => Ok(Self::Trip),
            other => Err(Error::InvalidInput(format!("Unknown record kind: {other}"))),
        }
    }
}

/// Per-record synchronization status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    /// Mutated locally and not yet confirmed remotely
    #[default]
    Pending,
    /// Rejected by the backend with a non-retryable error
    Failed,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }

    /// Whether the record still has to be pushed.
    pub const fn is_dirty(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "synced" => Ok(Self::Synced),
            "pending" => Ok(Self::Pending),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("Unknown sync status: {other}"))),
        }
    }
}

/// Capability shared by every syncable payload.
pub trait Syncable: Sized {
    const KIND: EntityKind;

    fn id(&self) -> RecordId;

    /// Last local or remote modification (Unix ms)
    fn updated_at(&self) -> i64;

    /// Stamp a local modification.
    fn touch(&mut self, now: i64);

    fn validate(&self) -> Result<()>;

    /// Project the payload into the remote row shape, owned by `user_id`.
    fn to_remote_row(&self, user_id: &str) -> Result<Row>;

    fn from_remote_row(row: Row) -> Result<Self>;
}

/// A record of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Place(Place),
    Log(Log),
    Trip(Trip),
}

impl Record {
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Place(_) => EntityKind::Place,
            Self::Log(_) => EntityKind::Log,
            Self::Trip(_) => EntityKind::Trip,
        }
    }

    pub fn id(&self) -> RecordId {
        match self {
            Self::Place(place) => place.id(),
            Self::Log(log) => log.id(),
            Self::Trip(trip) => trip.id(),
        }
    }

    pub fn updated_at(&self) -> i64 {
        match self {
            Self::Place(place) => place.updated_at(),
            Self::Log(log) => log.updated_at(),
            Self::Trip(trip) => trip.updated_at(),
        }
    }

    pub fn touch(&mut self, now: i64) {
        match self {
            Self::Place(place) => place.touch(now),
            Self::Log(log) => log.touch(now),
            Self::Trip(trip) => trip.touch(now),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Place(place) => place.validate(),
            Self::Log(log) => log.validate(),
            Self::Trip(trip) => trip.validate(),
        }
    }

    pub fn to_remote_row(&self, user_id: &str) -> Result<Row> {
        match self {
            Self::Place(place) => place.to_remote_row(user_id),
            Self::Log(log) => log.to_remote_row(user_id),
            Self::Trip(trip) => trip.to_remote_row(user_id),
        }
    }

    pub fn from_remote_row(kind: EntityKind, row: Row) -> Result<Self> {
        Ok(match kind {
            EntityKind::Place => Self::Place(Place::from_remote_row(row)?),
            EntityKind::Log => Self::Log(Log::from_remote_row(row)?),
            EntityKind::Trip => Self::Trip(Trip::from_remote_row(row)?),
        })
    }

    /// Serialize the full local payload (including unresolved photo state).
    pub fn payload_json(&self) -> Result<String> {
        Ok(match self {
            Self::Place(place) => serde_json::to_string(place)?,
            Self::Log(log) => serde_json::to_string(log)?,
            Self::Trip(trip) => serde_json::to_string(trip)?,
        })
    }

    pub fn from_payload_json(kind: EntityKind, payload: &str) -> Result<Self> {
        Ok(match kind {
            EntityKind::Place => Self::Place(serde_json::from_str(payload)?),
            EntityKind::Log => Self::Log(serde_json::from_str(payload)?),
            EntityKind::Trip => Self::Trip(serde_json::from_str(payload)?),
        })
    }

    /// Compare what both records would send to the backend.
    pub fn same_remote_content(&self, other: &Self) -> bool {
        const NO_USER: &str = "";
        match (self.to_remote_row(NO_USER), other.to_remote_row(NO_USER)) {
            (Ok(left), Ok(right)) => left == right,
            _ => false,
        }
    }

    /// Keep photos that only exist locally (pending or failed uploads) when a
    /// remote copy replaces this record's content.
    pub fn retain_local_photos_from(&mut self, local: &Self) {
        match (self, local) {
            (Self::Log(incoming), Self::Log(existing)) => {
                incoming.photos.extend(
                    existing
                        .photos
                        .iter()
                        .filter(|photo| photo.is_unresolved())
                        .cloned(),
                );
            }
            (Self::Trip(incoming), Self::Trip(existing)) => {
                if incoming.cover_photo.is_none() {
                    incoming.cover_photo = existing
                        .cover_photo
                        .clone()
                        .filter(super::PhotoRef::is_unresolved);
                }
            }
            _ => {}
        }
    }

    /// Photos still uploading or waiting for a manual retry. The remote row
    /// only carries uploaded URLs, so such a record is not fully synced.
    pub fn has_unresolved_photos(&self) -> bool {
        match self {
            Self::Log(log) => log.photos.iter().any(super::PhotoRef::is_unresolved),
            Self::Trip(trip) => trip.cover_photo.as_ref().is_some_and(super::PhotoRef::is_unresolved),
            Self::Place(_) => false,
        }
    }

    /// Place referenced by this record, if any (logs reference a place).
    pub const fn referenced_place(&self) -> Option<RecordId> {
        match self {
            Self::Log(log) => Some(log.place_id),
            Self::Place(_) | Self::Trip(_) => None,
        }
    }
}

impl From<Place> for Record {
    fn from(value: Place) -> Self {
        Self::Place(value)
    }
}

impl From<Log> for Record {
    fn from(value: Log) -> Self {
        Self::Log(value)
    }
}

impl From<Trip> for Record {
    fn from(value: Trip) -> Self {
        Self::Trip(value)
    }
}

/// Convert a serializable row struct into a JSON object row.
pub(super) fn into_row(value: &impl Serialize) -> Result<Row> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(Error::InvalidInput(format!(
            "Remote row must be a JSON object, got {other}"
        ))),
    }
}

pub(super) fn from_row<T: serde::de::DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::Object(row))?)
}
