//! Trip model - groups logs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::remote::Row;

use super::record::{from_row, into_row};
use super::{EntityKind, PhotoRef, RecordId, Syncable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: RecordId,
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Logs grouped by this trip; pushed after the logs themselves
    #[serde(default)]
    pub log_ids: Vec<RecordId>,
    pub cover_photo: Option<PhotoRef>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Trip {
    #[must_use]
    pub fn new(name: impl Into<String>, now: i64) -> Self {
        Self {
            id: RecordId::new(),
            name: name.into(),
            description: None,
            start_date: None,
            end_date: None,
            log_ids: Vec::new(),
            cover_photo: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TripRow {
    id: RecordId,
    #[serde(default, skip_deserializing)]
    user_id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    start_date: Option<NaiveDate>,
    #[serde(default)]
    end_date: Option<NaiveDate>,
    #[serde(default)]
    log_ids: Vec<RecordId>,
    #[serde(default)]
    cover_photo_url: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl Syncable for Trip {
    const KIND: EntityKind = EntityKind::Trip;

    fn id(&self) -> RecordId {
        self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn touch(&mut self, now: i64) {
        self.updated_at = now;
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("Trip name cannot be empty".into()));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(Error::InvalidInput(format!(
                    "Trip ends ({end}) before it starts ({start})"
                )));
            }
        }
        Ok(())
    }

    fn to_remote_row(&self, user_id: &str) -> Result<Row> {
        into_row(&TripRow {
            id: self.id,
            user_id: user_id.to_string(),
            name: self.name.trim().to_string(),
            description: self.description.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            log_ids: self.log_ids.clone(),
            cover_photo_url: self
                .cover_photo
                .as_ref()
                .and_then(PhotoRef::url)
                .map(ToString::to_string),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    fn from_remote_row(row: Row) -> Result<Self> {
        let row: TripRow = from_row(row)?;
        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            start_date: row.start_date,
            end_date: row.end_date,
            log_ids: row.log_ids,
            cover_photo: row.cover_photo_url.map(|url| PhotoRef::Uploaded { url }),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trip_dates_must_be_ordered() {
        let mut trip = Trip::new("Alps", 1);
        trip.start_date = NaiveDate::from_ymd_opt(2025, 7, 10);
        trip.end_date = NaiveDate::from_ymd_opt(2025, 7, 1);
        assert!(trip.validate().is_err());

        trip.end_date = NaiveDate::from_ymd_opt(2025, 7, 20);
        assert!(trip.validate().is_ok());
    }

    #[test]
    fn pending_cover_photo_is_not_sent() {
        let mut trip = Trip::new("Coast", 1);
        trip.cover_photo = Some(PhotoRef::Pending {
            placeholder: "placeholder:cover".to_string(),
        });
        let row = trip.to_remote_row("user-1").unwrap();
        assert!(row["cover_photo_url"].is_null());

        trip.cover_photo = Some(PhotoRef::Uploaded {
            url: "https://cdn/cover.jpg".to_string(),
        });
        let row = trip.to_remote_row("user-1").unwrap();
        let decoded = Trip::from_remote_row(row).unwrap();
        assert_eq!(decoded.cover_photo, trip.cover_photo);
    }
}
