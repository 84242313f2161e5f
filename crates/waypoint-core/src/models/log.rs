//! Log model - a visit to a place, optionally with photos

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::remote::Row;

use super::record::{from_row, into_row};
use super::{EntityKind, PhotoRef, RecordId, Syncable};

/// A journal entry for a visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub id: RecordId,
    /// Place this log was written at; must exist remotely before the log
    pub place_id: RecordId,
    pub title: String,
    pub notes: String,
    /// Optional 1-5 rating
    pub rating: Option<u8>,
    /// Visit timestamp (Unix ms)
    pub visited_at: i64,
    #[serde(default)]
    pub photos: Vec<PhotoRef>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Log {
    #[must_use]
    pub fn new(place_id: RecordId, title: impl Into<String>, now: i64) -> Self {
        Self {
            id: RecordId::new(),
            place_id,
            title: title.into(),
            notes: String::new(),
            rating: None,
            visited_at: now,
            photos: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Resolved photo URLs, in display order.
    pub fn photo_urls(&self) -> Vec<String> {
        self.photos
            .iter()
            .filter_map(PhotoRef::url)
            .map(ToString::to_string)
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
struct LogRow {
    id: RecordId,
    #[serde(default, skip_deserializing)]
    user_id: String,
    place_id: RecordId,
    title: String,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    rating: Option<u8>,
    visited_at: i64,
    #[serde(default)]
    photo_urls: Vec<String>,
    created_at: i64,
    updated_at: i64,
}

impl Syncable for Log {
    const KIND: EntityKind = EntityKind::Log;

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
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput("Log title cannot be empty".into()));
        }
        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(Error::InvalidInput(format!(
                    "Rating must be between 1 and 5, got {rating}"
                )));
            }
        }
        Ok(())
    }

    fn to_remote_row(&self, user_id: &str) -> Result<Row> {
        into_row(&LogRow {
            id: self.id,
            user_id: user_id.to_string(),
            place_id: self.place_id,
            title: self.title.trim().to_string(),
            notes: self.notes.clone(),
            rating: self.rating,
            visited_at: self.visited_at,
            photo_urls: self.photo_urls(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    fn from_remote_row(row: Row) -> Result<Self> {
        let row: LogRow = from_row(row)?;
        Ok(Self {
            id: row.id,
            place_id: row.place_id,
            title: row.title,
            notes: row.notes,
            rating: row.rating,
            visited_at: row.visited_at,
            photos: row
                .photo_urls
                .into_iter()
                .map(|url| PhotoRef::Uploaded { url })
                .collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn remote_row_only_carries_uploaded_photos() {
        let mut log = Log::new(RecordId::new(), "Museum", 5);
        log.photos = vec![
            PhotoRef::Uploaded {
                url: "https://cdn/a.jpg".to_string(),
            },
            PhotoRef::Pending {
                placeholder: "placeholder:b".to_string(),
            },
            PhotoRef::Failed {
                placeholder: "placeholder:c".to_string(),
            },
        ];

        let row = log.to_remote_row("user-1").unwrap();
        assert_eq!(row["photo_urls"], serde_json::json!(["https://cdn/a.jpg"]));

        let decoded = Log::from_remote_row(row).unwrap();
        assert_eq!(decoded.photos.len(), 1);
        assert_eq!(decoded.photo_urls(), vec!["https://cdn/a.jpg".to_string()]);
    }

    #[test]
    fn rating_must_be_in_range() {
        let mut log = Log::new(RecordId::new(), "Beach", 5);
        log.rating = Some(6);
        assert!(log.validate().is_err());
        log.rating = Some(4);
        assert!(log.validate().is_ok());
    }

    #[test]
    fn decoding_rejects_rows_without_place() {
        let mut row = Log::new(RecordId::new(), "Hike", 5)
            .to_remote_row("user-1")
            .unwrap();
        row.remove("place_id");
        assert!(Log::from_remote_row(row).is_err());
    }
}
