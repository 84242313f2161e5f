//! Place model

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::remote::Row;
use crate::util::normalize_text_option;

use super::record::{from_row, into_row};
use super::{EntityKind, RecordId, Syncable};

/// A place a log can point at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: RecordId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub category: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Place {
    #[must_use]
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, now: i64) -> Self {
        Self {
            id: RecordId::new(),
            name: name.into(),
            latitude,
            longitude,
            address: None,
            category: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PlaceRow {
    id: RecordId,
    #[serde(default, skip_deserializing)]
    user_id: String,
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    category: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl Syncable for Place {
    const KIND: EntityKind = EntityKind::Place;

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
            return Err(Error::InvalidInput("Place name cannot be empty".into()));
        }
        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude)
        {
            return Err(Error::InvalidInput(format!(
                "Coordinates out of range: {}, {}",
                self.latitude, self.longitude
            )));
        }
        Ok(())
    }

    fn to_remote_row(&self, user_id: &str) -> Result<Row> {
        into_row(&PlaceRow {
            id: self.id,
            user_id: user_id.to_string(),
            name: self.name.trim().to_string(),
            latitude: self.latitude,
            longitude: self.longitude,
            address: normalize_text_option(self.address.clone()),
            category: normalize_text_option(self.category.clone()),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    fn from_remote_row(row: Row) -> Result<Self> {
        let row: PlaceRow = from_row(row)?;
        Ok(Self {
            id: row.id,
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
            address: row.address,
            category: row.category,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_validation_rejects_bad_input() {
        assert!(Place::new("", 0.0, 0.0, 1).validate().is_err());
        assert!(Place::new("Nowhere", 91.0, 0.0, 1).validate().is_err());
        assert!(Place::new("Lisbon", 38.72, -9.14, 1).validate().is_ok());
    }

    #[test]
    fn remote_row_carries_owner_and_roundtrips() {
        let mut place = Place::new("Cafe", 48.85, 2.35, 10);
        place.address = Some("  ".to_string());

        let row = place.to_remote_row("user-1").unwrap();
        assert_eq!(row["user_id"], "user-1");
        assert!(row["address"].is_null());

        let decoded = Place::from_remote_row(row).unwrap();
        assert_eq!(decoded.id, place.id);
        assert_eq!(decoded.name, "Cafe");
        assert_eq!(decoded.address, None);
    }
}
