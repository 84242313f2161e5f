//! Record identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A stable identifier shared by every record kind, using UUID v7 (time-sortable).
///
/// The id is the natural key for remote upserts, so resending a record is
/// idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_unique() {
        assert_ne!(RecordId::new(), RecordId::new());
    }

    #[test]
    fn test_record_id_parse() {
        let id = RecordId::new();
        let parsed: RecordId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<RecordId>().is_err());
    }

    #[test]
    fn test_record_id_serializes_as_plain_string() {
        let id = RecordId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.as_str()));
    }
}
