//! Photo references owned by logs and trips

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A photo attached to a record.
///
/// Records are saved with `Pending` placeholders as soon as photos are picked;
/// the upload queue later resolves each placeholder to `Uploaded` or `Failed`.
/// Only `Uploaded` URLs ever reach the remote row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PhotoRef {
    Pending { placeholder: String },
    Uploaded { url: String },
    Failed { placeholder: String },
}

impl PhotoRef {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Uploaded { url } => Some(url),
            Self::Pending { .. } | Self::Failed { .. } => None,
        }
    }

    pub fn placeholder(&self) -> Option<&str> {
        match self {
            Self::Pending { placeholder } | Self::Failed { placeholder } => Some(placeholder),
            Self::Uploaded { .. } => None,
        }
    }

    /// Whether this reference only exists locally (upload not resolved).
    pub const fn is_unresolved(&self) -> bool {
        !matches!(self, Self::Uploaded { .. })
    }
}

/// Generate a new unique placeholder identifier.
#[must_use]
pub fn new_placeholder() -> String {
    format!("placeholder:{}", Uuid::now_v7())
}
