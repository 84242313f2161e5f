//! Remote backend contract.
//!
//! The backend is a relational data service reached over the network. Every
//! call may fail; failures are classified at the call site by the sync engine
//! and never escape to the UI layer.

mod memory;
mod postgrest;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::{CallCounts, InMemoryBackend};
pub use postgrest::PostgrestBackend;
pub(crate) use postgrest::{map_transport_error, parse_api_error};

/// A remote row, as a JSON object keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Filter applied to `select` (and subscriptions).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    /// Only rows owned by this user
    pub user_id: Option<String>,
    /// Only rows with `updated_at >= updated_since` (Unix ms)
    pub updated_since: Option<i64>,
}

impl RowFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            updated_since: None,
        }
    }

    #[must_use]
    pub const fn updated_since(mut self, cursor: i64) -> Self {
        self.updated_since = Some(cursor);
        self
    }

    /// Whether `row` passes this filter.
    pub fn matches(&self, row: &Row) -> bool {
        if let Some(user_id) = &self.user_id {
            if row.get("user_id").and_then(serde_json::Value::as_str) != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.updated_since {
            let updated_at = row
                .get("updated_at")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(i64::MIN);
            if updated_at < since {
                return false;
            }
        }
        true
    }
}

/// Push-style change notification from a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Upserted { table: String, id: String },
    Deleted { table: String, id: String },
}

/// How the sync engine reacts to a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry silently on the next cycle
    Transient,
    /// Mark the record failed; no automatic retry
    Permanent,
    /// Suspend sync until the user re-authenticates
    AuthExpired,
}

/// Errors returned by remote backend calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Backend unreachable: {0}")]
    Unreachable(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Backend error (HTTP {status}): {message}")]
    Server { status: u16, message: String },
    #[error("Rejected by backend (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Authentication expired: {0}")]
    AuthExpired(String),
    #[error("Remote row not found")]
    NotFound,
    #[error("Invalid remote payload: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Map an HTTP error status to a remote error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::AuthExpired(message),
            404 => Self::NotFound,
            408 | 429 | 500..=599 => Self::Server { status, message },
            _ => Self::Rejected { status, message },
        }
    }

    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Unreachable(_) | Self::Timeout | Self::Server { .. } => ErrorClass::Transient,
            Self::AuthExpired(_) => ErrorClass::AuthExpired,
            Self::Rejected { .. } | Self::NotFound | Self::Decode(_) => ErrorClass::Permanent,
        }
    }

    /// The network itself is down: the rest of the cycle is pointless.
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Operations the sync engine needs from the remote data service.
///
/// Futures are `Send` so the engine can run on a multi-threaded runtime.
pub trait RemoteBackend: Send + Sync + 'static {
    /// Insert or replace `row`, keyed by its `id` column.
    fn upsert(&self, table: &str, row: Row) -> impl Future<Output = RemoteResult<()>> + Send;

    fn select(
        &self,
        table: &str,
        filter: &RowFilter,
    ) -> impl Future<Output = RemoteResult<Vec<Row>>> + Send;

    fn delete(&self, table: &str, id: &str) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Subscribe to row changes; `None` when the backend only supports polling.
    fn subscribe(
        &self,
        _table: &str,
        _filter: &RowFilter,
    ) -> RemoteResult<Option<mpsc::UnboundedReceiver<ChangeEvent>>> {
        Ok(None)
    }
}

/// Bound a remote call by `timeout`; expiry is a transient [`RemoteError::Timeout`].
pub async fn with_timeout<T>(
    timeout: Duration,
    call: impl Future<Output = RemoteResult<T>>,
) -> RemoteResult<T> {
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(RemoteError::Timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn status_codes_are_classified() {
        assert_eq!(
            RemoteError::from_status(503, "down").class(),
            ErrorClass::Transient
        );
        assert_eq!(
            RemoteError::from_status(429, "slow down").class(),
            ErrorClass::Transient
        );
        assert_eq!(
            RemoteError::from_status(401, "jwt expired").class(),
            ErrorClass::AuthExpired
        );
        assert_eq!(
            RemoteError::from_status(422, "violates check").class(),
            ErrorClass::Permanent
        );
        assert_eq!(RemoteError::from_status(404, "").class(), ErrorClass::Permanent);
        assert!(RemoteError::Unreachable("dns".into()).is_unreachable());
        assert_eq!(RemoteError::Timeout.class(), ErrorClass::Transient);
    }

    #[test]
    fn row_filter_matches_owner_and_cursor() {
        let filter = RowFilter::for_user("u1").updated_since(100);
        assert!(filter.matches(&row(json!({"user_id": "u1", "updated_at": 100}))));
        assert!(!filter.matches(&row(json!({"user_id": "u1", "updated_at": 99}))));
        assert!(!filter.matches(&row(json!({"user_id": "u2", "updated_at": 200}))));
        assert!(RowFilter::default().matches(&row(json!({}))));
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_classifies_expiry_as_transient() {
        let result: RemoteResult<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(RemoteError::Timeout));
    }
}
