//! Supabase/PostgREST backend client.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::config::BackendConfig;
use crate::util::compact_text;

use super::{RemoteBackend, RemoteError, RemoteResult, Row, RowFilter};

/// HTTP client for the `/rest/v1` API of a Supabase project.
///
/// Row-level security on the service scopes rows to the signed-in user; the
/// explicit `user_id` filter keeps pulls bounded even with a service key.
#[derive(Clone)]
pub struct PostgrestBackend {
    rest_url: String,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
    client: Client,
}

impl std::fmt::Debug for PostgrestBackend {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PostgrestBackend")
            .field("rest_url", &self.rest_url)
            .field("anon_key", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl PostgrestBackend {
    pub fn new(config: &BackendConfig, timeout: Duration) -> crate::Result<Self> {
        let config = config.validated()?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| crate::Error::Config(format!("Failed to build HTTP client: {error}")))?;
        Ok(Self {
            rest_url: format!("{}/rest/v1", config.supabase_url),
            anon_key: config.anon_key,
            access_token: Arc::new(RwLock::new(config.access_token)),
            client,
        })
    }

    /// Replace the bearer token after the user re-authenticated.
    pub fn set_access_token(&self, token: impl Into<String>) {
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, urlencoding::encode(table))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.anon_key.clone());
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self.authorized(request).send().await.map_err(map_transport_error)?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::from_status(
            status.as_u16(),
            parse_api_error(status, &body),
        ))
    }
}

impl RemoteBackend for PostgrestBackend {
    async fn upsert(&self, table: &str, row: Row) -> RemoteResult<()> {
        let request = self
            .client
            .post(self.table_url(table))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row);
        self.send(request).await?;
        Ok(())
    }

    async fn select(&self, table: &str, filter: &RowFilter) -> RemoteResult<Vec<Row>> {
        let request = self
            .client
            .get(self.table_url(table))
            .query(&select_query(filter));
        let response = self.send(request).await?;
        response
            .json::<Vec<Row>>()
            .await
            .map_err(|error| RemoteError::Decode(error.to_string()))
    }

    async fn delete(&self, table: &str, id: &str) -> RemoteResult<()> {
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal");
        self.send(request).await?;
        Ok(())
    }
}

fn select_query(filter: &RowFilter) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("select", "*".to_string()),
        ("order", "updated_at.asc".to_string()),
    ];
    if let Some(user_id) = &filter.user_id {
        query.push(("user_id", format!("eq.{user_id}")));
    }
    if let Some(since) = filter.updated_since {
        query.push(("updated_at", format!("gte.{since}")));
    }
    query
}

pub(crate) fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout
    } else if error.is_decode() {
        RemoteError::Decode(error.to_string())
    } else {
        RemoteError::Unreachable(error.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
    code: Option<String>,
}

pub(crate) fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.details).or(payload.hint) {
            let code = payload.code.map(|code| format!(" [{code}]")).unwrap_or_default();
            return format!("{}{code} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
