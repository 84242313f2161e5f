use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use waypoint_core::clock::SystemClock;
use waypoint_core::db::{LocalStore, RecordFilter, StoredRecord};
use waypoint_core::network::NetworkMonitor;
use waypoint_core::photos::{InMemoryPhotoStorage, PhotoError, PhotoStorage, PhotoUploadQueue, SupabaseStorage};
use waypoint_core::remote::{
    ChangeEvent, InMemoryBackend, PostgrestBackend, RemoteBackend, RemoteResult, Row, RowFilter,
};
use waypoint_core::{EntityKind, Record, RecordId, SyncEngine};

use crate::config::{CliConfig, DEMO_USER_ID};
use crate::error::CliError;

/// Remote backend chosen at startup.
pub enum CliBackend {
    Supabase(PostgrestBackend),
    Demo(InMemoryBackend),
}

impl RemoteBackend for CliBackend {
    async fn upsert(&self, table: &str, row: Row) -> RemoteResult<()> {
        match self {
            Self::Supabase(backend) => backend.upsert(table, row).await,
            Self::Demo(backend) => backend.upsert(table, row).await,
        }
    }

    async fn select(&self, table: &str, filter: &RowFilter) -> RemoteResult<Vec<Row>> {
        match self {
            Self::Supabase(backend) => backend.select(table, filter).await,
            Self::Demo(backend) => backend.select(table, filter).await,
        }
    }

    async fn delete(&self, table: &str, id: &str) -> RemoteResult<()> {
        match self {
            Self::Supabase(backend) => backend.delete(table, id).await,
            Self::Demo(backend) => backend.delete(table, id).await,
        }
    }

    fn subscribe(
        &self,
        table: &str,
        filter: &RowFilter,
    ) -> RemoteResult<Option<tokio::sync::mpsc::UnboundedReceiver<ChangeEvent>>> {
        match self {
            Self::Supabase(backend) => backend.subscribe(table, filter),
            Self::Demo(backend) => backend.subscribe(table, filter),
        }
    }
}

/// Photo storage chosen at startup.
pub enum CliPhotoStorage {
    Supabase(SupabaseStorage),
    Demo(InMemoryPhotoStorage),
}

impl PhotoStorage for CliPhotoStorage {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, PhotoError> {
        match self {
            Self::Supabase(storage) => storage.upload(key, bytes, content_type).await,
            Self::Demo(storage) => storage.upload(key, bytes, content_type).await,
        }
    }
}

/// Opened local store plus the settings needed to reach the backend.
pub struct AppContext {
    pub store: LocalStore,
    pub config: CliConfig,
    pub offline_demo: bool,
}

impl AppContext {
    pub fn open(db_path: &Path, config: CliConfig, offline_demo: bool) -> Result<Self, CliError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = LocalStore::open(db_path, Arc::new(SystemClock))?;
        Ok(Self {
            store,
            config,
            offline_demo,
        })
    }

    #[cfg(test)]
    pub fn in_memory(config: CliConfig, offline_demo: bool) -> Result<Self, CliError> {
        Ok(Self {
            store: LocalStore::open_in_memory(Arc::new(SystemClock))?,
            config,
            offline_demo,
        })
    }

    pub fn engine(&self) -> Result<SyncEngine<CliBackend>, CliError> {
        self.engine_with(self.config.sync.clone())
    }

    pub fn engine_with(
        &self,
        sync: waypoint_core::config::SyncConfig,
    ) -> Result<SyncEngine<CliBackend>, CliError> {
        let (backend, user_id) = if self.offline_demo {
            tracing::info!("Using in-process demo backend");
            (CliBackend::Demo(InMemoryBackend::new()), DEMO_USER_ID.to_string())
        } else {
            let backend_config = self.config.backend_config()?;
            let backend = PostgrestBackend::new(&backend_config, sync.request_timeout())?;
            (CliBackend::Supabase(backend), backend_config.user_id)
        };
        Ok(SyncEngine::new(
            self.store.clone(),
            backend,
            sync,
            user_id,
            NetworkMonitor::new(),
        )?)
    }

    pub fn photo_queue(&self) -> Result<PhotoUploadQueue<CliPhotoStorage>, CliError> {
        let storage = if self.offline_demo {
            CliPhotoStorage::Demo(InMemoryPhotoStorage::default())
        } else {
            let backend_config = self.config.backend_config()?;
            CliPhotoStorage::Supabase(SupabaseStorage::new(
                &backend_config,
                self.config.sync.request_timeout(),
            )?)
        };
        Ok(PhotoUploadQueue::new(storage, &self.config.sync))
    }
}

pub fn normalize_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Resolve a full ID or a unique ID prefix to a stored record.
pub fn resolve_record(
    store: &LocalStore,
    kind: EntityKind,
    query: &str,
) -> Result<StoredRecord, CliError> {
    let query = normalize_identifier(query)?;
    let not_found = || CliError::NotFound {
        kind: kind.to_string(),
        query: query.clone(),
    };

    if let Ok(id) = query.parse::<RecordId>() {
        return store.get(kind, &id)?.ok_or_else(not_found);
    }

    let prefix = query.to_ascii_lowercase();
    let mut matches = store
        .fetch(&RecordFilter::kind(kind))?
        .into_iter()
        .filter(|stored| stored.record.id().as_str().starts_with(&prefix))
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(not_found()),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|stored| short_id(&stored.record.id()))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Newest first, at most `limit`.
pub fn list_records(
    store: &LocalStore,
    kind: EntityKind,
    limit: usize,
) -> Result<Vec<StoredRecord>, CliError> {
    let mut records = store.fetch(&RecordFilter::kind(kind))?;
    records.reverse();
    records.truncate(limit);
    Ok(records)
}

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub sync_status: String,
    pub last_error: Option<String>,
    pub updated_at: i64,
    pub relative_time: String,
    pub record: serde_json::Value,
}

pub fn record_to_list_item(stored: &StoredRecord) -> Result<RecordListItem, CliError> {
    let now_ms = Utc::now().timestamp_millis();
    let record = &stored.record;
    Ok(RecordListItem {
        id: record.id().to_string(),
        kind: record.kind().to_string(),
        title: record_title(record),
        sync_status: stored.status.as_str().to_string(),
        last_error: stored.last_error.clone(),
        updated_at: record.updated_at(),
        relative_time: format_relative_time(record.updated_at(), now_ms),
        record: serde_json::from_str(&record.payload_json()?)?,
    })
}

pub fn format_record_lines(records: &[StoredRecord]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|stored| {
            let short = short_id(&stored.record.id());
            let title = truncate(&record_title(&stored.record), 40);
            let status = stored.status.as_str();
            let relative_time = format_relative_time(stored.record.updated_at(), now_ms);
            match &stored.last_error {
                Some(error) => format!("{short:<13}  {title:<40}  {status:<8}  {relative_time:<10}  {error}"),
                None => format!("{short:<13}  {title:<40}  {status:<8}  {relative_time}"),
            }
        })
        .collect()
}

pub fn record_title(record: &Record) -> String {
    match record {
        Record::Place(place) => place.name.clone(),
        Record::Log(log) => {
            let unresolved = log.photos.iter().filter(|photo| photo.is_unresolved()).count();
            if unresolved == 0 {
                log.title.clone()
            } else {
                format!("{} ({unresolved} photo(s) unresolved)", log.title)
            }
        }
        Record::Trip(trip) => format!("{} ({} logs)", trip.name, trip.log_ids.len()),
    }
}

pub fn short_id(id: &RecordId) -> String {
    id.as_str().chars().take(13).collect()
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = value.chars().take(max_chars.saturating_sub(3)).collect::<String>();
    truncated.push_str("...");
    truncated
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
