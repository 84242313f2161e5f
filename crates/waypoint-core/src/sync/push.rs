//! Push phase: dirty records in dependency order, then tombstones.

use std::collections::HashSet;

use crate::db::{StoredRecord, Tombstone};
use crate::models::{EntityKind, RecordId};
use crate::remote::{with_timeout, RemoteBackend, RemoteError};

use super::{classify, Disposition, EngineInner, Interrupt, SyncReport};

type PushResult<T> = Result<T, Interrupt>;

/// Result of pushing one record.
enum Pushed {
    Synced,
    /// Confirmed remotely, but changed locally while in flight
    Superseded,
    /// Confirmed remotely, but photos are still unresolved locally
    AwaitingPhotos,
    Transient,
    Failed,
}

impl Pushed {
    /// Whether the remote now holds the record.
    const fn landed(&self) -> bool {
        matches!(self, Self::Synced | Self::Superseded | Self::AwaitingPhotos)
    }
}

/// Push places referenced by dirty logs, the other places, logs, trips and
/// finally deletions.
pub(super) async fn push_all<B: RemoteBackend>(
    inner: &EngineInner<B>,
    report: &mut SyncReport,
) -> PushResult<()> {
    let places = inner.store.dirty_records(EntityKind::Place)?;
    let logs = inner.store.dirty_records(EntityKind::Log)?;
    let trips = inner.store.dirty_records(EntityKind::Trip)?;

    let referenced: HashSet<RecordId> = logs
        .iter()
        .filter_map(|stored| stored.record.referenced_place())
        .collect();
    let (first, rest): (Vec<_>, Vec<_>) = places
        .into_iter()
        .partition(|stored| referenced.contains(&stored.record.id()));

    let mut unpushed_places = HashSet::new();
    for stored in first.into_iter().chain(rest) {
        let id = stored.record.id();
        if !push_record(inner, stored, report).await?.landed() {
            unpushed_places.insert(id);
        }
    }

    for stored in logs {
        if let Some(place_id) = stored.record.referenced_place() {
            if unpushed_places.contains(&place_id) {
                tracing::debug!(
                    "Deferring log {} until place {place_id} is pushed",
                    stored.record.id()
                );
                report.deferred += 1;
                continue;
            }
        }
        push_record(inner, stored, report).await?;
    }

    for stored in trips {
        push_record(inner, stored, report).await?;
    }

    for tombstone in inner.store.tombstones()? {
        push_deletion(inner, tombstone, report).await?;
    }
    Ok(())
}

async fn push_record<B: RemoteBackend>(
    inner: &EngineInner<B>,
    stored: StoredRecord,
    report: &mut SyncReport,
) -> PushResult<Pushed> {
    let kind = stored.record.kind();
    let id = stored.record.id();
    let version = stored.local_version;

    let row = match stored.record.to_remote_row(&inner.user_id) {
        Ok(row) => row,
        Err(error) => {
            // Cannot be encoded; no retry would change that.
            tracing::warn!("Cannot encode {kind} {id}: {error}");
            inner.store.mark_failed(kind, &id, version, &error.to_string())?;
            report.marked_failed += 1;
            return Ok(Pushed::Failed);
        }
    };

    let result = with_timeout(
        inner.request_timeout(),
        inner.backend.upsert(kind.table(), row),
    )
    .await;

    match result {
        Ok(()) => {
            if stored.record.has_unresolved_photos() {
                tracing::debug!("Pushed {kind} {id}; keeping it pending until its photos upload");
                report.awaiting_photos += 1;
                Ok(Pushed::AwaitingPhotos)
            } else if inner.store.mark_synced(kind, &id, version)? {
                tracing::debug!("Pushed {kind} {id} (version {version})");
                report.pushed += 1;
                Ok(Pushed::Synced)
            } else {
                tracing::debug!("{kind} {id} changed during push; keeping it pending");
                report.superseded += 1;
                Ok(Pushed::Superseded)
            }
        }
        Err(error) => record_failure(inner, kind, &id, version, &error, report),
    }
}

fn record_failure<B>(
    inner: &EngineInner<B>,
    kind: EntityKind,
    id: &RecordId,
    version: i64,
    error: &RemoteError,
    report: &mut SyncReport,
) -> PushResult<Pushed> {
    match classify(error)? {
        Disposition::Transient => {
            tracing::warn!("Push of {kind} {id} failed, will retry: {error}");
            report.transient_failures += 1;
            Ok(Pushed::Transient)
        }
        Disposition::Permanent => {
            tracing::warn!("Push of {kind} {id} rejected: {error}");
            inner.store.mark_failed(kind, id, version, &error.to_string())?;
            report.marked_failed += 1;
            Ok(Pushed::Failed)
        }
    }
}

async fn push_deletion<B: RemoteBackend>(
    inner: &EngineInner<B>,
    tombstone: Tombstone,
    report: &mut SyncReport,
) -> PushResult<()> {
    let Tombstone { kind, id, .. } = tombstone;
    let result = with_timeout(
        inner.request_timeout(),
        inner.backend.delete(kind.table(), &id.as_str()),
    )
    .await;

    match result {
        // Already gone remotely counts as confirmed.
        Ok(()) | Err(RemoteError::NotFound) => {
            inner.store.purge_tombstone(kind, &id)?;
            tracing::debug!("Deletion of {kind} {id} confirmed");
            report.deletions_confirmed += 1;
        }
        Err(error) => match classify(&error)? {
            Disposition::Transient => {
                tracing::warn!("Deleting {kind} {id} failed, will retry: {error}");
                report.transient_failures += 1;
            }
            Disposition::Permanent => {
                tracing::warn!("Deletion of {kind} {id} rejected: {error}");
                inner
                    .store
                    .mark_tombstone_failed(kind, &id, &error.to_string())?;
                report.marked_failed += 1;
            }
        },
    }
    Ok(())
}
