//! Local record store.
//!
//! Every method is synchronous and releases the connection before returning,
//! so no store lock is ever held across a network call. The `local_version`
//! column is bumped by every local mutation; the sync engine passes the
//! version it pushed back into [`LocalStore::mark_synced`], which only flips
//! the status when nothing changed in the meantime.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use tokio::sync::watch;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::models::{EntityKind, Record, RecordId, SyncStatus};

use super::Database;

const LAST_SYNC_AT_KEY: &str = "last_sync_at";

/// A record together with its synchronization metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub record: Record,
    pub status: SyncStatus,
    /// Bumped by every local mutation
    pub local_version: i64,
    pub last_error: Option<String>,
}

/// A local deletion awaiting remote confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    pub kind: EntityKind,
    pub id: RecordId,
    pub deleted_at: i64,
    pub status: SyncStatus,
    pub last_error: Option<String>,
}

/// Pending/failed totals across records and tombstones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub pending: usize,
    pub failed: usize,
}

/// Result of merging one pulled batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Rows inserted or overwritten locally
    pub applied: usize,
    /// Rows identical to the local copy
    pub unchanged: usize,
    /// Rows skipped because the local copy has unpushed changes
    pub kept_local: usize,
    /// Rows skipped because the record is deleted locally
    pub tombstoned: usize,
    /// Cursor after the merge
    pub cursor: i64,
}

/// Filter for [`LocalStore::fetch`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub kind: Option<EntityKind>,
    pub statuses: Vec<SyncStatus>,
    pub updated_since: Option<i64>,
    pub ids: Vec<RecordId>,
}

impl RecordFilter {
    pub fn kind(kind: EntityKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Records that still have to be pushed.
    pub fn dirty(kind: EntityKind) -> Self {
        Self::kind(kind).with_statuses(&[SyncStatus::Pending, SyncStatus::Failed])
    }

    #[must_use]
    pub fn with_statuses(mut self, statuses: &[SyncStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    #[must_use]
    pub const fn updated_since(mut self, cursor: i64) -> Self {
        self.updated_since = Some(cursor);
        self
    }

    #[must_use]
    pub fn with_ids(mut self, ids: impl IntoIterator<Item = RecordId>) -> Self {
        self.ids = ids.into_iter().collect();
        self
    }
}

/// Durable on-device store; clones share the same connection.
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
    counts: Arc<watch::Sender<SyncCounts>>,
}

impl LocalStore {
    pub fn new(database: Database, clock: Arc<dyn Clock>) -> Result<Self> {
        let (counts, _) = watch::channel(SyncCounts::default());
        let store = Self {
            conn: Arc::new(Mutex::new(database.into_connection())),
            clock,
            counts: Arc::new(counts),
        };
        store.refresh_counts()?;
        Ok(store)
    }

    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::new(Database::open(path)?, clock)
    }

    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        Self::new(Database::open_in_memory()?, clock)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn fetch(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>> {
        let mut sql = String::from(
            "SELECT kind, payload, sync_status, local_version, last_error FROM records WHERE 1 = 1",
        );
        let mut values: Vec<Value> = Vec::new();

        if let Some(kind) = filter.kind {
            sql.push_str(" AND kind = ?");
            values.push(Value::Text(kind.as_str().to_string()));
        }
        if !filter.statuses.is_empty() {
            sql.push_str(&format!(
                " AND sync_status IN ({})",
                placeholders(filter.statuses.len())
            ));
            values.extend(
                filter
                    .statuses
                    .iter()
                    .map(|status| Value::Text(status.as_str().to_string())),
            );
        }
        if let Some(since) = filter.updated_since {
            sql.push_str(" AND updated_at >= ?");
            values.push(Value::Integer(since));
        }
        if !filter.ids.is_empty() {
            sql.push_str(&format!(" AND id IN ({})", placeholders(filter.ids.len())));
            values.extend(filter.ids.iter().map(|id| Value::Text(id.as_str())));
        }
        sql.push_str(" ORDER BY updated_at ASC, id ASC");

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), raw_stored_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(decode_stored).collect()
    }

    pub fn get(&self, kind: EntityKind, id: &RecordId) -> Result<Option<StoredRecord>> {
        let conn = self.conn();
        load_stored(&conn, kind, id)
    }

    /// Pending and failed records of `kind`, oldest first.
    pub fn dirty_records(&self, kind: EntityKind) -> Result<Vec<StoredRecord>> {
        self.fetch(&RecordFilter::dirty(kind))
    }

    pub fn tombstones(&self) -> Result<Vec<Tombstone>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT kind, id, deleted_at, sync_status, last_error
             FROM pending_deletions
             ORDER BY deleted_at ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(kind, id, deleted_at, status, last_error)| {
                Ok(Tombstone {
                    kind: kind.parse()?,
                    id: parse_id(&id)?,
                    deleted_at,
                    status: status.parse()?,
                    last_error,
                })
            })
            .collect()
    }

    /// Last pulled `updated_at` for `kind`; 0 forces a full pull.
    pub fn cursor(&self, kind: EntityKind) -> Result<i64> {
        let conn = self.conn();
        read_cursor(&conn, kind)
    }

    pub fn last_sync_at(&self) -> Result<Option<i64>> {
        let conn = self.conn();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?",
                params![LAST_SYNC_AT_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|value| value.parse().ok()))
    }

    /// Current counts, without touching the database.
    pub fn counts(&self) -> SyncCounts {
        *self.counts.borrow()
    }

    pub fn subscribe_counts(&self) -> watch::Receiver<SyncCounts> {
        self.counts.subscribe()
    }

    // ------------------------------------------------------------------
    // Local mutations (UI write path)
    // ------------------------------------------------------------------

    /// Create or update a record; it becomes `pending` in the same statement.
    pub fn save(&self, mut record: Record) -> Result<StoredRecord> {
        record.validate()?;
        record.touch(self.clock.now_millis());

        let stored = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let stored = write_pending(&tx, record)?;
            tx.commit()?;
            stored
        };
        tracing::debug!(
            "Saved {} {} (version {})",
            stored.record.kind(),
            stored.record.id(),
            stored.local_version
        );
        self.refresh_counts()?;
        Ok(stored)
    }

    /// Read-modify-write a record under the store lock.
    ///
    /// `mutate` returns whether it changed anything; unchanged or missing
    /// records return `None` and are left untouched.
    pub fn update<F>(&self, kind: EntityKind, id: &RecordId, mutate: F) -> Result<Option<StoredRecord>>
    where
        F: FnOnce(&mut Record) -> bool,
    {
        let updated = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let Some(mut current) = load_stored(&tx, kind, id)? else {
                return Ok(None);
            };
            if !mutate(&mut current.record) {
                return Ok(None);
            }
            current.record.validate()?;
            current.record.touch(self.clock.now_millis());
            let stored = write_pending(&tx, current.record)?;
            tx.commit()?;
            stored
        };
        self.refresh_counts()?;
        Ok(Some(updated))
    }

    /// Delete a record locally, leaving a tombstone for the sync engine.
    pub fn delete(&self, kind: EntityKind, id: &RecordId) -> Result<()> {
        let now = self.clock.now_millis();
        {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM records WHERE kind = ? AND id = ?",
                params![kind.as_str(), id.as_str()],
            )?;
            if removed == 0 {
                return Err(Error::NotFound(format!("{kind} {id}")));
            }
            tx.execute(
                "INSERT INTO pending_deletions (kind, id, deleted_at, sync_status, last_error)
                 VALUES (?, ?, ?, 'pending', NULL)
                 ON CONFLICT(kind, id) DO UPDATE SET
                    deleted_at = excluded.deleted_at,
                    sync_status = 'pending',
                    last_error = NULL",
                params![kind.as_str(), id.as_str(), now],
            )?;
            tx.commit()?;
        }
        tracing::debug!("Deleted {kind} {id} locally; tombstone queued");
        self.refresh_counts()
    }

    /// Re-queue every failed record and tombstone as pending.
    pub fn retry_failed(&self) -> Result<usize> {
        let requeued = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let records = tx.execute(
                "UPDATE records SET sync_status = 'pending', last_error = NULL
                 WHERE sync_status = 'failed'",
                [],
            )?;
            let deletions = tx.execute(
                "UPDATE pending_deletions SET sync_status = 'pending', last_error = NULL
                 WHERE sync_status = 'failed'",
                [],
            )?;
            tx.commit()?;
            records + deletions
        };
        self.refresh_counts()?;
        Ok(requeued)
    }

    /// Wipe every record, tombstone and cursor (explicit user data reset).
    pub fn reset(&self) -> Result<()> {
        self.conn().execute_batch(
            "DELETE FROM records;
             DELETE FROM pending_deletions;
             DELETE FROM sync_cursors;
             DELETE FROM sync_meta;",
        )?;
        tracing::info!("Local store reset; next pull starts from the beginning");
        self.refresh_counts()
    }

    // ------------------------------------------------------------------
    // Sync engine operations
    // ------------------------------------------------------------------

    /// Mark `version` of a record as confirmed remotely.
    ///
    /// Returns `false` when the record changed (or vanished) since that version
    /// was read; it then stays pending for the next push.
    pub fn mark_synced(&self, kind: EntityKind, id: &RecordId, version: i64) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE records SET sync_status = 'synced', last_error = NULL
             WHERE kind = ? AND id = ? AND local_version = ?",
            params![kind.as_str(), id.as_str(), version],
        )?;
        self.refresh_counts()?;
        Ok(changed == 1)
    }

    /// Mark `version` of a record as permanently rejected.
    pub fn mark_failed(
        &self,
        kind: EntityKind,
        id: &RecordId,
        version: i64,
        error: &str,
    ) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE records SET sync_status = 'failed', last_error = ?
             WHERE kind = ? AND id = ? AND local_version = ?",
            params![error, kind.as_str(), id.as_str(), version],
        )?;
        self.refresh_counts()?;
        Ok(changed == 1)
    }

    /// Drop a tombstone once the remote delete is confirmed.
    pub fn purge_tombstone(&self, kind: EntityKind, id: &RecordId) -> Result<()> {
        self.conn().execute(
            "DELETE FROM pending_deletions WHERE kind = ? AND id = ?",
            params![kind.as_str(), id.as_str()],
        )?;
        self.refresh_counts()
    }

    pub fn mark_tombstone_failed(&self, kind: EntityKind, id: &RecordId, error: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE pending_deletions SET sync_status = 'failed', last_error = ?
             WHERE kind = ? AND id = ?",
            params![error, kind.as_str(), id.as_str()],
        )?;
        self.refresh_counts()
    }

    /// Merge one pulled batch and advance the cursor, atomically.
    ///
    /// Local pending/failed copies win, tombstoned ids stay deleted, synced or
    /// missing records take the remote content. The cursor moves to the
    /// highest `updated_at` in the batch only when the whole batch committed.
    pub fn merge_remote(&self, kind: EntityKind, incoming: Vec<Record>) -> Result<MergeOutcome> {
        let outcome = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let mut outcome = MergeOutcome {
                cursor: read_cursor(&tx, kind)?,
                ..MergeOutcome::default()
            };

            for mut record in incoming {
                outcome.cursor = outcome.cursor.max(record.updated_at());
                let id = record.id();

                if has_tombstone(&tx, kind, &id)? {
                    outcome.tombstoned += 1;
                    continue;
                }

                match load_stored(&tx, kind, &id)? {
                    Some(local) if local.status.is_dirty() => outcome.kept_local += 1,
                    Some(local) if record.same_remote_content(&local.record) => {
                        outcome.unchanged += 1;
                    }
                    Some(local) => {
                        record.retain_local_photos_from(&local.record);
                        write_synced(&tx, &record)?;
                        outcome.applied += 1;
                    }
                    None => {
                        write_synced(&tx, &record)?;
                        outcome.applied += 1;
                    }
                }
            }

            tx.execute(
                "INSERT INTO sync_cursors (kind, cursor) VALUES (?, ?)
                 ON CONFLICT(kind) DO UPDATE SET cursor = MAX(cursor, excluded.cursor)",
                params![kind.as_str(), outcome.cursor],
            )?;
            tx.commit()?;
            outcome
        };
        self.refresh_counts()?;
        Ok(outcome)
    }

    pub fn set_last_sync_at(&self, at: i64) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sync_meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![LAST_SYNC_AT_KEY, at.to_string()],
        )?;
        Ok(())
    }

    /// Recount pending/failed rows (indexed) and publish them.
    fn refresh_counts(&self) -> Result<()> {
        let counts = {
            let conn = self.conn();
            conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM records WHERE sync_status = 'pending')
                        + (SELECT COUNT(*) FROM pending_deletions WHERE sync_status = 'pending'),
                    (SELECT COUNT(*) FROM records WHERE sync_status = 'failed')
                        + (SELECT COUNT(*) FROM pending_deletions WHERE sync_status = 'failed')",
                [],
                |row| {
                    Ok(SyncCounts {
                        pending: row.get(0)?,
                        failed: row.get(1)?,
                    })
                },
            )?
        };
        self.counts.send_if_modified(|current| {
            let modified = *current != counts;
            *current = counts;
            modified
        });
        Ok(())
    }
}

type RawStoredRow = (String, String, String, i64, Option<String>);

fn raw_stored_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawStoredRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn decode_stored((kind, payload, status, local_version, last_error): RawStoredRow) -> Result<StoredRecord> {
    let kind: EntityKind = kind.parse()?;
    Ok(StoredRecord {
        record: Record::from_payload_json(kind, &payload)?,
        status: status.parse()?,
        local_version,
        last_error,
    })
}

fn load_stored(conn: &Connection, kind: EntityKind, id: &RecordId) -> Result<Option<StoredRecord>> {
    conn.query_row(
        "SELECT kind, payload, sync_status, local_version, last_error
         FROM records WHERE kind = ? AND id = ?",
        params![kind.as_str(), id.as_str()],
        raw_stored_row,
    )
    .optional()?
    .map(decode_stored)
    .transpose()
}

fn read_cursor(conn: &Connection, kind: EntityKind) -> Result<i64> {
    let cursor = conn
        .query_row(
            "SELECT cursor FROM sync_cursors WHERE kind = ?",
            params![kind.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(cursor.unwrap_or(0))
}

fn has_tombstone(conn: &Connection, kind: EntityKind, id: &RecordId) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM pending_deletions WHERE kind = ? AND id = ?)",
        params![kind.as_str(), id.as_str()],
        |row| row.get(0),
    )?)
}

/// Upsert a locally mutated record as pending with a bumped version.
///
/// An explicit local write of a tombstoned id brings the record back, so its
/// tombstone is dropped in the same transaction.
fn write_pending(tx: &Transaction<'_>, record: Record) -> Result<StoredRecord> {
    let kind = record.kind();
    let id = record.id();
    let local_version: i64 = tx.query_row(
        "INSERT INTO records (kind, id, payload, updated_at, sync_status, local_version, last_error)
         VALUES (?, ?, ?, ?, 'pending', 1, NULL)
         ON CONFLICT(kind, id) DO UPDATE SET
            payload = excluded.payload,
            updated_at = excluded.updated_at,
            sync_status = 'pending',
            local_version = records.local_version + 1,
            last_error = NULL
         RETURNING local_version",
        params![
            kind.as_str(),
            id.as_str(),
            record.payload_json()?,
            record.updated_at()
        ],
        |row| row.get(0),
    )?;
    tx.execute(
        "DELETE FROM pending_deletions WHERE kind = ? AND id = ?",
        params![kind.as_str(), id.as_str()],
    )?;
    Ok(StoredRecord {
        record,
        status: SyncStatus::Pending,
        local_version,
        last_error: None,
    })
}

/// Upsert a record received from the backend as synced.
fn write_synced(tx: &Transaction<'_>, record: &Record) -> Result<()> {
    tx.execute(
        "INSERT INTO records (kind, id, payload, updated_at, sync_status, local_version, last_error)
         VALUES (?, ?, ?, ?, 'synced', 1, NULL)
         ON CONFLICT(kind, id) DO UPDATE SET
            payload = excluded.payload,
            updated_at = excluded.updated_at,
            sync_status = 'synced',
            local_version = records.local_version + 1,
            last_error = NULL",
        params![
            record.kind().as_str(),
            record.id().as_str(),
            record.payload_json()?,
            record.updated_at()
        ],
    )?;
    Ok(())
}

fn parse_id(raw: &str) -> Result<RecordId> {
    raw.parse()
        .map_err(|_| Error::InvalidInput(format!("Invalid record ID: {raw}")))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
