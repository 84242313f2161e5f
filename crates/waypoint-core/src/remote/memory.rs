//! In-process backend used by tests and offline demos.
//!
//! Behaves like the real service for upsert/select/delete and adds fault
//! injection: an offline switch, scripted per-id and per-table failures, a
//! gate that holds upserts in flight, and an upsert hook.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch, Notify};

use super::{ChangeEvent, RemoteBackend, RemoteError, RemoteResult, Row, RowFilter};

type UpsertHook = Box<dyn Fn(&str, &Row) + Send + Sync>;

/// Number of calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub upserts: usize,
    pub selects: usize,
    pub deletes: usize,
}

#[derive(Default)]
struct Counters {
    upserts: AtomicUsize,
    selects: AtomicUsize,
    deletes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct MemoryInner {
    tables: Mutex<BTreeMap<String, BTreeMap<String, Row>>>,
    offline: AtomicBool,
    id_failures: Mutex<HashMap<String, VecDeque<RemoteError>>>,
    table_failures: Mutex<HashMap<String, VecDeque<RemoteError>>>,
    counters: Counters,
    hold: watch::Sender<bool>,
    upsert_entered: Notify,
    upsert_hook: Mutex<Option<UpsertHook>>,
    subscribers: Mutex<Vec<(String, mpsc::UnboundedSender<ChangeEvent>)>>,
}

/// Thread-safe in-memory backend; clones share state.
#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<MemoryInner>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct InFlight<'a>(&'a Counters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn row_id(row: &Row) -> RemoteResult<String> {
    row.get("id")
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| RemoteError::Rejected {
            status: 400,
            message: "row is missing an id".to_string(),
        })
}

fn updated_at(row: &Row) -> i64 {
    row.get("updated_at")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or_default()
}

impl InMemoryBackend {
    pub fn new() -> Self {
        let (hold, _) = watch::channel(false);
        Self {
            inner: Arc::new(MemoryInner {
                tables: Mutex::new(BTreeMap::new()),
                offline: AtomicBool::new(false),
                id_failures: Mutex::new(HashMap::new()),
                table_failures: Mutex::new(HashMap::new()),
                counters: Counters::default(),
                hold,
                upsert_entered: Notify::new(),
                upsert_hook: Mutex::new(None),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Simulate losing (or regaining) network connectivity.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail the next upsert/delete of `id` with `error`.
    pub fn fail_next(&self, id: impl Into<String>, error: RemoteError) {
        lock(&self.inner.id_failures)
            .entry(id.into())
            .or_default()
            .push_back(error);
    }

    /// Fail the next select on `table` with `error`.
    pub fn fail_next_select(&self, table: impl Into<String>, error: RemoteError) {
        lock(&self.inner.table_failures)
            .entry(table.into())
            .or_default()
            .push_back(error);
    }

    /// Hold every upsert in flight until [`Self::release_upserts`] is called.
    pub fn hold_upserts(&self) {
        self.inner.hold.send_replace(true);
    }

    pub fn release_upserts(&self) {
        self.inner.hold.send_replace(false);
    }

    /// Resolves once an upsert has been received (one permit per call).
    pub async fn upsert_entered(&self) {
        self.inner.upsert_entered.notified().await;
    }

    /// Run `hook` for every upsert while the request is in flight.
    pub fn on_upsert(&self, hook: impl Fn(&str, &Row) + Send + Sync + 'static) {
        *lock(&self.inner.upsert_hook) = Some(Box::new(hook));
    }

    /// Write a row directly, as if another device had pushed it.
    pub fn insert_row(&self, table: &str, row: Row) {
        let Ok(id) = row_id(&row) else {
            return;
        };
        lock(&self.inner.tables)
            .entry(table.to_string())
            .or_default()
            .insert(id.clone(), row);
        self.notify(ChangeEvent::Upserted {
            table: table.to_string(),
            id,
        });
    }

    pub fn row(&self, table: &str, id: &str) -> Option<Row> {
        lock(&self.inner.tables)
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned()
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        lock(&self.inner.tables)
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn call_counts(&self) -> CallCounts {
        let counters = &self.inner.counters;
        CallCounts {
            upserts: counters.upserts.load(Ordering::SeqCst),
            selects: counters.selects.load(Ordering::SeqCst),
            deletes: counters.deletes.load(Ordering::SeqCst),
        }
    }

    /// Highest number of calls observed in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.inner.counters.max_in_flight.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> RemoteResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Unreachable("network is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn scripted_failure(&self, id: &str) -> Option<RemoteError> {
        lock(&self.inner.id_failures)
            .get_mut(id)
            .and_then(VecDeque::pop_front)
    }

    fn notify(&self, event: ChangeEvent) {
        let table = match &event {
            ChangeEvent::Upserted { table, .. } | ChangeEvent::Deleted { table, .. } => {
                table.clone()
            }
        };
        lock(&self.inner.subscribers)
            .retain(|(subscribed, sender)| subscribed != &table || sender.send(event.clone()).is_ok());
    }
}

impl RemoteBackend for InMemoryBackend {
    async fn upsert(&self, table: &str, row: Row) -> RemoteResult<()> {
        let _in_flight = InFlight::enter(&self.inner.counters);
        self.inner.counters.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_entered.notify_one();

        let mut hold = self.inner.hold.subscribe();
        // Sender lives in `inner`, so the channel cannot close while we wait.
        let _ = hold.wait_for(|held| !*held).await;

        self.check_online()?;
        let id = row_id(&row)?;
        if let Some(error) = self.scripted_failure(&id) {
            return Err(error);
        }

        if let Some(hook) = lock(&self.inner.upsert_hook).as_ref() {
            hook(table, &row);
        }

        lock(&self.inner.tables)
            .entry(table.to_string())
            .or_default()
            .insert(id.clone(), row);
        self.notify(ChangeEvent::Upserted {
            table: table.to_string(),
            id,
        });
        Ok(())
    }

    async fn select(&self, table: &str, filter: &RowFilter) -> RemoteResult<Vec<Row>> {
        let _in_flight = InFlight::enter(&self.inner.counters);
        self.inner.counters.selects.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let scripted = lock(&self.inner.table_failures)
            .get_mut(table)
            .and_then(VecDeque::pop_front);
        if let Some(error) = scripted {
            return Err(error);
        }

        let mut rows: Vec<Row> = lock(&self.inner.tables)
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|row| filter.matches(row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(updated_at);
        Ok(rows)
    }

    async fn delete(&self, table: &str, id: &str) -> RemoteResult<()> {
        let _in_flight = InFlight::enter(&self.inner.counters);
        self.inner.counters.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if let Some(error) = self.scripted_failure(id) {
            return Err(error);
        }

        let removed = lock(&self.inner.tables)
            .get_mut(table)
            .and_then(|rows| rows.remove(id));
        if removed.is_none() {
            return Err(RemoteError::NotFound);
        }
        self.notify(ChangeEvent::Deleted {
            table: table.to_string(),
            id: id.to_string(),
        });
        Ok(())
    }

    fn subscribe(
        &self,
        table: &str,
        _filter: &RowFilter,
    ) -> RemoteResult<Option<mpsc::UnboundedReceiver<ChangeEvent>>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.inner.subscribers).push((table.to_string(), sender));
        Ok(Some(receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: &str, updated_at: i64) -> Row {
        json!({"id": id, "user_id": "u1", "updated_at": updated_at})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let backend = InMemoryBackend::new();
        backend.upsert("logs", row("a", 1)).await.unwrap();
        backend.upsert("logs", row("a", 2)).await.unwrap();

        assert_eq!(backend.rows("logs").len(), 1);
        assert_eq!(backend.row("logs", "a").unwrap()["updated_at"], 2);
        assert_eq!(backend.call_counts().upserts, 2);
    }

    #[tokio::test]
    async fn offline_and_scripted_failures() {
        let backend = InMemoryBackend::new();
        backend.set_offline(true);
        assert!(matches!(
            backend.upsert("logs", row("a", 1)).await,
            Err(RemoteError::Unreachable(_))
        ));

        backend.set_offline(false);
        backend.fail_next("a", RemoteError::from_status(422, "bad"));
        assert!(matches!(
            backend.upsert("logs", row("a", 1)).await,
            Err(RemoteError::Rejected { status: 422, .. })
        ));
        assert!(backend.upsert("logs", row("a", 1)).await.is_ok());
    }

    #[tokio::test]
    async fn select_filters_and_orders_by_updated_at() {
        let backend = InMemoryBackend::new();
        backend.insert_row("places", row("b", 30));
        backend.insert_row("places", row("a", 10));
        backend.insert_row("places", row("c", 20));

        let rows = backend
            .select("places", &RowFilter::for_user("u1").updated_since(20))
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|row| row["id"].clone()).collect();
        assert_eq!(ids, vec![json!("c"), json!("b")]);
    }

    #[tokio::test]
    async fn delete_missing_row_is_not_found() {
        let backend = InMemoryBackend::new();
        assert_eq!(
            backend.delete("trips", "missing").await,
            Err(RemoteError::NotFound)
        );
    }

    #[tokio::test]
    async fn subscribers_receive_changes_for_their_table() {
        let backend = InMemoryBackend::new();
        let mut receiver = backend
            .subscribe("logs", &RowFilter::default())
            .unwrap()
            .unwrap();

        backend.insert_row("places", row("p", 1));
        backend.insert_row("logs", row("l", 1));

        assert_eq!(
            receiver.recv().await,
            Some(ChangeEvent::Upserted {
                table: "logs".to_string(),
                id: "l".to_string()
            })
        );
    }
}
