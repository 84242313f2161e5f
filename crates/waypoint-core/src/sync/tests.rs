use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::tempdir;

use super::*;
use crate::clock::ManualClock;
use crate::db::Database;
use crate::models::{Log, PhotoRef, Place, Record, RecordId, SyncStatus, Trip};
use crate::network::NetworkStatus;
use crate::photos::{InMemoryPhotoStorage, LocalImage, PhotoOwner, PhotoUploadQueue};
use crate::remote::{InMemoryBackend, RemoteError};

const USER: &str = "user-1";

struct Harness {
    engine: SyncEngine<InMemoryBackend>,
    backend: InMemoryBackend,
    store: LocalStore,
    network: NetworkMonitor,
}

fn manual_config() -> SyncConfig {
    SyncConfig::default().without_auto_start()
}

fn harness_with(store: LocalStore, backend: InMemoryBackend, config: SyncConfig) -> Harness {
    let network = NetworkMonitor::with_status(NetworkStatus::Online);
    let engine = SyncEngine::new(
        store.clone(),
        backend.clone(),
        config,
        USER,
        network.clone(),
    )
    .unwrap();
    Harness {
        engine,
        backend,
        store,
        network,
    }
}

fn harness() -> Harness {
    let store = LocalStore::open_in_memory(Arc::new(ManualClock::new(1_000_000))).unwrap();
    harness_with(store, InMemoryBackend::new(), manual_config())
}

impl Harness {
    fn save_place(&self, name: &str) -> Place {
        match self.store.save(Place::new(name, 48.2, 16.4, 0).into()).unwrap().record {
            Record::Place(place) => place,
            other => panic!("expected place, got {other:?}"),
        }
    }

    fn save_log(&self, place: &Place, title: &str) -> Log {
        match self.store.save(Log::new(place.id, title, 0).into()).unwrap().record {
            Record::Log(log) => log,
            other => panic!("expected log, got {other:?}"),
        }
    }

    fn status_of(&self, kind: EntityKind, id: &RecordId) -> SyncStatus {
        self.store.get(kind, id).unwrap().unwrap().status
    }

    async fn sync(&self) -> SyncReport {
        self.engine.sync_now().await.unwrap().unwrap()
    }
}

fn remote_place(name: &str, updated_at: i64, user: &str) -> (Place, crate::remote::Row) {
    let place = Place::new(name, 1.0, 2.0, updated_at);
    let row = Record::from(place.clone()).to_remote_row(user).unwrap();
    (place, row)
}

#[tokio::test]
async fn pushes_in_dependency_order_and_marks_synced() {
    let h = harness();
    let tables = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&tables);
    h.backend
        .on_upsert(move |table, _row| seen.lock().unwrap().push(table.to_string()));

    let mut trip = Trip::new("Vienna weekend", 0);
    let unrelated = h.save_place("Unrelated cafe");
    let place = h.save_place("Prater");
    let log = h.save_log(&place, "Ferris wheel");
    trip.log_ids.push(log.id);
    h.store.save(trip.clone().into()).unwrap();

    let report = h.sync().await;

    assert_eq!(report.pushed, 4);
    assert_eq!(
        *tables.lock().unwrap(),
        vec!["places", "places", "logs", "trips"]
    );
    assert_eq!(h.backend.rows("places").len(), 2);
    assert_eq!(h.status_of(EntityKind::Place, &unrelated.id), SyncStatus::Synced);
    assert_eq!(h.status_of(EntityKind::Log, &log.id), SyncStatus::Synced);
    assert_eq!(h.status_of(EntityKind::Trip, &trip.id), SyncStatus::Synced);

    let row = h.backend.row("logs", &log.id.as_str()).unwrap();
    assert_eq!(row["user_id"], json!(USER));
    assert_eq!(row["place_id"], json!(place.id.as_str()));
    assert_eq!(h.engine.status().pending_count(), 0);
}

#[tokio::test]
async fn referenced_place_is_pushed_before_other_places() {
    let h = harness();
    let order = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&order);
    h.backend.on_upsert(move |_table, row| {
        let name = row.get("name").and_then(serde_json::Value::as_str);
        seen.lock().unwrap().push(name.unwrap_or("log").to_string());
    });

    h.save_place("Older place");
    let referenced = h.save_place("Newer place");
    h.save_log(&referenced, "Visit");

    h.sync().await;
    assert_eq!(
        *order.lock().unwrap(),
        vec!["Newer place", "Older place", "log"]
    );
}

#[tokio::test]
async fn concurrent_sync_requests_coalesce_into_one_running_cycle() {
    let h = harness();
    h.save_place("Held");
    h.backend.hold_upserts();

    let engine = h.engine.clone();
    let first = tokio::spawn(async move { engine.sync_now().await });
    h.backend.upsert_entered().await;

    // Second request while the first cycle is in flight
    assert!(h.engine.sync_now().await.unwrap().is_none());
    assert_eq!(h.backend.call_counts().selects, 0);

    h.backend.release_upserts();
    let report = first.await.unwrap().unwrap().unwrap();

    assert_eq!(report.passes, 2);
    assert_eq!(report.pushed, 1);
    // Two sequential cycles, each pulling every kind once
    assert_eq!(h.backend.call_counts().selects, 2 * EntityKind::ALL.len());
    assert_eq!(h.backend.max_in_flight(), 1);
}

#[tokio::test]
async fn mutation_during_push_is_not_lost() {
    let h = harness();
    let place = h.save_place("Museum");
    let log = h.save_log(&place, "First draft");

    let store = h.store.clone();
    let log_id = log.id;
    let fired = Arc::new(AtomicBool::new(false));
    h.backend.on_upsert(move |table, _row| {
        if table == "logs" && !fired.swap(true, Ordering::SeqCst) {
            store
                .update(EntityKind::Log, &log_id, |record| {
                    if let Record::Log(log) = record {
                        log.title = "Edited while pushing".to_string();
                    }
                    true
                })
                .unwrap();
        }
    });

    let report = h.sync().await;
    assert_eq!(report.superseded, 1);
    let stored = h.store.get(EntityKind::Log, &log.id).unwrap().unwrap();
    assert_eq!(stored.status, SyncStatus::Pending);
    assert_eq!(stored.local_version, 2);
    assert_eq!(
        h.backend.row("logs", &log.id.as_str()).unwrap()["title"],
        json!("First draft")
    );

    h.sync().await;
    assert_eq!(h.status_of(EntityKind::Log, &log.id), SyncStatus::Synced);
    assert_eq!(
        h.backend.row("logs", &log.id.as_str()).unwrap()["title"],
        json!("Edited while pushing")
    );
}

#[tokio::test]
async fn pushing_the_same_record_twice_leaves_one_remote_row() {
    let h = harness();
    let place = h.save_place("Bridge");
    h.sync().await;

    // Re-saving the same content queues a second push of the same id
    h.store.save(place.clone().into()).unwrap();
    h.sync().await;

    assert_eq!(h.backend.call_counts().upserts, 2);
    assert_eq!(h.backend.rows("places").len(), 1);
    assert_eq!(h.status_of(EntityKind::Place, &place.id), SyncStatus::Synced);
}

#[tokio::test]
async fn tombstones_survive_restart_and_block_resurrection() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("waypoint.db");
    let backend = InMemoryBackend::new();

    let place_id = {
        let store = LocalStore::open(&path, Arc::new(ManualClock::new(1_000))).unwrap();
        let h = harness_with(store, backend.clone(), manual_config());
        let place = h.save_place("Closed restaurant");
        h.sync().await;
        assert!(backend.row("places", &place.id.as_str()).is_some());

        h.store.delete(EntityKind::Place, &place.id).unwrap();
        backend.fail_next(
            place.id.as_str(),
            RemoteError::Server {
                status: 503,
                message: "maintenance".to_string(),
            },
        );
        let report = h.sync().await;
        assert_eq!(report.deletions_confirmed, 0);
        assert_eq!(report.transient_failures, 1);
        place.id
    };

    // Process restart: new store and engine over the same file
    let store = LocalStore::open(&path, Arc::new(ManualClock::new(500_000))).unwrap();
    let h = harness_with(store, backend.clone(), manual_config());
    assert_eq!(h.store.tombstones().unwrap().len(), 1);
    assert_eq!(h.engine.status().pending_count(), 1);

    // Delete fails again; the pull still sees the remote row
    backend.fail_next(
        place_id.as_str(),
        RemoteError::Server {
            status: 502,
            message: "bad gateway".to_string(),
        },
    );
    let report = h.sync().await;
    assert_eq!(report.merged[&EntityKind::Place].tombstoned, 1);
    assert!(h.store.get(EntityKind::Place, &place_id).unwrap().is_none());

    let report = h.sync().await;
    assert_eq!(report.deletions_confirmed, 1);
    assert!(h.store.tombstones().unwrap().is_empty());
    assert!(backend.row("places", &place_id.as_str()).is_none());
    assert_eq!(h.engine.status().pending_count(), 0);
}

#[tokio::test]
async fn remote_not_found_confirms_deletion() {
    let h = harness();
    let place = h.save_place("Never pushed");
    h.store.delete(EntityKind::Place, &place.id).unwrap();

    let report = h.sync().await;
    assert_eq!(report.deletions_confirmed, 1);
    assert!(h.store.tombstones().unwrap().is_empty());
}

#[tokio::test]
async fn offline_cycles_are_skipped_then_catch_up() {
    let h = harness();
    let place = h.save_place("Mountain hut");
    let log = h.save_log(&place, "No signal up here");

    h.network.set_status(NetworkStatus::Offline);
    let report = h.sync().await;
    assert!(report.offline);
    assert_eq!(h.backend.call_counts().upserts, 0);
    assert!(!h.engine.status().is_online());
    assert_eq!(h.status_of(EntityKind::Log, &log.id), SyncStatus::Pending);
    assert_eq!(h.engine.status().failed_count(), 0);

    // Device reports online but the backend cannot be reached
    h.network.set_status(NetworkStatus::Online);
    h.backend.set_offline(true);
    for _ in 0..2 {
        let report = h.sync().await;
        assert!(report.offline);
        assert_eq!(report.marked_failed, 0);
        assert_eq!(h.backend.call_counts().selects, 0);
        assert_eq!(h.status_of(EntityKind::Log, &log.id), SyncStatus::Pending);
        let status = h.engine.status().snapshot();
        assert_eq!((status.pending_count, status.failed_count), (2, 0));
        assert_eq!(status.phase, SyncPhase::ErrorBackoff);
        assert_eq!(status.last_sync_at, None);
    }

    h.backend.set_offline(false);
    let report = h.sync().await;
    assert!(report.is_clean());
    assert_eq!(report.pushed, 2);
    assert_eq!(h.status_of(EntityKind::Log, &log.id), SyncStatus::Synced);
    let status = h.engine.status().snapshot();
    assert_eq!(status.pending_count, 0);
    assert_eq!(status.failed_count, 0);
    assert_eq!(status.phase, SyncPhase::Idle);
    assert!(status.last_sync_at.is_some());
}

#[tokio::test]
async fn failed_cycle_does_not_count_as_last_sync() {
    let h = harness();
    let place = h.save_place("Overloaded backend");
    let unavailable = || RemoteError::Server {
        status: 503,
        message: "service unavailable".to_string(),
    };
    h.backend.fail_next(place.id.as_str(), unavailable());
    for kind in EntityKind::ALL {
        h.backend.fail_next_select(kind.table(), unavailable());
    }

    let report = h.sync().await;
    assert_eq!(report.pushed, 0);
    assert_eq!(report.transient_failures, 4);
    assert_eq!(report.pull_failures.len(), 3);
    assert_eq!(h.engine.status().last_sync_at(), None);
    assert_eq!(h.store.last_sync_at().unwrap(), None);
    assert_eq!(h.engine.status().phase(), SyncPhase::ErrorBackoff);

    let report = h.sync().await;
    assert!(report.is_clean());
    let stamped = h.store.last_sync_at().unwrap();
    assert!(stamped.is_some());
    assert_eq!(h.engine.status().last_sync_at(), stamped);
}

#[tokio::test]
async fn permanent_rejection_fails_record_and_defers_its_logs() {
    let h = harness();
    let place = h.save_place("Bad coordinates");
    let log = h.save_log(&place, "Depends on place");
    h.backend.fail_next(
        place.id.as_str(),
        RemoteError::Rejected {
            status: 422,
            message: "latitude out of range".to_string(),
        },
    );

    let report = h.sync().await;
    assert_eq!(report.marked_failed, 1);
    assert_eq!(report.deferred, 1);
    assert_eq!(h.status_of(EntityKind::Place, &place.id), SyncStatus::Failed);
    assert_eq!(h.status_of(EntityKind::Log, &log.id), SyncStatus::Pending);
    let stored = h.store.get(EntityKind::Place, &place.id).unwrap().unwrap();
    assert!(stored.last_error.unwrap().contains("latitude out of range"));

    let status = h.engine.status();
    assert_eq!((status.pending_count(), status.failed_count()), (1, 1));

    assert_eq!(h.engine.retry_failed().unwrap(), 1);
    let report = h.sync().await;
    assert_eq!(report.pushed, 2);
    assert_eq!((status.pending_count(), status.failed_count()), (0, 0));
}

#[tokio::test]
async fn transient_failure_keeps_record_pending() {
    let h = harness();
    let place = h.save_place("Flaky");
    h.backend.fail_next(place.id.as_str(), RemoteError::Timeout);

    let report = h.sync().await;
    assert_eq!(report.transient_failures, 1);
    assert!(!report.is_clean());
    assert_eq!(h.status_of(EntityKind::Place, &place.id), SyncStatus::Pending);
    assert_eq!(h.engine.status().phase(), SyncPhase::ErrorBackoff);

    h.sync().await;
    assert_eq!(h.status_of(EntityKind::Place, &place.id), SyncStatus::Synced);
}

#[tokio::test]
async fn expired_auth_suspends_until_resumed() {
    let h = harness();
    let place = h.save_place("Locked out");
    h.backend.fail_next(
        place.id.as_str(),
        RemoteError::AuthExpired("JWT expired".to_string()),
    );

    let report = h.sync().await;
    assert!(report.auth_suspended);
    assert!(h.engine.status().auth_required());
    assert_eq!(h.status_of(EntityKind::Place, &place.id), SyncStatus::Pending);

    let calls = h.backend.call_counts();
    let report = h.sync().await;
    assert!(report.auth_suspended);
    assert_eq!(h.backend.call_counts(), calls);

    h.engine.resume_after_reauth();
    assert!(!h.engine.status().auth_required());
    h.sync().await;
    assert_eq!(h.status_of(EntityKind::Place, &place.id), SyncStatus::Synced);
}

#[tokio::test]
async fn incremental_pull_advances_cursor_and_skips_unchanged_rows() {
    let h = harness();
    let mine: Vec<Place> = [2_000, 5_000, 3_000, 4_000, 1_000]
        .into_iter()
        .enumerate()
        .map(|(index, updated_at)| {
            let (place, row) = remote_place(&format!("Spot {index}"), updated_at, USER);
            h.backend.insert_row("places", row);
            place
        })
        .collect();
    let (_, foreign) = remote_place("Someone else's", 5_500, "user-2");
    h.backend.insert_row("places", foreign);

    let report = h.sync().await;
    assert_eq!(report.merged_count(), 5);
    assert_eq!(h.store.cursor(EntityKind::Place).unwrap(), 5_000);
    for place in &mine {
        let pulled = h.store.get(EntityKind::Place, &place.id).unwrap().unwrap();
        assert_eq!(pulled.status, SyncStatus::Synced);
        assert_eq!(pulled.record, Record::Place(place.clone()));
    }

    let selects = h.backend.call_counts().selects;
    let report = h.sync().await;
    assert_eq!(h.backend.call_counts().selects, selects + 3);
    assert_eq!(report.merged_count(), 0);
    // The cursor is inclusive, so only the newest row comes back
    assert_eq!(report.merged[&EntityKind::Place].unchanged, 1);
    assert_eq!(h.store.cursor(EntityKind::Place).unwrap(), 5_000);

    let mut renamed = mine[0].clone();
    renamed.name = "Renamed on phone".to_string();
    renamed.updated_at = 7_000;
    h.backend
        .insert_row("places", Record::from(renamed.clone()).to_remote_row(USER).unwrap());

    let report = h.sync().await;
    assert_eq!(report.merged_count(), 1);
    assert_eq!(h.store.cursor(EntityKind::Place).unwrap(), 7_000);
    let pulled = h.store.get(EntityKind::Place, &renamed.id).unwrap().unwrap();
    assert_eq!(pulled.record, Record::Place(renamed));
}

#[tokio::test]
async fn local_pending_changes_win_over_pulled_rows() {
    let h = harness();
    let place = h.save_place("Local name");
    h.sync().await;

    let mut local = place.clone();
    local.name = "Edited offline".to_string();
    h.store.save(local.into()).unwrap();

    let mut remote = place.clone();
    remote.name = "Edited elsewhere".to_string();
    remote.updated_at += 10_000_000;
    h.backend
        .insert_row("places", Record::from(remote).to_remote_row(USER).unwrap());

    // Push fails transiently, so the pull meets the remote edit first
    h.backend.fail_next(place.id.as_str(), RemoteError::Timeout);
    let report = h.sync().await;
    assert_eq!(report.merged[&EntityKind::Place].kept_local, 1);

    let stored = h.store.get(EntityKind::Place, &place.id).unwrap().unwrap();
    assert_eq!(stored.status, SyncStatus::Pending);
    let Record::Place(stored_place) = stored.record else {
        panic!("expected place");
    };
    assert_eq!(stored_place.name, "Edited offline");

    // Next cycle pushes the local edit over the remote one
    h.sync().await;
    assert_eq!(
        h.backend.row("places", &place.id.as_str()).unwrap()["name"],
        json!("Edited offline")
    );
}

#[tokio::test]
async fn malformed_rows_fail_only_their_kind() {
    let h = harness();
    let (place, row) = remote_place("Valid", 3_000, USER);
    h.backend.insert_row("places", row);
    h.backend.insert_row(
        "logs",
        json!({"id": RecordId::new().as_str(), "user_id": USER, "updated_at": 3_000})
            .as_object()
            .cloned()
            .unwrap(),
    );

    let report = h.sync().await;
    assert_eq!(report.pull_failures, vec![EntityKind::Log]);
    assert!(h.store.get(EntityKind::Place, &place.id).unwrap().is_some());
    assert_eq!(h.store.cursor(EntityKind::Log).unwrap(), 0);
    assert_eq!(h.store.cursor(EntityKind::Place).unwrap(), 3_000);
}

#[tokio::test]
async fn select_failure_does_not_block_other_kinds() {
    let h = harness();
    let (_, row) = remote_place("Still pulled", 4_000, USER);
    h.backend.insert_row("places", row);
    h.backend.fail_next_select(
        "logs",
        RemoteError::Server {
            status: 500,
            message: "boom".to_string(),
        },
    );

    let report = h.sync().await;
    assert_eq!(report.pull_failures, vec![EntityKind::Log]);
    assert_eq!(report.merged_count(), 1);
    assert_eq!(report.transient_failures, 1);
}

#[tokio::test]
async fn storage_failure_halts_the_engine() {
    let database = Database::open_in_memory().unwrap();
    database
        .connection()
        .execute_batch("DROP TABLE sync_cursors;")
        .unwrap();
    let store = LocalStore::new(database, Arc::new(ManualClock::new(1_000))).unwrap();
    let h = harness_with(store, InMemoryBackend::new(), manual_config());
    h.save_place("Doomed");

    assert!(matches!(
        h.engine.sync_now().await,
        Err(SyncError::StorageFatal(_))
    ));
    assert!(matches!(h.engine.sync_now().await, Err(SyncError::Halted(_))));
    assert!(h.engine.status().fatal_error().is_some());
}

fn png() -> LocalImage {
    LocalImage::from_bytes(crate::photos::test_png(24, 24))
}

#[tokio::test]
async fn photo_batch_partial_failure_then_manual_retry() {
    let h = harness();
    let place = h.save_place("Lighthouse");
    let log = h.save_log(&place, "Sunset");
    h.sync().await;

    let storage = InMemoryPhotoStorage::new();
    let queue = PhotoUploadQueue::new(storage.clone(), &manual_config());
    let owner = PhotoOwner::log(log.id);
    let broken = LocalImage::from_bytes(b"corrupted".to_vec());

    let (placeholders, task) = h
        .engine
        .attach_photos(&queue, owner, vec![png(), broken, png()])
        .unwrap();
    assert_eq!(placeholders.len(), 3);
    assert!(task.await.unwrap().unwrap());

    let Record::Log(patched) = h.store.get(EntityKind::Log, &log.id).unwrap().unwrap().record
    else {
        panic!("expected log");
    };
    assert!(matches!(patched.photos[0], PhotoRef::Uploaded { .. }));
    assert_eq!(
        patched.photos[1],
        PhotoRef::Failed {
            placeholder: placeholders[1].clone()
        }
    );
    assert!(matches!(patched.photos[2], PhotoRef::Uploaded { .. }));
    assert_eq!(h.status_of(EntityKind::Log, &log.id), SyncStatus::Pending);

    // The other fields and uploaded URLs land, but the log stays pending
    let report = h.sync().await;
    assert_eq!(report.awaiting_photos, 1);
    assert_eq!(report.pushed, 0);
    let row = h.backend.row("logs", &log.id.as_str()).unwrap();
    assert_eq!(row["photo_urls"].as_array().unwrap().len(), 2);
    assert_eq!(h.status_of(EntityKind::Log, &log.id), SyncStatus::Pending);
    let status = h.engine.status();
    assert_eq!((status.pending_count(), status.failed_count()), (1, 0));

    // User retries the failed photo with a readable copy
    let result = queue
        .retry_upload(png(), owner, placeholders[1].clone())
        .wait()
        .await;
    assert!(h.engine.apply_photo_results(&result).unwrap());
    let report = h.sync().await;
    assert_eq!(report.pushed, 1);

    let row = h.backend.row("logs", &log.id.as_str()).unwrap();
    assert_eq!(row["photo_urls"].as_array().unwrap().len(), 3);
    assert_eq!(h.status_of(EntityKind::Log, &log.id), SyncStatus::Synced);
    assert_eq!(status.pending_count(), 0);
}

#[tokio::test]
async fn photo_results_for_deleted_records_are_ignored() {
    let h = harness();
    let place = h.save_place("Gone");
    let log = h.save_log(&place, "Removed");

    let storage = InMemoryPhotoStorage::new();
    let queue = PhotoUploadQueue::new(storage, &manual_config());
    let (_, batch) = queue.queue_batch_upload(vec![png()], PhotoOwner::log(log.id));
    h.store.delete(EntityKind::Log, &log.id).unwrap();

    let result = batch.wait().await;
    assert!(!h.engine.apply_photo_results(&result).unwrap());
}

#[tokio::test]
async fn attaching_photos_to_places_is_rejected() {
    let h = harness();
    let place = h.save_place("No photos here");
    let queue = PhotoUploadQueue::new(InMemoryPhotoStorage::new(), &manual_config());

    let result = h
        .engine
        .attach_photos(&queue, PhotoOwner::new(EntityKind::Place, place.id), vec![png()]);
    assert!(result.is_err());
    assert_eq!(queue.storage().upload_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn background_loop_syncs_and_wakes_when_back_online() {
    let store = LocalStore::open_in_memory(Arc::new(ManualClock::new(1_000))).unwrap();
    let config = SyncConfig {
        sync_interval_secs: 300,
        ..SyncConfig::default()
    };
    let h = harness_with(store, InMemoryBackend::new(), config);
    h.save_place("Picked up by the first cycle");

    let handle = h.engine.start();
    assert!(handle.is_running());
    let mut status = h.engine.status();
    tokio::time::timeout(Duration::from_secs(1), async {
        while status.pending_count() > 0 {
            status.changed().await;
        }
    })
    .await
    .unwrap();

    h.network.set_status(NetworkStatus::Offline);
    h.save_place("Saved offline");
    h.engine.request_sync();
    tokio::task::yield_now().await;
    assert_eq!(status.pending_count(), 1);

    // Coming back online wakes the loop well before the backoff delay
    h.network.set_status(NetworkStatus::Online);
    tokio::time::timeout(Duration::from_millis(500), async {
        while status.pending_count() > 0 {
            status.changed().await;
        }
    })
    .await
    .unwrap();

    handle.stop().await;
}

#[tokio::test]
async fn manual_config_returns_an_inert_handle() {
    let h = harness();
    let handle = h.engine.start();
    assert!(!handle.is_running());
    handle.stop().await;
}
