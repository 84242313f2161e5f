//! Offline-first sync engine.
//!
//! A cycle pushes every dirty record and tombstone, then pulls each kind
//! incrementally from its cursor. At most one cycle runs at a time; a sync
//! requested while one is running sets `needs_resync` and the running cycle
//! goes around once more before returning to idle.
//!
//! The store is never locked across a network call: each store method is
//! synchronous, and the local version recorded before a push decides after
//! the call whether the confirmation still applies.

mod pull;
mod push;
#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::SyncConfig;
use crate::db::{LocalStore, MergeOutcome};
use crate::error::{Error, Result};
use crate::models::EntityKind;
use crate::network::NetworkMonitor;
use crate::photos::{self, LocalImage, PhotoBatchResult, PhotoOwner, PhotoStorage, PhotoUploadQueue};
use crate::remote::{ErrorClass, RemoteBackend, RemoteError, RowFilter};
use crate::retry::Backoff;
use crate::status::{EngineState, SyncPhase, SyncStatusObserver};

/// Errors that escape a sync cycle. Network failures never do.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local store failed; the engine stops syncing.
    #[error("Local storage failed: {0}")]
    StorageFatal(#[from] Error),
    #[error("Sync engine halted after a storage failure: {0}")]
    Halted(String),
}

/// What one `sync_now` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Cycles run, including resyncs requested while running
    pub passes: u32,
    /// Records confirmed and marked synced
    pub pushed: usize,
    /// Records confirmed remotely but modified again in flight
    pub superseded: usize,
    /// Records confirmed remotely but left pending for unresolved photos
    pub awaiting_photos: usize,
    /// Logs held back because their place did not make it this cycle
    pub deferred: usize,
    /// Records or tombstones rejected permanently
    pub marked_failed: usize,
    /// Calls that failed transiently and will be retried
    pub transient_failures: usize,
    pub deletions_confirmed: usize,
    pub merged: BTreeMap<EntityKind, MergeOutcome>,
    pub pull_failures: Vec<EntityKind>,
    /// The device was offline or the backend unreachable
    pub offline: bool,
    /// Sync is suspended until the user re-authenticates
    pub auth_suspended: bool,
}

impl SyncReport {
    /// Remote rows that changed local state.
    pub fn merged_count(&self) -> usize {
        self.merged.values().map(|outcome| outcome.applied).sum()
    }

    /// No error worth backing off for.
    pub fn is_clean(&self) -> bool {
        self.transient_failures == 0 && self.pull_failures.is_empty() && !self.offline
    }

    fn absorb(&mut self, pass: Self) {
        self.passes += pass.passes;
        self.pushed += pass.pushed;
        self.superseded += pass.superseded;
        self.awaiting_photos += pass.awaiting_photos;
        self.deferred += pass.deferred;
        self.marked_failed += pass.marked_failed;
        self.transient_failures += pass.transient_failures;
        self.deletions_confirmed += pass.deletions_confirmed;
        for (kind, outcome) in pass.merged {
            let total = self.merged.entry(kind).or_default();
            total.applied += outcome.applied;
            total.unchanged += outcome.unchanged;
            total.kept_local += outcome.kept_local;
            total.tombstoned += outcome.tombstoned;
            total.cursor = total.cursor.max(outcome.cursor);
        }
        self.pull_failures.extend(pass.pull_failures);
        self.pull_failures.sort_unstable();
        self.pull_failures.dedup();
        self.offline |= pass.offline;
        self.auth_suspended |= pass.auth_suspended;
    }
}

/// Why a cycle stopped early.
pub(crate) enum Interrupt {
    /// Backend unreachable; abandon the cycle silently
    Offline(String),
    AuthExpired(String),
    Storage(Error),
}

impl From<Error> for Interrupt {
    fn from(error: Error) -> Self {
        Self::Storage(error)
    }
}

/// Per-call reaction after classifying a remote error.
pub(crate) enum Disposition {
    Transient,
    Permanent,
}

/// Split a remote error into a per-record reaction or a cycle interrupt.
pub(crate) fn classify(error: &RemoteError) -> std::result::Result<Disposition, Interrupt> {
    if error.is_unreachable() {
        return Err(Interrupt::Offline(error.to_string()));
    }
    match error.class() {
        ErrorClass::Transient => Ok(Disposition::Transient),
        ErrorClass::Permanent => Ok(Disposition::Permanent),
        ErrorClass::AuthExpired => Err(Interrupt::AuthExpired(error.to_string())),
    }
}

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    needs_resync: bool,
    loop_active: bool,
    auth_suspended: bool,
    halted: Option<String>,
}

pub(crate) struct EngineInner<B> {
    pub(crate) store: LocalStore,
    pub(crate) backend: B,
    pub(crate) config: SyncConfig,
    pub(crate) user_id: String,
    network: NetworkMonitor,
    state: watch::Sender<EngineState>,
    run: Mutex<RunState>,
    wake: Notify,
}

impl<B> EngineInner<B> {
    fn run_state(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.state.send_if_modified(|state| {
            let changed = state.phase != phase;
            state.phase = phase;
            changed
        });
    }

    pub(crate) fn row_filter(&self, cursor: i64) -> RowFilter {
        RowFilter::for_user(self.user_id.clone()).updated_since(cursor)
    }

    pub(crate) const fn request_timeout(&self) -> Duration {
        self.config.request_timeout()
    }
}

/// Clears the running flag even if the cycle future is dropped mid-flight.
struct RunGuard<'a, B> {
    inner: &'a EngineInner<B>,
}

impl<B> Drop for RunGuard<'_, B> {
    fn drop(&mut self) {
        let mut run = self.inner.run_state();
        if run.running {
            run.running = false;
            if run.needs_resync {
                self.inner.wake.notify_one();
            }
        }
    }
}

/// The sync engine. Cheap to clone; clones drive the same engine.
pub struct SyncEngine<B> {
    inner: Arc<EngineInner<B>>,
}

impl<B> Clone for SyncEngine<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: RemoteBackend> SyncEngine<B> {
    pub fn new(
        store: LocalStore,
        backend: B,
        config: SyncConfig,
        user_id: impl Into<String>,
        network: NetworkMonitor,
    ) -> Result<Self> {
        config.validate()?;
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(Error::Config("user_id is required for sync".to_string()));
        }
        let (state, _) = watch::channel(EngineState {
            last_sync_at: store.last_sync_at()?,
            ..EngineState::default()
        });
        Ok(Self {
            inner: Arc::new(EngineInner {
                store,
                backend,
                config,
                user_id,
                network,
                state,
                run: Mutex::new(RunState::default()),
                wake: Notify::new(),
            }),
        })
    }

    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.inner.network
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn status(&self) -> SyncStatusObserver {
        SyncStatusObserver::new(
            self.inner.store.subscribe_counts(),
            self.inner.network.subscribe(),
            self.inner.state.subscribe(),
        )
    }

    /// Run a sync cycle now and wait for it.
    ///
    /// Returns `Ok(None)` when a cycle was already running; that cycle picks
    /// up the request before going idle.
    pub async fn sync_now(&self) -> std::result::Result<Option<SyncReport>, SyncError> {
        {
            let mut run = self.inner.run_state();
            if let Some(message) = &run.halted {
                return Err(SyncError::Halted(message.clone()));
            }
            if run.auth_suspended {
                tracing::debug!("Sync suspended until re-authentication");
                return Ok(Some(SyncReport {
                    auth_suspended: true,
                    ..SyncReport::default()
                }));
            }
            if run.running {
                run.needs_resync = true;
                return Ok(None);
            }
            run.running = true;
        }
        let _guard = RunGuard { inner: &self.inner };

        let mut report = SyncReport::default();
        loop {
            match self.run_cycle().await {
                Ok(pass) => report.absorb(pass),
                Err(error) => {
                    self.halt(&error);
                    return Err(SyncError::StorageFatal(error));
                }
            }

            let again = {
                let mut run = self.inner.run_state();
                let again = run.needs_resync && !run.auth_suspended;
                run.needs_resync = false;
                // Cleared under the same lock so a late request cannot be lost
                run.running = again;
                again
            };
            if !again {
                break;
            }
            tracing::debug!("Sync requested during cycle; running again");
        }

        tracing::info!(
            "Sync finished: {} pushed, {} merged, {} failed, {} deletions, {} transient errors",
            report.pushed,
            report.merged_count(),
            report.marked_failed,
            report.deletions_confirmed,
            report.transient_failures
        );
        Ok(Some(report))
    }

    /// Ask for a sync without waiting.
    ///
    /// Coalesces into the running cycle if there is one; otherwise wakes the
    /// background loop. Without a loop the request is kept until one starts.
    pub fn request_sync(&self) {
        {
            let mut run = self.inner.run_state();
            if run.running {
                run.needs_resync = true;
                return;
            }
        }
        self.inner.wake.notify_one();
    }

    /// Re-queue every failed record and tombstone, then request a sync.
    pub fn retry_failed(&self) -> Result<usize> {
        let requeued = self.inner.store.retry_failed()?;
        tracing::info!("Re-queued {requeued} failed item(s) for sync");
        if requeued > 0 {
            self.request_sync();
        }
        Ok(requeued)
    }

    /// Lift the auth suspension once the backend has fresh credentials.
    pub fn resume_after_reauth(&self) {
        self.inner.run_state().auth_suspended = false;
        self.inner.state.send_modify(|state| state.auth_required = false);
        tracing::info!("Credentials refreshed; resuming sync");
        self.request_sync();
    }

    /// Patch the owning record with a finished photo batch.
    ///
    /// Returns `false` when the record or its placeholders are gone.
    pub fn apply_photo_results(&self, result: &PhotoBatchResult) -> Result<bool> {
        let owner = result.owner;
        let updated = self.inner.store.update(owner.kind, &owner.record_id, |record| {
            photos::apply_outcomes(record, &result.outcomes)
        })?;
        match updated {
            Some(stored) => {
                tracing::debug!(
                    "Applied {} photo result(s) to {} {} (version {})",
                    result.outcomes.len(),
                    owner.kind,
                    owner.record_id,
                    stored.local_version
                );
                self.request_sync();
                Ok(true)
            }
            None => {
                tracing::debug!(
                    "Photo results for {} {} no longer apply",
                    owner.kind,
                    owner.record_id
                );
                Ok(false)
            }
        }
    }

    /// Queue `images` for `owner`, save their placeholders on the record and
    /// apply the batch result once it completes.
    pub fn attach_photos<S: PhotoStorage>(
        &self,
        queue: &PhotoUploadQueue<S>,
        owner: PhotoOwner,
        images: Vec<LocalImage>,
    ) -> Result<(Vec<String>, JoinHandle<Result<bool>>)> {
        let Some(current) = self.inner.store.get(owner.kind, &owner.record_id)? else {
            return Err(Error::NotFound(format!("{} {}", owner.kind, owner.record_id)));
        };
        // Reject before anything is uploaded.
        let mut draft = current.record;
        let draft_placeholders = vec![String::new(); images.len()];
        photos::attach_placeholders(&mut draft, &draft_placeholders)?;

        let (placeholders, batch) = queue.queue_batch_upload(images, owner);
        let mut attach_error = None;
        self.inner.store.update(owner.kind, &owner.record_id, |record| {
            match photos::attach_placeholders(record, &placeholders) {
                Ok(()) => true,
                Err(error) => {
                    attach_error = Some(error);
                    false
                }
            }
        })?;
        if let Some(error) = attach_error {
            return Err(error);
        }

        let engine = self.clone();
        let task = tokio::spawn(async move {
            let result = batch.wait().await;
            engine.apply_photo_results(&result)
        });
        Ok((placeholders, task))
    }

    /// Start the background loop.
    ///
    /// Returns an inert handle when `start_automatically` is off or a loop is
    /// already running. Dropping the handle stops the loop as well.
    pub fn start(&self) -> SyncHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        if !self.claim_loop() {
            return SyncHandle {
                stop: stop_tx,
                task: None,
            };
        }
        let engine = self.clone();
        let task = tokio::spawn(async move {
            engine.run_loop(stop_rx).await;
            engine.inner.run_state().loop_active = false;
        });
        SyncHandle {
            stop: stop_tx,
            task: Some(task),
        }
    }

    fn claim_loop(&self) -> bool {
        if !self.inner.config.start_automatically {
            tracing::debug!("Automatic sync disabled; drive sync_now manually");
            return false;
        }
        let mut run = self.inner.run_state();
        if run.loop_active {
            tracing::warn!("Background sync already running");
            return false;
        }
        run.loop_active = true;
        true
    }

    async fn run_loop(&self, mut stop: watch::Receiver<bool>) {
        let interval = self.inner.config.sync_interval();
        let mut backoff = Backoff::new(self.inner.config.retry.clone());
        let mut network = self.inner.network.subscribe();
        let _subscriptions = self.spawn_change_forwarders();
        let mut delay = Duration::ZERO;

        tracing::info!("Background sync started (interval {interval:?})");
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                () = tokio::time::sleep(delay) => {}
                () = self.inner.wake.notified() => {}
                Ok(()) = network.changed() => {
                    if !network.borrow_and_update().allows_sync() {
                        continue;
                    }
                    tracing::debug!("Network available; syncing");
                }
            }
            if *stop.borrow() {
                break;
            }

            match self.sync_now().await {
                Ok(Some(report)) if report.is_clean() || report.auth_suspended => {
                    backoff.reset();
                    delay = interval;
                }
                Ok(Some(_)) => {
                    delay = backoff.next_delay().min(interval);
                    tracing::debug!("Backing off for {delay:?}");
                }
                Ok(None) => delay = interval,
                Err(error) => {
                    tracing::error!("Background sync stopped: {error}");
                    break;
                }
            }
        }
        tracing::info!("Background sync stopped");
    }

    /// Wake the loop on remote change notifications, where supported.
    fn spawn_change_forwarders(&self) -> JoinSet<()> {
        let mut forwarders = JoinSet::new();
        let filter = RowFilter::for_user(self.inner.user_id.clone());
        for kind in EntityKind::ALL {
            match self.inner.backend.subscribe(kind.table(), &filter) {
                Ok(Some(mut changes)) => {
                    let inner = Arc::clone(&self.inner);
                    forwarders.spawn(async move {
                        while changes.recv().await.is_some() {
                            inner.wake.notify_one();
                        }
                    });
                }
                Ok(None) => {}
                Err(error) => tracing::warn!("Subscribing to {} failed: {error}", kind.table()),
            }
        }
        forwarders
    }

    async fn run_cycle(&self) -> Result<SyncReport> {
        let inner = &self.inner;
        let mut report = SyncReport {
            passes: 1,
            ..SyncReport::default()
        };

        if !inner.network.is_online() {
            tracing::debug!("Offline; skipping sync cycle");
            report.offline = true;
            inner.set_phase(SyncPhase::ErrorBackoff);
            return Ok(report);
        }

        inner.set_phase(SyncPhase::Pushing);
        let mut outcome = push::push_all(inner, &mut report).await;
        if outcome.is_ok() {
            inner.set_phase(SyncPhase::Pulling);
            outcome = pull::pull_all(inner, &mut report).await;
        }

        match outcome {
            Ok(()) if report.is_clean() => {
                let now = inner.store.clock().now_millis();
                inner.store.set_last_sync_at(now)?;
                inner.state.send_modify(|state| {
                    state.last_sync_at = Some(now);
                    state.phase = SyncPhase::Idle;
                });
            }
            Ok(()) => inner.set_phase(SyncPhase::ErrorBackoff),
            Err(Interrupt::Offline(message)) => {
                tracing::info!("Backend unreachable, abandoning cycle: {message}");
                report.offline = true;
                inner.set_phase(SyncPhase::ErrorBackoff);
            }
            Err(Interrupt::AuthExpired(message)) => {
                tracing::warn!("Authentication expired, suspending sync: {message}");
                report.auth_suspended = true;
                inner.run_state().auth_suspended = true;
                inner.state.send_modify(|state| {
                    state.auth_required = true;
                    state.phase = SyncPhase::Idle;
                });
            }
            Err(Interrupt::Storage(error)) => return Err(error),
        }
        Ok(report)
    }

    fn halt(&self, error: &Error) {
        tracing::error!("Halting sync after storage failure: {error}");
        let message = error.to_string();
        self.inner.run_state().halted = Some(message.clone());
        self.inner.state.send_modify(|state| {
            state.phase = SyncPhase::Idle;
            state.fatal_error = Some(message);
        });
    }
}

/// Handle on the background loop started by [`SyncEngine::start`].
#[derive(Debug)]
pub struct SyncHandle {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    pub const fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Stop the loop between cycles and wait for it to exit.
    ///
    /// A cycle in flight finishes first.
    pub async fn stop(mut self) {
        self.stop.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::warn!("Sync loop ended abnormally: {error}");
            }
        }
    }
}
