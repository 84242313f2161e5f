//! Read-only sync status for the UI layer.
//!
//! The observer combines three watch channels: record counts published by the
//! local store, reachability from the network monitor, and engine state
//! published by the sync loop. Every read is a borrow, never a query.

use std::fmt;

use tokio::sync::watch;

use crate::db::SyncCounts;
use crate::network::NetworkStatus;

/// Where the reconciliation loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    Pushing,
    Pulling,
    /// Last cycle hit transient errors; waiting out the backoff delay
    ErrorBackoff,
}

impl SyncPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pushing => "pushing",
            Self::Pulling => "pulling",
            Self::ErrorBackoff => "error_backoff",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State owned and published by the sync engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineState {
    pub phase: SyncPhase,
    /// Completion time of the last cycle that pushed and pulled (Unix ms)
    pub last_sync_at: Option<i64>,
    /// Sync is suspended until the user signs in again
    pub auth_required: bool,
    /// The engine halted on a storage error
    pub fatal_error: Option<String>,
}

/// Point-in-time view of everything the UI shows about sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatusSnapshot {
    pub pending_count: usize,
    pub failed_count: usize,
    pub last_sync_at: Option<i64>,
    pub is_online: bool,
    pub phase: SyncPhase,
    pub auth_required: bool,
    pub fatal_error: Option<String>,
}

/// Cloneable handle the UI keeps to read sync status.
#[derive(Debug, Clone)]
pub struct SyncStatusObserver {
    counts: watch::Receiver<SyncCounts>,
    network: watch::Receiver<NetworkStatus>,
    engine: watch::Receiver<EngineState>,
}

impl SyncStatusObserver {
    pub(crate) const fn new(
        counts: watch::Receiver<SyncCounts>,
        network: watch::Receiver<NetworkStatus>,
        engine: watch::Receiver<EngineState>,
    ) -> Self {
        Self {
            counts,
            network,
            engine,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.counts.borrow().pending
    }

    pub fn failed_count(&self) -> usize {
        self.counts.borrow().failed
    }

    pub fn last_sync_at(&self) -> Option<i64> {
        self.engine.borrow().last_sync_at
    }

    pub fn is_online(&self) -> bool {
        self.network.borrow().allows_sync()
    }

    pub fn phase(&self) -> SyncPhase {
        self.engine.borrow().phase
    }

    pub fn auth_required(&self) -> bool {
        self.engine.borrow().auth_required
    }

    pub fn fatal_error(&self) -> Option<String> {
        self.engine.borrow().fatal_error.clone()
    }

    pub fn snapshot(&self) -> SyncStatusSnapshot {
        let counts = *self.counts.borrow();
        let engine = self.engine.borrow().clone();
        SyncStatusSnapshot {
            pending_count: counts.pending,
            failed_count: counts.failed,
            last_sync_at: engine.last_sync_at,
            is_online: self.is_online(),
            phase: engine.phase,
            auth_required: engine.auth_required,
            fatal_error: engine.fatal_error,
        }
    }

    /// Wait until any part of the status changes.
    ///
    /// Returns `false` once the engine and store are gone.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            result = self.counts.changed() => result.is_ok(),
            result = self.network.changed() => result.is_ok(),
            result = self.engine.changed() => result.is_ok(),
        }
    }

    /// Mark the current values as seen.
    pub fn mark_seen(&mut self) {
        self.counts.mark_unchanged();
        self.network.mark_unchanged();
        self.engine.mark_unchanged();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn snapshot_reflects_every_source() {
        let (counts_tx, counts) = watch::channel(SyncCounts::default());
        let (network_tx, network) = watch::channel(NetworkStatus::Unknown);
        let (engine_tx, engine) = watch::channel(EngineState::default());
        let mut observer = SyncStatusObserver::new(counts, network, engine);

        counts_tx.send_replace(SyncCounts {
            pending: 2,
            failed: 1,
        });
        assert!(observer.changed().await);
        network_tx.send_replace(NetworkStatus::Offline);
        engine_tx.send_replace(EngineState {
            phase: SyncPhase::ErrorBackoff,
            last_sync_at: Some(42),
            auth_required: true,
            fatal_error: None,
        });

        assert_eq!(
            observer.snapshot(),
            SyncStatusSnapshot {
                pending_count: 2,
                failed_count: 1,
                last_sync_at: Some(42),
                is_online: false,
                phase: SyncPhase::ErrorBackoff,
                auth_required: true,
                fatal_error: None,
            }
        );
    }

    #[test]
    fn unknown_network_reads_as_online() {
        let (_counts_tx, counts) = watch::channel(SyncCounts::default());
        let (_network_tx, network) = watch::channel(NetworkStatus::Unknown);
        let (_engine_tx, engine) = watch::channel(EngineState::default());
        let observer = SyncStatusObserver::new(counts, network, engine);
        assert!(observer.is_online());
        assert_eq!(observer.phase(), SyncPhase::Idle);
    }
}
