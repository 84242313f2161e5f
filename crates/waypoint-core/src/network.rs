//! Connectivity signal fed by the host platform.
//!
//! The engine never probes the network itself; the embedding app (or the CLI)
//! reports transitions and the engine wakes up when the device comes back
//! online.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkStatus {
    Online,
    Offline,
    /// No signal received yet
    #[default]
    Unknown,
}

impl NetworkStatus {
    /// Whether a sync attempt is worth making. `Unknown` optimistically
    /// counts as online; the backend call will tell.
    pub const fn allows_sync(self) -> bool {
        !matches!(self, Self::Offline)
    }
}

/// Shared, cloneable network monitor.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    status: Arc<watch::Sender<NetworkStatus>>,
}

impl NetworkMonitor {
    pub fn new() -> Self {
        Self::with_status(NetworkStatus::Unknown)
    }

    pub fn with_status(initial: NetworkStatus) -> Self {
        let (status, _) = watch::channel(initial);
        Self {
            status: Arc::new(status),
        }
    }

    /// Record a platform connectivity change. Repeated reports of the same
    /// status do not wake subscribers.
    pub fn set_status(&self, next: NetworkStatus) {
        let changed = self.status.send_if_modified(|current| {
            let changed = *current != next;
            *current = next;
            changed
        });
        if changed {
            match next {
                NetworkStatus::Online => tracing::info!("Network: online"),
                NetworkStatus::Offline => tracing::warn!("Network: offline"),
                NetworkStatus::Unknown => tracing::debug!("Network: unknown"),
            }
        }
    }

    pub fn set_online(&self, online: bool) {
        self.set_status(if online {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        });
    }

    pub fn current_status(&self) -> NetworkStatus {
        *self.status.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current_status().allows_sync()
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_counts_as_online_for_attempts() {
        let monitor = NetworkMonitor::new();
        assert_eq!(monitor.current_status(), NetworkStatus::Unknown);
        assert!(monitor.is_online());

        monitor.set_online(false);
        assert!(!monitor.is_online());
    }

    #[test]
    fn subscribers_only_see_real_transitions() {
        let monitor = NetworkMonitor::with_status(NetworkStatus::Online);
        let mut receiver = monitor.subscribe();

        monitor.set_status(NetworkStatus::Online);
        assert!(!receiver.has_changed().unwrap());

        monitor.set_status(NetworkStatus::Offline);
        assert!(receiver.has_changed().unwrap());
        assert_eq!(*receiver.borrow_and_update(), NetworkStatus::Offline);
    }
}
