use std::collections::BTreeSet;

use chrono::Utc;
use dashmap::DashMap;
use netmgr_core::{NetworkState, NetworkStatus, Transport};
use tokio::sync::broadcast;

/// Capacity of the state-change fan-out channel.
const NOTIFY_CAPACITY: usize = 64;

/// Current connectivity status of every transport that has reported in.
///
/// Updates are last-write-wins. A transport that never reported is treated
/// as not ready. Every update is fanned out to subscribers.
pub struct NetworkStateRegistry {
    states: DashMap<Transport, NetworkState>,
    notifier: broadcast::Sender<NetworkState>,
}

impl NetworkStateRegistry {
    pub fn new() -> Self {
        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            states: DashMap::new(),
            notifier,
        }
    }

    /// Replace the status of `transport`, returning the previous status if any.
    pub fn update(&self, transport: Transport, status: NetworkStatus) -> Option<NetworkStatus> {
        self.apply(NetworkState {
            transport,
            status,
            reported_at: Utc::now(),
        })
    }

    /// Store a driver-reported state, returning the previous status if any.
    pub fn apply(&self, state: NetworkState) -> Option<NetworkStatus> {
        let transport = state.transport;
        let status = state.status;
        let previous = self
            .states
            .insert(transport, state.clone())
            .map(|prev| prev.status);

        match status {
            NetworkStatus::Connected | NetworkStatus::Verified => {
                tracing::info!(%transport, "{} reporting {}", transport, status.describe());
            }
            NetworkStatus::Error | NetworkStatus::Blocked | NetworkStatus::PortConflict => {
                tracing::warn!(%transport, "{} reporting {}", transport, status.describe());
            }
            _ => {
                tracing::info!(%transport, "{} reporting {}...", transport, status.describe());
            }
        }

        // No subscribers is not an error.
        let _ = self.notifier.send(state);
        previous
    }

    /// Current status of `transport`, `None` if it never reported.
    pub fn get(&self, transport: Transport) -> Option<NetworkStatus> {
        self.states.get(&transport).map(|s| s.status)
    }

    /// Full state record of `transport`.
    pub fn state(&self, transport: Transport) -> Option<NetworkState> {
        self.states.get(&transport).map(|s| s.value().clone())
    }

    pub fn is_connected(&self, transport: Transport) -> bool {
        self.get(transport).is_some_and(|s| s.is_connected())
    }

    /// Transports currently reporting `Connected`.
    pub fn connected(&self) -> BTreeSet<Transport> {
        self.states
            .iter()
            .filter(|entry| entry.value().status.is_connected())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Snapshot of every reported state, ordered by transport.
    pub fn states(&self) -> Vec<NetworkState> {
        let mut states: Vec<NetworkState> =
            self.states.iter().map(|e| e.value().clone()).collect();
        states.sort_by_key(|s| s.transport);
        states
    }

    /// First connected transport that works without internet access.
    pub fn first_available_non_internet(&self) -> Option<Transport> {
        Transport::NON_INTERNET
            .into_iter()
            .find(|t| self.is_connected(*t))
    }

    /// Receive every subsequent state update.
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkState> {
        self.notifier.subscribe()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl Default for NetworkStateRegistry {
    fn default() -> Self {
        Self::new()
    }
}
