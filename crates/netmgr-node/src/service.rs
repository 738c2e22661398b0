//! The network manager service: the single owner of the routing state.
//!
//! Transport drivers, the HTTP API and the periodic tasks all go through
//! [`NetworkManager`]. It owns the registry, the directory (and with it the
//! relationship graph), the router, the retry store and the discovery
//! scheduler.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use netmgr_core::{
    DiscoveryReply, DiscoveryRequest, Envelope, NetworkState, NetworkStatus, PeerIdentity,
    PeerScope, Transport,
};
use netmgr_routing::{
    Disposition, NetworkStateRegistry, PeerDirectory, RelationshipGraph, RetainAll, RouteDecision,
    Router, RoutingError,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::NetmgrConfig;
use crate::discovery::{DiscoveryReport, DiscoveryScheduler};
use crate::dispatch::TransportDispatcher;
use crate::error::NodeError;
use crate::retry::{HoldStore, RetryStore, SweepReport};
use crate::storage::{Storage, CF_PEERS};

/// What happened to a send request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SendOutcome {
    /// Handed to a transport driver.
    Accepted {
        message_id: Uuid,
        transport: Transport,
        peer_id: String,
    },
    /// Persisted for a later retry sweep.
    Held { message_id: Uuid, reason: String },
    /// Rejected; retrying cannot help without caller correction.
    DeadLettered { message_id: Uuid, reason: String },
    /// Neither handed off nor held, e.g. the hold store failed.
    Failed { message_id: Uuid, reason: String },
}

/// Result of a batch peer update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerUpdateReport {
    pub accepted: usize,
    pub rejected: Vec<String>,
}

pub struct NetworkManager {
    registry: Arc<NetworkStateRegistry>,
    directory: Arc<PeerDirectory>,
    router: Router,
    retry: RetryStore,
    discovery: DiscoveryScheduler,
    dispatcher: Arc<dyn TransportDispatcher>,
    peer_store: Option<Arc<Storage>>,
}

impl NetworkManager {
    pub fn new(
        config: &NetmgrConfig,
        hold_store: Arc<dyn HoldStore>,
        dispatcher: Arc<dyn TransportDispatcher>,
    ) -> Self {
        let graph = RelationshipGraph::new(config.graph.clone(), config.reliability.clone());
        let directory = PeerDirectory::new(graph).with_peer_limit(
            config.discovery.max_peers_per_transport,
            Box::new(RetainAll),
        );

        let registry = Arc::new(NetworkStateRegistry::new());
        let directory = Arc::new(directory);
        let router = Router::new(Arc::clone(&registry), Arc::clone(&directory));

        Self {
            registry,
            directory,
            router,
            retry: RetryStore::new(hold_store),
            discovery: DiscoveryScheduler::new(config.discovery.peers_to_share)
                .with_request_timeout(config.discovery.request_timeout()),
            dispatcher,
            peer_store: None,
        }
    }

    /// Persist discovered peers to `storage`.
    pub fn with_peer_store(mut self, storage: Arc<Storage>) -> Self {
        self.peer_store = Some(storage);
        self
    }

    pub fn registry(&self) -> &NetworkStateRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    // ---- network state ----

    /// Apply a driver state report; returns the previous status.
    pub fn update_network_state(&self, state: NetworkState) -> Option<NetworkStatus> {
        self.registry.apply(state)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkState> {
        self.registry.subscribe()
    }

    pub fn local_networks(&self) -> Vec<NetworkState> {
        self.registry.states()
    }

    pub fn active_networks(&self) -> Vec<Transport> {
        self.registry.connected().into_iter().collect()
    }

    pub fn network_status(&self, transport: Transport) -> Option<NetworkStatus> {
        self.registry.get(transport)
    }

    pub fn is_network_connected(&self, transport: Transport) -> bool {
        self.registry.is_connected(transport)
    }

    // ---- sending ----

    /// Route and hand off one message, holding or dead-lettering it on failure.
    pub fn send(
        &self,
        mut envelope: Envelope,
        destination: Option<PeerIdentity>,
    ) -> Result<SendOutcome, NodeError> {
        if let Some(destination) = destination {
            envelope.destination = Some(destination);
        }
        let result = self.router.route(&envelope, None);
        self.settle(envelope, result)
    }

    /// Send a copy of `envelope` to each peer, independently.
    ///
    /// Every copy gets its own message id so held copies do not collide. A
    /// failure for one peer is reported in its outcome and the rest proceed.
    pub fn publish(&self, envelope: Envelope, peers: Vec<PeerIdentity>) -> Vec<SendOutcome> {
        let results = self.router.route_all(&envelope, &peers);
        let mut outcomes = Vec::with_capacity(peers.len());
        for (peer, result) in peers.into_iter().zip(results) {
            let mut copy = envelope.clone();
            let message_id = Uuid::now_v7();
            copy.id = message_id;
            copy.destination = Some(peer);
            let outcome = self.settle(copy, result).unwrap_or_else(|e| {
                tracing::warn!(message = %message_id, error = %e, "publish to peer failed");
                SendOutcome::Failed {
                    message_id,
                    reason: e.to_string(),
                }
            });
            outcomes.push(outcome);
        }
        outcomes
    }

    fn settle(
        &self,
        envelope: Envelope,
        result: Result<RouteDecision, RoutingError>,
    ) -> Result<SendOutcome, NodeError> {
        let message_id = envelope.id;
        match result {
            Ok(decision) => {
                let transport = decision.transport;
                let peer_id = decision.destination.id.clone();
                match self.dispatcher.dispatch(decision, envelope.clone()) {
                    Ok(()) => {
                        tracing::info!(message = %message_id, %transport, peer = %peer_id, "message handed off");
                        Ok(SendOutcome::Accepted {
                            message_id,
                            transport,
                            peer_id,
                        })
                    }
                    Err(e) => {
                        tracing::warn!(message = %message_id, %transport, error = %e, "hand-off failed, holding message");
                        self.retry.hold(&envelope)?;
                        Ok(SendOutcome::Held {
                            message_id,
                            reason: e.to_string(),
                        })
                    }
                }
            }
            Err(e) => match e.disposition() {
                Disposition::Hold => {
                    self.retry.hold(&envelope)?;
                    Ok(SendOutcome::Held {
                        message_id,
                        reason: e.to_string(),
                    })
                }
                Disposition::DeadLetter => {
                    tracing::warn!(message = %message_id, reason = %e, "message dead-lettered");
                    Ok(SendOutcome::DeadLettered {
                        message_id,
                        reason: e.to_string(),
                    })
                }
            },
        }
    }

    pub fn held_count(&self) -> Result<usize, NodeError> {
        self.retry.len()
    }

    /// One retry pass over every held message.
    pub fn sweep_held(&self) -> Result<SweepReport, NodeError> {
        self.retry
            .sweep(&self.router, self.dispatcher.as_ref(), Utc::now())
    }

    // ---- peers ----

    pub fn update_local_peer(&self, transport: Transport, identity: PeerIdentity) {
        self.directory.set_local_identity(transport, identity);
    }

    pub fn add_seed(&self, identity: PeerIdentity) -> Result<(), NodeError> {
        self.directory.add_seed(identity)?;
        Ok(())
    }

    pub fn update_peer(&self, identity: PeerIdentity) -> Result<(), NodeError> {
        let id = identity.id.clone();
        self.directory.upsert_peer(identity, PeerScope::Discovered)?;
        self.persist_peer(&id);
        Ok(())
    }

    pub fn update_peers(&self, peers: Vec<PeerIdentity>) -> PeerUpdateReport {
        let mut report = PeerUpdateReport::default();
        for peer in peers {
            let label = peer.to_string();
            match self.update_peer(peer) {
                Ok(()) => report.accepted += 1,
                Err(e) => {
                    tracing::debug!(peer = %label, error = %e, "peer update rejected");
                    report.rejected.push(format!("{label}: {e}"));
                }
            }
        }
        report
    }

    pub fn peer_counts(&self) -> BTreeMap<Transport, usize> {
        self.directory.counts()
    }

    pub fn peers_by_capability(&self, name: &str) -> Vec<PeerIdentity> {
        self.directory.find_by_capability(name)
    }

    // ---- discovery ----

    /// One discovery pass over every connected transport.
    pub fn discover(&self) -> DiscoveryReport {
        self.discovery.tick(&self.router, self.dispatcher.as_ref())
    }

    pub fn handle_discovery_request(
        &self,
        request: &DiscoveryRequest,
    ) -> Result<DiscoveryReply, NodeError> {
        let reply = self.discovery.handle_request(&self.directory, request)?;
        for record in std::iter::once(&request.origin).chain(&request.peers) {
            if let Some(id) = record.get("id") {
                self.persist_peer(id);
            }
        }
        Ok(reply)
    }

    pub fn handle_discovery_reply(&self, reply: &DiscoveryReply) -> Result<usize, NodeError> {
        let learned = self
            .discovery
            .handle_reply(&self.directory, reply, Utc::now())?;
        for record in std::iter::once(&reply.responder).chain(&reply.peers) {
            if let Some(id) = record.get("id") {
                self.persist_peer(id);
            }
        }
        Ok(learned)
    }

    // ---- persistence ----

    fn persist_peer(&self, id: &str) {
        let Some(storage) = self.peer_store.as_ref() else {
            return;
        };
        let Some(peer) = self.directory.find_by_id(id) else {
            return;
        };
        let result = serde_json::to_vec(&peer)
            .map_err(|e| NodeError::Core(e.into()))
            .and_then(|bytes| storage.put_peer(&peer.id, &bytes));
        if let Err(e) = result {
            tracing::warn!(peer = %peer, error = %e, "failed to persist peer");
        }
    }

    /// Reload discovered peers saved by a previous run.
    pub fn restore_peers(&self) -> Result<usize, NodeError> {
        let Some(storage) = self.peer_store.as_ref() else {
            return Ok(0);
        };
        let mut restored = 0;
        for (key, value) in storage.entries(CF_PEERS)? {
            let peer: PeerIdentity = match serde_json::from_slice(&value) {
                Ok(peer) => peer,
                Err(e) => {
                    tracing::warn!(key = %String::from_utf8_lossy(&key), error = %e, "dropping unreadable peer record");
                    storage.delete(CF_PEERS, &key)?;
                    continue;
                }
            };
            let id = peer.id.clone();
            match self.directory.upsert_peer(peer, PeerScope::Discovered) {
                Ok(()) => restored += 1,
                Err(e) => {
                    tracing::warn!(peer = %id, error = %e, "dropping invalid stored peer");
                    storage.delete_peer(&id)?;
                }
            }
        }
        tracing::info!(restored, "peers restored from storage");
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ChannelDispatcher, Outbound};
    use crate::retry::{HoldStore, MemoryHoldStore};
    use tokio::sync::mpsc;

    fn manager() -> (NetworkManager, mpsc::Receiver<Outbound>) {
        let (dispatcher, rx) = ChannelDispatcher::channel(16);
        let manager = NetworkManager::new(
            &NetmgrConfig::default(),
            Arc::new(MemoryHoldStore::new()),
            Arc::new(dispatcher),
        );
        manager.update_local_peer(Transport::Tor, PeerIdentity::new("me", Transport::Tor, "me.onion"));
        (manager, rx)
    }

    fn bob() -> PeerIdentity {
        PeerIdentity::new("bob", Transport::Tor, "bob.onion")
    }

    #[test]
    fn test_send_accepted_when_connected() {
        let (manager, mut rx) = manager();
        manager.update_network_state(NetworkState::new(Transport::Tor, NetworkStatus::Connected));

        let outcome = manager.send(Envelope::new(b"hi".to_vec()), Some(bob())).unwrap();
        assert!(matches!(outcome, SendOutcome::Accepted { transport: Transport::Tor, .. }));
        assert_eq!(rx.try_recv().unwrap().decision.destination.id, "bob");
        assert_eq!(manager.held_count().unwrap(), 0);
    }

    #[test]
    fn test_send_held_when_disconnected() {
        let (manager, _rx) = manager();
        manager.update_network_state(NetworkState::new(Transport::Tor, NetworkStatus::Disconnected));

        let outcome = manager.send(Envelope::new(b"hi".to_vec()), Some(bob())).unwrap();
        assert!(matches!(outcome, SendOutcome::Held { .. }));
        assert_eq!(manager.held_count().unwrap(), 1);

        manager.update_network_state(NetworkState::new(Transport::Tor, NetworkStatus::Connected));
        let report = manager.sweep_held().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(manager.held_count().unwrap(), 0);
    }

    #[test]
    fn test_send_dead_lettered_without_destination() {
        let (manager, _rx) = manager();
        let outcome = manager.send(Envelope::new(Vec::new()), None).unwrap();
        assert!(matches!(outcome, SendOutcome::DeadLettered { .. }));
        assert_eq!(manager.held_count().unwrap(), 0);
    }

    #[test]
    fn test_publish_settles_each_peer() {
        let (manager, _rx) = manager();
        manager.update_network_state(NetworkState::new(Transport::Tor, NetworkStatus::Connected));
        let peers = vec![
            bob(),
            PeerIdentity::new("carol", Transport::I2p, "carol.i2p"),
            PeerIdentity::unresolved("ghost"),
        ];

        let outcomes = manager.publish(Envelope::new(b"all".to_vec()), peers);
        assert!(matches!(outcomes[0], SendOutcome::Accepted { .. }));
        assert!(matches!(outcomes[1], SendOutcome::Held { .. }));
        assert!(matches!(outcomes[2], SendOutcome::DeadLettered { .. }));
    }

    /// Hold store that rejects every write.
    struct FullHoldStore;

    impl HoldStore for FullHoldStore {
        fn put(&self, _id: &str, _record: Vec<u8>) -> Result<(), NodeError> {
            Err(NodeError::MissingColumnFamily("held".into()))
        }

        fn get(&self, _id: &str) -> Result<Option<Vec<u8>>, NodeError> {
            Ok(None)
        }

        fn remove(&self, _id: &str) -> Result<(), NodeError> {
            Ok(())
        }

        fn ids(&self) -> Result<Vec<String>, NodeError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_publish_continues_after_hold_failure() {
        let (dispatcher, mut rx) = ChannelDispatcher::channel(16);
        let manager = NetworkManager::new(
            &NetmgrConfig::default(),
            Arc::new(FullHoldStore),
            Arc::new(dispatcher),
        );
        manager.update_local_peer(Transport::Tor, PeerIdentity::new("me", Transport::Tor, "me.onion"));
        manager.update_network_state(NetworkState::new(Transport::Tor, NetworkStatus::Connected));
        let peers = vec![
            PeerIdentity::new("carol", Transport::I2p, "carol.i2p"),
            bob(),
            PeerIdentity::new("dave", Transport::I2p, "dave.i2p"),
        ];

        let outcomes = manager.publish(Envelope::new(b"all".to_vec()), peers);
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], SendOutcome::Failed { .. }));
        assert!(matches!(outcomes[1], SendOutcome::Accepted { .. }));
        assert!(matches!(outcomes[2], SendOutcome::Failed { .. }));
        assert_eq!(rx.try_recv().unwrap().decision.destination.id, "bob");
    }

    #[test]
    fn test_update_peers_reports_rejections() {
        let (manager, _rx) = manager();
        let report = manager.update_peers(vec![
            bob(),
            PeerIdentity::new("carol", Transport::I2p, "carol.i2p").with_service("relay"),
            PeerIdentity::unresolved("nobody"),
        ]);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.rejected.len(), 1);

        let counts = manager.peer_counts();
        assert_eq!(counts.get(&Transport::Tor), Some(&1));
        assert_eq!(counts.get(&Transport::I2p), Some(&1));
        assert_eq!(manager.peers_by_capability("relay")[0].id, "carol");
    }

    #[test]
    fn test_network_queries() {
        let (manager, _rx) = manager();
        manager.update_network_state(NetworkState::new(Transport::Tor, NetworkStatus::Connected));
        manager.update_network_state(NetworkState::new(Transport::I2p, NetworkStatus::Connecting));

        assert_eq!(manager.local_networks().len(), 2);
        assert_eq!(manager.active_networks(), vec![Transport::Tor]);
        assert_eq!(manager.network_status(Transport::I2p), Some(NetworkStatus::Connecting));
        assert!(!manager.is_network_connected(Transport::I2p));
        assert_eq!(manager.network_status(Transport::LiFi), None);
    }

    #[test]
    fn test_peers_survive_restart() {
        let dir = std::env::temp_dir().join(format!("netmgr-service-{}", Uuid::now_v7()));
        {
            let storage = Arc::new(Storage::open(&dir).unwrap());
            let (dispatcher, _rx) = ChannelDispatcher::channel(4);
            let manager = NetworkManager::new(
                &NetmgrConfig::default(),
                Arc::new(MemoryHoldStore::new()),
                Arc::new(dispatcher),
            )
            .with_peer_store(storage);
            manager.update_peer(bob()).unwrap();
        }

        let storage = Arc::new(Storage::open(&dir).unwrap());
        storage.put_peer("junk", b"not json").unwrap();
        let (dispatcher, _rx) = ChannelDispatcher::channel(4);
        let manager = NetworkManager::new(
            &NetmgrConfig::default(),
            Arc::new(MemoryHoldStore::new()),
            Arc::new(dispatcher),
        )
        .with_peer_store(Arc::clone(&storage));
        assert_eq!(manager.restore_peers().unwrap(), 1);
        assert_eq!(manager.directory().find_by_address("bob.onion").unwrap().id, "bob");
        assert!(storage.get_peer("junk").unwrap().is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
