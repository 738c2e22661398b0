//! Fixtures shared by the cross-crate scenario tests.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use netmgr_core::{PeerIdentity, Transport};
use netmgr_node::dispatch::{ChannelDispatcher, Outbound};
use netmgr_node::retry::{HoldStore, MemoryHoldStore};
use netmgr_node::{NetmgrConfig, NetworkManager};
use netmgr_routing::RelationshipGraph;
use tokio::sync::mpsc;

/// The local node's Tor identity in every fixture.
pub fn local_tor() -> PeerIdentity {
    PeerIdentity::new("local", Transport::Tor, "local.onion")
}

pub fn tor_peer(id: &str) -> PeerIdentity {
    PeerIdentity::new(id, Transport::Tor, format!("{id}.onion"))
}

/// A manager with an in-memory hold store and a Tor identity.
pub fn manager() -> (NetworkManager, mpsc::Receiver<Outbound>) {
    manager_with_store(Arc::new(MemoryHoldStore::new()))
}

pub fn manager_with_store(store: Arc<dyn HoldStore>) -> (NetworkManager, mpsc::Receiver<Outbound>) {
    let (dispatcher, rx) = ChannelDispatcher::channel(64);
    let manager = NetworkManager::new(&NetmgrConfig::default(), store, Arc::new(dispatcher));
    manager.update_local_peer(Transport::Tor, local_tor());
    (manager, rx)
}

/// Record `count` acknowledgments of `rtt_ms` each on one edge.
pub fn ack_many(graph: &RelationshipGraph, from: &str, to: &str, rtt_ms: i64, count: usize) {
    let sent = Utc::now();
    for _ in 0..count {
        graph.record_acknowledgment(from, Transport::Tor, to, sent, sent + Duration::milliseconds(rtt_ms));
    }
}

/// A fresh directory under the system temp dir.
pub fn temp_dir(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{prefix}-{}", uuid::Uuid::now_v7()))
}
