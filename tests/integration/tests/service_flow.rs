//! Integration test: the network manager's send, retry and discovery flows.

use std::sync::Arc;

use netmgr_core::{DiscoveryRequest, Envelope, NetworkState, NetworkStatus, Transport};
use netmgr_integration_tests::{manager, manager_with_store, temp_dir, tor_peer};
use netmgr_node::dispatch::ChannelDispatcher;
use netmgr_node::retry::{MemoryHoldStore, RocksHoldStore};
use netmgr_node::storage::Storage;
use netmgr_node::{NetmgrConfig, NetworkManager, SendOutcome};

fn connect(manager: &NetworkManager, status: NetworkStatus) {
    manager.update_network_state(NetworkState::new(Transport::Tor, status));
}

// =========================================================================
// Store-and-forward
// =========================================================================

#[test]
fn test_held_message_delivered_after_reconnect() {
    let (manager, mut rx) = manager();
    connect(&manager, NetworkStatus::Disconnected);

    let envelope = Envelope::new(b"later".to_vec());
    let id = envelope.id;
    let outcome = manager.send(envelope, Some(tor_peer("bob"))).unwrap();
    assert!(matches!(outcome, SendOutcome::Held { message_id, .. } if message_id == id));
    assert!(rx.try_recv().is_err());

    // Still down: the sweep keeps it.
    assert_eq!(manager.sweep_held().unwrap().remaining, 1);

    connect(&manager, NetworkStatus::Connected);
    let report = manager.sweep_held().unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(manager.held_count().unwrap(), 0);

    let out = rx.try_recv().unwrap();
    assert_eq!(out.envelope.id, id);
    assert_eq!(out.decision.destination.id, "bob");
}

#[test]
fn test_held_messages_survive_restart() {
    let dir = temp_dir("netmgr-it-hold");
    let envelope = Envelope::new(b"durable".to_vec());
    {
        let storage = Arc::new(Storage::open(&dir).unwrap());
        let (manager, _rx) = manager_with_store(Arc::new(RocksHoldStore::new(storage)));
        connect(&manager, NetworkStatus::Disconnected);
        let outcome = manager.send(envelope.clone(), Some(tor_peer("bob"))).unwrap();
        assert!(matches!(outcome, SendOutcome::Held { .. }));
    }

    let storage = Arc::new(Storage::open(&dir).unwrap());
    let (manager, mut rx) = manager_with_store(Arc::new(RocksHoldStore::new(storage)));
    assert_eq!(manager.held_count().unwrap(), 1);

    connect(&manager, NetworkStatus::Connected);
    assert_eq!(manager.sweep_held().unwrap().delivered, 1);
    let out = rx.try_recv().unwrap();
    assert_eq!(out.envelope.id, envelope.id);
    assert_eq!(out.envelope.payload, b"durable".to_vec());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_malformed_destination_is_dead_lettered() {
    let (manager, _rx) = manager();
    connect(&manager, NetworkStatus::Connected);

    let outcome = manager
        .send(Envelope::new(Vec::new()), Some(netmgr_core::PeerIdentity::unresolved("")))
        .unwrap();
    assert!(matches!(outcome, SendOutcome::DeadLettered { .. }));
    assert_eq!(manager.held_count().unwrap(), 0);
}

// =========================================================================
// Discovery
// =========================================================================

#[test]
fn test_discovery_bootstraps_from_only_seed() {
    let (manager, mut rx) = manager();
    connect(&manager, NetworkStatus::Connected);
    manager.add_seed(tor_peer("seed")).unwrap();

    let report = manager.discover();
    assert_eq!(report.sent, vec![(Transport::Tor, "seed".to_string())]);
    assert!(report.no_seeds.is_empty());

    let out = rx.try_recv().unwrap();
    assert_eq!(out.decision.destination.id, "seed");
    assert!(DiscoveryRequest::from_payload(&out.envelope.payload).is_ok());
}

#[test]
fn test_discovery_exchange_between_two_nodes() {
    let (alice, mut alice_rx) = manager();
    connect(&alice, NetworkStatus::Connected);
    alice.add_seed(tor_peer("bob")).unwrap();

    let (dispatcher, _bob_rx) = ChannelDispatcher::channel(8);
    let bob = NetworkManager::new(
        &NetmgrConfig::default(),
        Arc::new(MemoryHoldStore::new()),
        Arc::new(dispatcher),
    );
    bob.update_local_peer(Transport::Tor, tor_peer("bob"));
    bob.update_peer(tor_peer("carol").with_service("relay")).unwrap();

    alice.discover();
    let request = DiscoveryRequest::from_payload(&alice_rx.try_recv().unwrap().envelope.payload).unwrap();

    let reply = bob.handle_discovery_request(&request).unwrap();
    assert!(bob.directory().find_by_id("local").is_some());

    let learned = alice.handle_discovery_reply(&reply).unwrap();
    assert!(learned >= 2);
    assert!(alice.directory().find_by_id("carol").is_some());
    assert_eq!(alice.peers_by_capability("relay")[0].id, "carol");
    assert!(alice
        .directory()
        .relationships()
        .is_related("local", Transport::Tor, "bob"));

    // With peers known, the next tick gossips instead of bootstrapping.
    let report = alice.discover();
    assert_eq!(report.sent.len(), 1);
    assert_ne!(report.sent[0].1, "local");
}

#[test]
fn test_discovery_without_seeds_is_reported() {
    let (manager, _rx) = manager();
    connect(&manager, NetworkStatus::Connected);
    let report = manager.discover();
    assert_eq!(report.no_seeds, vec![Transport::Tor]);
}
