//! Integration test: directory, registry, relationship graph and router
//! working together.

use std::sync::Arc;

use chrono::{Duration, Utc};
use netmgr_core::{Envelope, NetworkStatus, PeerIdentity, PeerScope, Transport};
use netmgr_integration_tests::{ack_many, local_tor, tor_peer};
use netmgr_routing::{
    Disposition, NetworkStateRegistry, PeerDirectory, RelationshipGraph, Reliability, Router,
    RoutingError,
};

fn router() -> (Arc<NetworkStateRegistry>, Arc<PeerDirectory>, Router) {
    let registry = Arc::new(NetworkStateRegistry::new());
    let directory = Arc::new(PeerDirectory::default());
    directory.set_local_identity(Transport::Tor, local_tor());
    let router = Router::new(Arc::clone(&registry), Arc::clone(&directory));
    (registry, directory, router)
}

// =========================================================================
// Directory and registry
// =========================================================================

#[test]
fn test_latest_upsert_wins_for_id_and_address() {
    let directory = PeerDirectory::default();
    for round in 0..5u16 {
        let peer = tor_peer("alice").with_port(9000 + round);
        directory.upsert_peer(peer, PeerScope::Discovered).unwrap();
        assert_eq!(directory.find_by_id("alice").unwrap().port, Some(9000 + round));
        assert_eq!(directory.find_by_address("alice.onion").unwrap().port, Some(9000 + round));
    }

    let moved = PeerIdentity::new("alice", Transport::Tor, "alice-new.onion");
    directory.upsert_peer(moved, PeerScope::Discovered).unwrap();
    assert!(directory.find_by_address("alice.onion").is_none());
    assert_eq!(directory.find_by_address("alice-new.onion").unwrap().id, "alice");
    assert_eq!(directory.count_by_transport(Transport::Tor), 1);
}

#[test]
fn test_registry_reads_its_own_writes() {
    let registry = NetworkStateRegistry::new();
    for transport in Transport::ALL {
        for status in [NetworkStatus::Connecting, NetworkStatus::Connected, NetworkStatus::Blocked] {
            registry.update(transport, status);
            assert_eq!(registry.get(transport), Some(status));
        }
    }
}

#[test]
fn test_sample_to_share_is_bounded() {
    let directory = PeerDirectory::default();
    for i in 0..3 {
        directory
            .upsert_peer(tor_peer(&format!("p{i}")), PeerScope::Discovered)
            .unwrap();
    }
    let small = directory.sample_to_share(Transport::Tor, 8);
    assert!(!small.is_empty() && small.len() <= 3);

    for i in 3..40 {
        directory
            .upsert_peer(tor_peer(&format!("p{i}")), PeerScope::Discovered)
            .unwrap();
    }
    assert!(directory.sample_to_share(Transport::Tor, 8).len() <= 8);
    assert!(directory.sample_to_share(Transport::I2p, 8).is_empty());
}

// =========================================================================
// Relationship graph
// =========================================================================

#[test]
fn test_negative_round_trip_is_ignored() {
    let graph = RelationshipGraph::with_defaults();
    ack_many(&graph, "a", "b", 100, 3);
    let now = Utc::now();
    assert!(!graph.record_acknowledgment("a", Transport::Tor, "b", now, now - Duration::seconds(1)));
    assert_eq!(graph.relationship("a", Transport::Tor, "b").unwrap().sample_count(), 3);
}

#[test]
fn test_window_keeps_most_recent_samples() {
    let graph = RelationshipGraph::with_defaults();
    ack_many(&graph, "a", "b", 9000, 10);
    ack_many(&graph, "a", "b", 200, 50);

    let rel = graph.relationship("a", Transport::Tor, "b").unwrap();
    assert_eq!(rel.sample_count(), 50);
    assert_eq!(rel.total_acks(), 60);
    assert_eq!(rel.mean_ms(), Some(200.0));
    assert_eq!(rel.median_ms(), Some(200.0));
}

#[test]
fn test_reliability_classes() {
    let graph = RelationshipGraph::with_defaults();
    ack_many(&graph, "a", "super", 1000, 1001);
    ack_many(&graph, "a", "slow", 5000, 150);
    ack_many(&graph, "a", "fast", 20, 3);

    assert_eq!(graph.classify("a", Transport::Tor, "super"), Reliability::SuperReliable);
    assert_eq!(graph.classify("a", Transport::Tor, "slow"), Reliability::Reliable);
    assert_eq!(graph.classify("a", Transport::Tor, "fast"), Reliability::RealTime);
    assert_eq!(graph.classify("a", Transport::Tor, "nobody"), Reliability::NotReliable);
}

#[test]
fn test_lowest_cost_path_prefers_cheaper_relay() {
    let graph = RelationshipGraph::with_defaults();
    ack_many(&graph, "A", "B", 10, 1);
    ack_many(&graph, "A", "C", 3, 1);
    ack_many(&graph, "C", "B", 3, 1);

    let path = graph.lowest_cost_path("A", "B").unwrap();
    assert_eq!(path.peers, vec!["A", "C", "B"]);
    assert_eq!(path.cost, 6.0);

    let hops = graph.shortest_hop_path("A", "B", 15).unwrap();
    assert_eq!(hops, vec!["A", "B"]);
}

#[test]
fn test_relay_path_through_router() {
    let (_registry, directory, router) = router();
    let graph = directory.relationships();
    ack_many(graph, "local", "relay", 40, 5);
    ack_many(graph, "relay", "far", 40, 5);

    let path = router.relay_path(&tor_peer("far")).unwrap();
    assert_eq!(path.next_hop(), Some("relay"));
    assert!(matches!(
        router.relay_path(&tor_peer("island")),
        Err(RoutingError::PathNotFound { .. })
    ));
}

// =========================================================================
// Router
// =========================================================================

#[test]
fn test_route_follows_transport_state() {
    let (registry, _directory, router) = router();
    let envelope = Envelope::new(b"ping".to_vec()).with_destination(tor_peer("bob"));

    registry.update(Transport::Tor, NetworkStatus::Connected);
    let decision = router.route(&envelope, None).unwrap();
    assert_eq!(decision.source.id, "local");
    assert_eq!(decision.destination.id, "bob");
    assert_eq!(decision.transport, Transport::Tor);

    registry.update(Transport::Tor, NetworkStatus::Disconnected);
    let err = router.route(&envelope, None).unwrap_err();
    assert!(matches!(err, RoutingError::UnableToSelectTransport { .. }));
    assert_eq!(err.disposition(), Disposition::Hold);
}

#[test]
fn test_route_resolves_unresolved_destination_from_directory() {
    let (registry, directory, router) = router();
    registry.update(Transport::Tor, NetworkStatus::Connected);
    directory.upsert_peer(tor_peer("carol"), PeerScope::Discovered).unwrap();

    let envelope = Envelope::new(Vec::new());
    let decision = router
        .route(&envelope, Some(&PeerIdentity::unresolved("carol")))
        .unwrap();
    assert_eq!(decision.destination.address, "carol.onion");

    let err = router
        .route(&envelope, Some(&PeerIdentity::unresolved("stranger")))
        .unwrap_err();
    assert_eq!(err.disposition(), Disposition::DeadLetter);
}
