//! Integration test: a running node driven over its HTTP API.

use std::collections::BTreeMap;

use netmgr_core::{NetworkStatus, Transport};
use netmgr_integration_tests::{local_tor, temp_dir, tor_peer};
use netmgr_node::api::{
    DriverMessage, LocalPeerRequest, NetworkStateRequest, NetworkStateResponse, NetworkStatusResponse,
    SendMessageRequest, SendMessageResponse, StatusResponse,
};
use netmgr_node::{NetmgrConfig, NetmgrNode, PeerUpdateReport, SendOutcome};
use reqwest::StatusCode;

/// Start a node on an ephemeral port and run its event loop in the background.
async fn spawn_node() -> (String, std::path::PathBuf) {
    let data_dir = temp_dir("netmgr-it-api");
    let mut config = NetmgrConfig::default();
    config.api.port = 0;
    config.storage.data_dir = data_dir.clone();

    let mut node = NetmgrNode::new(config).unwrap();
    node.start().await.unwrap();
    let addr = node.api_addr().unwrap();
    tokio::spawn(async move {
        let _ = node.run().await;
    });
    (format!("http://{addr}/api/v1"), data_dir)
}

#[tokio::test]
async fn test_report_state_and_send_over_http() {
    let (base, data_dir) = spawn_node().await;
    let client = reqwest::Client::new();

    let resp: NetworkStateResponse = client
        .post(format!("{base}/networks/state"))
        .json(&NetworkStateRequest {
            transport: Transport::Tor,
            status: NetworkStatus::Connected,
        })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp.previous, None);

    let status = client
        .post(format!("{base}/peers/local"))
        .json(&LocalPeerRequest {
            transport: Transport::Tor,
            peer: local_tor(),
        })
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let report: PeerUpdateReport = client
        .post(format!("{base}/peers"))
        .json(&vec![tor_peer("bob")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report.accepted, 1);

    let counts: BTreeMap<Transport, usize> = client
        .get(format!("{base}/peers/count"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(counts.get(&Transport::Tor), Some(&1));

    let sent: SendMessageResponse = client
        .post(format!("{base}/messages"))
        .json(&SendMessageRequest {
            payload: "hello".into(),
            destination: Some(netmgr_core::PeerIdentity::unresolved("bob")),
            peers: Vec::new(),
            driver: None,
            ttl_secs: None,
        })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(matches!(
        sent.outcomes.as_slice(),
        [SendOutcome::Accepted { transport: Transport::Tor, .. }]
    ));

    let status: StatusResponse = client
        .get(format!("{base}/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status.active_networks, vec![Transport::Tor]);
    assert_eq!(status.handed_off, 1);

    // The Tor driver pulls its queued message; a second pull finds nothing.
    let taken: Vec<DriverMessage> = client
        .post(format!("{base}/drivers/netmgr.driver.tor/outbound"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(taken.len(), 1);
    assert_eq!(taken[0].destination.id, "bob");
    assert_eq!(taken[0].source.id, "local");
    assert_eq!(taken[0].envelope.payload, b"hello".to_vec());

    let again: Vec<DriverMessage> = client
        .post(format!("{base}/drivers/netmgr.driver.tor/outbound?max=10"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(again.is_empty());

    std::fs::remove_dir_all(&data_dir).ok();
}

#[tokio::test]
async fn test_network_queries_over_http() {
    let (base, data_dir) = spawn_node().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/networks/state"))
        .json(&NetworkStateRequest {
            transport: Transport::Bluetooth,
            status: NetworkStatus::Connecting,
        })
        .send()
        .await
        .unwrap();

    let resp: NetworkStatusResponse = client
        .get(format!("{base}/networks/bluetooth"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp.status, NetworkStatus::Connecting);
    assert!(!resp.connected);

    let unknown = client.get(format!("{base}/networks/smoke-signal")).send().await.unwrap();
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    let unreported = client.get(format!("{base}/networks/i2p")).send().await.unwrap();
    assert_eq!(unreported.status(), StatusCode::NOT_FOUND);

    let active: Vec<Transport> = client
        .get(format!("{base}/networks/active"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(active.is_empty());

    std::fs::remove_dir_all(&data_dir).ok();
}

#[tokio::test]
async fn test_invalid_seed_is_rejected() {
    let (base, data_dir) = spawn_node().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/peers/seed"))
        .json(&netmgr_core::PeerIdentity::unresolved("no-transport"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let ok = client
        .post(format!("{base}/peers/seed"))
        .json(&tor_peer("seed"))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::CREATED);

    std::fs::remove_dir_all(&data_dir).ok();
}

#[tokio::test]
async fn test_out_of_range_ttl_is_rejected() {
    let (base, data_dir) = spawn_node().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/messages"))
        .json(&SendMessageRequest {
            payload: "late".into(),
            destination: Some(tor_peer("bob")),
            peers: Vec::new(),
            driver: None,
            ttl_secs: Some(i64::MAX),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // The server is still serving after the bad request.
    let status = client.get(format!("{base}/status")).send().await.unwrap();
    assert_eq!(status.status(), StatusCode::OK);

    std::fs::remove_dir_all(&data_dir).ok();
}
