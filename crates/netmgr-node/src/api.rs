//! HTTP API server for the netmgr node.
//!
//! Transport drivers report connectivity and inbound discovery traffic here;
//! applications submit messages and query network and peer state.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use netmgr_core::{
    DiscoveryReply, DiscoveryRequest, Envelope, ExternalHop, NetworkState, NetworkStatus,
    PeerIdentity, Transport,
};
use netmgr_routing::PeerPath;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::commands::NodeCommand;
use crate::dispatch::Outbound;
use crate::service::{PeerUpdateReport, SendOutcome};
use crate::state::NodeState;

// --- Request / response types ---

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_secs: u64,
    pub active_networks: Vec<Transport>,
    pub peer_count: usize,
    pub held_messages: usize,
    pub handed_off: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NetworkStatusResponse {
    pub transport: Transport,
    pub status: NetworkStatus,
    pub connected: bool,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NetworkStateRequest {
    pub transport: Transport,
    pub status: NetworkStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NetworkStateResponse {
    pub transport: Transport,
    pub status: NetworkStatus,
    pub previous: Option<NetworkStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LocalPeerRequest {
    pub transport: Transport,
    pub peer: PeerIdentity,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageRequest {
    /// UTF-8 payload; opaque to the node.
    pub payload: String,
    #[serde(default)]
    pub destination: Option<PeerIdentity>,
    /// When non-empty the message is published to each of these peers.
    #[serde(default)]
    pub peers: Vec<PeerIdentity>,
    /// Driver id of an explicit next hop.
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub ttl_secs: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub outcomes: Vec<SendOutcome>,
}

/// A routed message as delivered to its transport driver.
#[derive(Debug, Serialize, Deserialize)]
pub struct DriverMessage {
    pub transport: Transport,
    pub source: PeerIdentity,
    pub destination: PeerIdentity,
    pub explicit: bool,
    pub envelope: Envelope,
}

impl From<Outbound> for DriverMessage {
    fn from(out: Outbound) -> Self {
        Self {
            transport: out.decision.transport,
            source: out.decision.source,
            destination: out.decision.destination,
            explicit: out.decision.explicit,
            envelope: out.envelope,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TakeOutboundParams {
    #[serde(default = "default_take")]
    pub max: usize,
}

fn default_take() -> usize {
    64
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiscoveryReplyResponse {
    pub learned: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// Send a command to the event loop and wait for its reply.
async fn submit<T>(
    state: &NodeState,
    command: impl FnOnce(oneshot::Sender<T>) -> NodeCommand,
) -> Result<T, ApiError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    state.command_tx.send(command(reply_tx)).await.map_err(|_| {
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "node event loop not running")
    })?;
    reply_rx.await.map_err(|_| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "event loop dropped the reply channel",
        )
    })
}

fn parse_transport(name: &str) -> Result<Transport, ApiError> {
    Transport::from_str(name).map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))
}

// --- Handlers ---

async fn handle_status(
    State(state): State<Arc<NodeState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let held_messages = state
        .manager
        .held_count()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_networks: state.manager.active_networks(),
        peer_count: state.manager.directory().len(),
        held_messages,
        handed_off: state.handed_off(),
    }))
}

async fn handle_networks(State(state): State<Arc<NodeState>>) -> Json<Vec<NetworkState>> {
    Json(state.manager.local_networks())
}

async fn handle_active_networks(State(state): State<Arc<NodeState>>) -> Json<Vec<Transport>> {
    Json(state.manager.active_networks())
}

async fn handle_network_status(
    State(state): State<Arc<NodeState>>,
    Path(name): Path<String>,
) -> Result<Json<NetworkStatusResponse>, ApiError> {
    let transport = parse_transport(&name)?;
    let status = state.manager.network_status(transport).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            format!("no state reported for {transport}"),
        )
    })?;
    Ok(Json(NetworkStatusResponse {
        transport,
        status,
        connected: status.is_connected(),
        description: status.describe().to_string(),
    }))
}

async fn handle_update_network_state(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<NetworkStateRequest>,
) -> Result<Json<NetworkStateResponse>, ApiError> {
    let report = NetworkState {
        transport: req.transport,
        status: req.status,
        reported_at: Utc::now(),
    };
    let previous = submit(&state, |reply| NodeCommand::UpdateNetworkState {
        state: report,
        reply,
    })
    .await?;
    Ok(Json(NetworkStateResponse {
        transport: req.transport,
        status: req.status,
        previous,
    }))
}

async fn handle_peer_counts(
    State(state): State<Arc<NodeState>>,
) -> Json<BTreeMap<Transport, usize>> {
    Json(state.manager.peer_counts())
}

async fn handle_peers_by_capability(
    State(state): State<Arc<NodeState>>,
    Path(name): Path<String>,
) -> Json<Vec<PeerIdentity>> {
    Json(state.manager.peers_by_capability(&name))
}

async fn handle_relay_path(
    State(state): State<Arc<NodeState>>,
    Path(peer_id): Path<String>,
) -> Result<Json<PeerPath>, ApiError> {
    let target = state
        .manager
        .directory()
        .find_by_id(&peer_id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown peer {peer_id}")))?;
    state
        .manager
        .router()
        .relay_path(&target)
        .map(Json)
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e.to_string()))
}

async fn handle_upsert_peers(
    State(state): State<Arc<NodeState>>,
    Json(peers): Json<Vec<PeerIdentity>>,
) -> Result<Json<PeerUpdateReport>, ApiError> {
    let report = submit(&state, |reply| NodeCommand::UpsertPeers { peers, reply }).await?;
    Ok(Json(report))
}

async fn handle_add_seed(
    State(state): State<Arc<NodeState>>,
    Json(peer): Json<PeerIdentity>,
) -> Result<StatusCode, ApiError> {
    submit(&state, |reply| NodeCommand::AddSeed { peer, reply })
        .await?
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    Ok(StatusCode::CREATED)
}

async fn handle_set_local_peer(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<LocalPeerRequest>,
) -> Result<StatusCode, ApiError> {
    submit(&state, |reply| NodeCommand::SetLocalPeer {
        transport: req.transport,
        peer: req.peer,
        reply,
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_send_message(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let mut envelope = Envelope::new(req.payload.into_bytes());
    if let Some(driver) = req.driver {
        envelope = envelope.with_next_hop(ExternalHop::to_driver(driver));
    }
    if let Some(ttl) = req.ttl_secs {
        let expires_at = chrono::TimeDelta::try_seconds(ttl)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, format!("ttl_secs {ttl} is out of range")))?;
        envelope = envelope.with_expiry(expires_at);
    }

    let result = if req.peers.is_empty() {
        let destination = req.destination;
        submit(&state, |reply| NodeCommand::SendMessage {
            envelope,
            destination,
            reply,
        })
        .await?
        .map(|outcome| vec![outcome])
    } else {
        let peers = req.peers;
        submit(&state, |reply| NodeCommand::PublishMessage {
            envelope,
            peers,
            reply,
        })
        .await?
    };
    let outcomes = result.map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok(Json(SendMessageResponse { outcomes }))
}

/// Hand queued messages to the driver that polls for them.
async fn handle_take_outbound(
    State(state): State<Arc<NodeState>>,
    Path(driver): Path<String>,
    Query(params): Query<TakeOutboundParams>,
) -> Json<Vec<DriverMessage>> {
    let messages = state
        .outbox
        .take(&driver, params.max)
        .into_iter()
        .map(DriverMessage::from)
        .collect();
    Json(messages)
}

async fn handle_discovery_request(
    State(state): State<Arc<NodeState>>,
    Json(request): Json<DiscoveryRequest>,
) -> Result<Json<DiscoveryReply>, ApiError> {
    submit(&state, |reply| NodeCommand::InboundDiscoveryRequest { request, reply })
        .await?
        .map(Json)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))
}

async fn handle_discovery_reply(
    State(state): State<Arc<NodeState>>,
    Json(response): Json<DiscoveryReply>,
) -> Result<Json<DiscoveryReplyResponse>, ApiError> {
    let learned = submit(&state, |reply| NodeCommand::InboundDiscoveryReply { response, reply })
        .await?
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    Ok(Json(DiscoveryReplyResponse { learned }))
}

// --- Server ---

pub fn build_router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/api/v1/status", get(handle_status))
        .route("/api/v1/networks", get(handle_networks))
        .route("/api/v1/networks/active", get(handle_active_networks))
        .route("/api/v1/networks/state", post(handle_update_network_state))
        .route("/api/v1/networks/{transport}", get(handle_network_status))
        .route("/api/v1/peers", post(handle_upsert_peers))
        .route("/api/v1/peers/count", get(handle_peer_counts))
        .route("/api/v1/peers/seed", post(handle_add_seed))
        .route("/api/v1/peers/local", post(handle_set_local_peer))
        .route("/api/v1/peers/capability/{name}", get(handle_peers_by_capability))
        .route("/api/v1/paths/{peer_id}", get(handle_relay_path))
        .route("/api/v1/messages", post(handle_send_message))
        .route("/api/v1/drivers/{driver}/outbound", post(handle_take_outbound))
        .route("/api/v1/discovery/request", post(handle_discovery_request))
        .route("/api/v1/discovery/reply", post(handle_discovery_reply))
        .with_state(state)
}

/// Serve the API on an already bound listener until the process exits.
pub async fn start_api_server(listener: TcpListener, state: Arc<NodeState>) -> anyhow::Result<()> {
    let app = build_router(state);
    let listen_addr = listener.local_addr()?;
    tracing::info!(%listen_addr, "HTTP API server started");
    axum::serve(listener, app).await?;
    Ok(())
}
