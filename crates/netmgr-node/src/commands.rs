//! Commands dispatched from the HTTP API to the node event loop.

use netmgr_core::{
    DiscoveryReply, DiscoveryRequest, Envelope, NetworkState, NetworkStatus, PeerIdentity,
    Transport,
};
use tokio::sync::oneshot;

use crate::service::{PeerUpdateReport, SendOutcome};

/// A state-changing request sent from the HTTP API to the node's main event loop.
///
/// Reads go straight to the shared [`NetworkManager`](crate::service::NetworkManager);
/// every mutation is serialized through this channel.
pub enum NodeCommand {
    /// A transport driver reports its connectivity.
    UpdateNetworkState {
        state: NetworkState,
        reply: oneshot::Sender<Option<NetworkStatus>>,
    },
    /// Route and hand off one message.
    SendMessage {
        envelope: Envelope,
        destination: Option<PeerIdentity>,
        reply: oneshot::Sender<Result<SendOutcome, String>>,
    },
    /// Send a copy of one message to each peer.
    PublishMessage {
        envelope: Envelope,
        peers: Vec<PeerIdentity>,
        reply: oneshot::Sender<Result<Vec<SendOutcome>, String>>,
    },
    /// Insert or refresh discovered peers.
    UpsertPeers {
        peers: Vec<PeerIdentity>,
        reply: oneshot::Sender<PeerUpdateReport>,
    },
    /// Register a bootstrap peer.
    AddSeed {
        peer: PeerIdentity,
        reply: oneshot::Sender<Result<(), String>>,
    },
    /// Replace this node's identity on a transport.
    SetLocalPeer {
        transport: Transport,
        peer: PeerIdentity,
        reply: oneshot::Sender<()>,
    },
    /// A discovery request received by a transport driver.
    InboundDiscoveryRequest {
        request: DiscoveryRequest,
        reply: oneshot::Sender<Result<DiscoveryReply, String>>,
    },
    /// A discovery reply received by a transport driver.
    InboundDiscoveryReply {
        response: DiscoveryReply,
        reply: oneshot::Sender<Result<usize, String>>,
    },
}
