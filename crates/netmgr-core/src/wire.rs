//! Discovery wire contract.
//!
//! Peer descriptors travel as ordered key/value records so that drivers
//! with no knowledge of the data model can relay them unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::peer::PeerIdentity;
use crate::types::Transport;

const KEY_ID: &str = "id";
const KEY_TRANSPORT: &str = "transport";
const KEY_ADDRESS: &str = "address";
const KEY_PUBLIC_KEY: &str = "public_key";
const KEY_PORT: &str = "port";
const KEY_SERVICE: &str = "service";
const ATTRIBUTE_PREFIX: &str = "attr.";

/// A peer descriptor as an ordered sequence of key/value pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerRecord(pub Vec<(String, String)>);

impl PeerRecord {
    fn push(&mut self, key: &str, value: impl Into<String>) {
        self.0.push((key.to_string(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Rebuild the identity carried by this record.
    pub fn to_identity(&self) -> Result<PeerIdentity, CoreError> {
        let id = self
            .get(KEY_ID)
            .ok_or_else(|| CoreError::MalformedRecord("missing id".into()))?;
        let mut peer = PeerIdentity::unresolved(id);
        for (key, value) in &self.0 {
            match key.as_str() {
                KEY_ID => {}
                KEY_TRANSPORT => peer.transport = Some(value.parse()?),
                KEY_ADDRESS => peer.address = value.clone(),
                KEY_PUBLIC_KEY => peer.public_key = Some(value.clone()),
                KEY_PORT => {
                    let port = value
                        .parse()
                        .map_err(|_| CoreError::MalformedRecord(format!("bad port: {value}")))?;
                    peer.port = Some(port);
                }
                KEY_SERVICE => {
                    peer.services.insert(value.clone());
                }
                other => match other.strip_prefix(ATTRIBUTE_PREFIX) {
                    Some(attr) => {
                        peer.attributes.insert(attr.to_string(), value.clone());
                    }
                    None => tracing::debug!(key = other, "ignoring unknown peer record key"),
                },
            }
        }
        Ok(peer)
    }
}

impl From<&PeerIdentity> for PeerRecord {
    fn from(peer: &PeerIdentity) -> Self {
        let mut record = PeerRecord(Vec::new());
        record.push(KEY_ID, peer.id.as_str());
        if let Some(transport) = peer.transport {
            record.push(KEY_TRANSPORT, transport.name());
        }
        record.push(KEY_ADDRESS, peer.address.as_str());
        if let Some(ref key) = peer.public_key {
            record.push(KEY_PUBLIC_KEY, key.as_str());
        }
        if let Some(port) = peer.port {
            record.push(KEY_PORT, port.to_string());
        }
        for service in &peer.services {
            record.push(KEY_SERVICE, service.as_str());
        }
        for (key, value) in &peer.attributes {
            record.push(&format!("{ATTRIBUTE_PREFIX}{key}"), value.as_str());
        }
        record
    }
}

/// Sent to a seed or known peer to exchange peer lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    pub request_id: Uuid,
    pub transport: Transport,
    /// The local identity of the requesting node on `transport`.
    pub origin: PeerRecord,
    /// A sample of peers the requester already knows.
    pub peers: Vec<PeerRecord>,
    pub sent_at: DateTime<Utc>,
}

impl DiscoveryRequest {
    pub fn new(transport: Transport, origin: &PeerIdentity, peers: &[PeerIdentity]) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            transport,
            origin: origin.into(),
            peers: peers.iter().map(PeerRecord::from).collect(),
            sent_at: Utc::now(),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_payload(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// The responder's answer to a [`DiscoveryRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReply {
    pub request_id: Uuid,
    pub transport: Transport,
    pub responder: PeerRecord,
    pub peers: Vec<PeerRecord>,
    /// Echo of the request's `sent_at`, used for round-trip measurement.
    pub request_sent_at: DateTime<Utc>,
    pub replied_at: DateTime<Utc>,
}

impl DiscoveryReply {
    /// Build a reply to `request` from `responder`, sharing `peers`.
    pub fn answer(request: &DiscoveryRequest, responder: &PeerIdentity, peers: &[PeerIdentity]) -> Self {
        Self {
            request_id: request.request_id,
            transport: request.transport,
            responder: responder.into(),
            peers: peers.iter().map(PeerRecord::from).collect(),
            request_sent_at: request.sent_at,
            replied_at: Utc::now(),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_payload(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
