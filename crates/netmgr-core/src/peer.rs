use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::CoreError;
use crate::types::Transport;

/// How a peer entered the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerScope {
    /// Administratively configured bootstrap entry point.
    Seed,
    /// Learned from a transport driver or a discovery reply.
    Discovered,
}

impl fmt::Display for PeerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seed => f.write_str("seed"),
            Self::Discovered => f.write_str("discovered"),
        }
    }
}

/// A peer's presence on one transport.
///
/// The `id` is an opaque, already-verified identifier. The `address` is
/// derived from the peer's public key and may be empty until the transport
/// driver learns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIdentity {
    pub id: String,
    #[serde(default)]
    pub transport: Option<Transport>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Service capabilities advertised by the peer.
    #[serde(default)]
    pub services: BTreeSet<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl PeerIdentity {
    pub fn new(id: impl Into<String>, transport: Transport, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            transport: Some(transport),
            address: address.into(),
            public_key: None,
            port: None,
            services: BTreeSet::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// A peer known only by id, transport still to be resolved.
    pub fn unresolved(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            transport: None,
            address: String::new(),
            public_key: None,
            port: None,
            services: BTreeSet::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_public_key(mut self, public_key: impl Into<String>) -> Self {
        self.public_key = Some(public_key.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.services.insert(service.into());
        self
    }

    pub fn has_address(&self) -> bool {
        !self.address.is_empty()
    }

    /// Check the fields required for the given scope and return the peer's transport.
    ///
    /// Every entry needs an id and a transport; discovered entries also need
    /// an address so they can be indexed by it.
    pub fn validate(&self, scope: PeerScope) -> Result<Transport, CoreError> {
        if self.id.is_empty() {
            return Err(CoreError::invalid_peer("id is empty"));
        }
        let transport = self
            .transport
            .ok_or_else(|| CoreError::invalid_peer(format!("peer {} has no transport", self.id)))?;
        if scope == PeerScope::Discovered && !self.has_address() {
            return Err(CoreError::invalid_peer(format!(
                "peer {} has no address",
                self.id
            )));
        }
        Ok(transport)
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transport {
            Some(t) => write!(f, "{}@{}", self.id, t),
            None => write!(f, "{}@?", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_discovered_peer() {
        let peer = PeerIdentity::new("alice", Transport::Tor, "alice.onion");
        assert_eq!(peer.validate(PeerScope::Discovered).unwrap(), Transport::Tor);
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let peer = PeerIdentity::new("", Transport::Tor, "x.onion");
        assert!(matches!(
            peer.validate(PeerScope::Discovered),
            Err(CoreError::InvalidPeer { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_missing_transport() {
        let peer = PeerIdentity::unresolved("bob");
        assert!(peer.validate(PeerScope::Seed).is_err());
    }

    #[test]
    fn test_seed_may_omit_address() {
        let seed = PeerIdentity::new("seed-1", Transport::I2p, "");
        assert!(seed.validate(PeerScope::Seed).is_ok());
        assert!(seed.validate(PeerScope::Discovered).is_err());
    }

    #[test]
    fn test_display() {
        let peer = PeerIdentity::new("carol", Transport::Bluetooth, "00:11");
        assert_eq!(peer.to_string(), "carol@Bluetooth");
        assert_eq!(PeerIdentity::unresolved("dave").to_string(), "dave@?");
    }
}
