use std::sync::Arc;

use netmgr_core::{CoreError, Envelope, PeerIdentity, Transport};
use serde::Serialize;

use crate::directory::PeerDirectory;
use crate::error::RoutingError;
use crate::pathfinder::PeerPath;
use crate::registry::NetworkStateRegistry;

/// A ready-to-send routing decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDecision {
    /// This node's identity on `transport`.
    pub source: PeerIdentity,
    pub destination: PeerIdentity,
    pub transport: Transport,
    /// Driver that should carry the message.
    pub driver: &'static str,
    /// Whether the sender's explicit next hop was honored.
    pub explicit: bool,
}

/// Selects a transport and peer pair for outgoing envelopes.
///
/// `route` is a pure decision over the current registry and directory
/// state. It performs no I/O and never retries; the caller decides what to
/// do with a failure (see [`RoutingError::disposition`]).
pub struct Router {
    registry: Arc<NetworkStateRegistry>,
    directory: Arc<PeerDirectory>,
}

impl Router {
    pub fn new(registry: Arc<NetworkStateRegistry>, directory: Arc<PeerDirectory>) -> Self {
        Self {
            registry,
            directory,
        }
    }

    pub fn registry(&self) -> &NetworkStateRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    /// Decide how to deliver `envelope`.
    ///
    /// `destination` overrides the envelope's own destination when given.
    pub fn route(
        &self,
        envelope: &Envelope,
        destination: Option<&PeerIdentity>,
    ) -> Result<RouteDecision, RoutingError> {
        if let Some(decision) = self.explicit_route(envelope, destination)? {
            return Ok(decision);
        }

        let destination = destination
            .or(envelope.destination.as_ref())
            .ok_or_else(|| RoutingError::MissingDestination {
                message_id: envelope.id.to_string(),
            })?;
        if destination.id.is_empty() && !destination.has_address() {
            return Err(RoutingError::InvalidPeer(CoreError::InvalidPeer {
                reason: "destination has neither id nor address".into(),
            }));
        }

        let (peer, transport) = self.resolve_destination(destination)?;
        let source = self.local_identity(transport)?;

        Ok(RouteDecision {
            source,
            destination: peer,
            transport,
            driver: transport.driver_id(),
            explicit: false,
        })
    }

    /// Route the same envelope to every peer independently.
    ///
    /// Results are in the order of `peers`; one failure does not affect the others.
    pub fn route_all(
        &self,
        envelope: &Envelope,
        peers: &[PeerIdentity],
    ) -> Vec<Result<RouteDecision, RoutingError>> {
        peers
            .iter()
            .map(|peer| self.route(envelope, Some(peer)))
            .collect()
    }

    /// Lowest-cost relay path from this node to `to` through the relationship graph.
    pub fn relay_path(&self, to: &PeerIdentity) -> Result<PeerPath, RoutingError> {
        let transport = match to.transport {
            Some(t) => t,
            None => self
                .directory
                .find(to)
                .and_then(|p| p.transport)
                .ok_or_else(|| RoutingError::UnableToSelectTransport {
                    peer_id: to.id.clone(),
                    transport: None,
                })?,
        };
        let local = self.local_identity(transport)?;
        self.directory
            .relationships()
            .lowest_cost_path(&local.id, &to.id)
    }

    /// Step 1: an explicit next hop on a connected transport wins.
    fn explicit_route(
        &self,
        envelope: &Envelope,
        destination: Option<&PeerIdentity>,
    ) -> Result<Option<RouteDecision>, RoutingError> {
        let Some(hop) = envelope.next_hop.as_ref() else {
            return Ok(None);
        };
        let Some(transport) = hop.transport() else {
            tracing::debug!(message = %envelope.id, driver = %hop.driver, "unknown driver on explicit hop");
            return Ok(None);
        };
        if !self.registry.is_connected(transport) {
            tracing::debug!(message = %envelope.id, %transport, "explicit hop transport not connected");
            return Ok(None);
        }

        let source = match hop.origination.clone() {
            Some(origination) => origination,
            None => self.local_identity(transport)?,
        };
        let destination = hop
            .destination
            .clone()
            .or_else(|| destination.cloned())
            .or_else(|| envelope.destination.clone())
            .ok_or_else(|| RoutingError::MissingDestination {
                message_id: envelope.id.to_string(),
            })?;

        Ok(Some(RouteDecision {
            source,
            destination,
            transport,
            driver: transport.driver_id(),
            explicit: true,
        }))
    }

    /// Step 2: find a connected transport for the destination.
    fn resolve_destination(
        &self,
        destination: &PeerIdentity,
    ) -> Result<(PeerIdentity, Transport), RoutingError> {
        let resolved = match destination.transport {
            Some(transport) => {
                // Fill in a missing address from the directory when it agrees on transport.
                let peer = if destination.has_address() {
                    destination.clone()
                } else {
                    self.directory
                        .find_by_id(&destination.id)
                        .filter(|p| p.transport == Some(transport))
                        .unwrap_or_else(|| destination.clone())
                };
                Some((peer, transport))
            }
            None => self
                .directory
                .find(destination)
                .and_then(|p| p.transport.map(|t| (p, t))),
        };

        match resolved {
            Some((peer, transport)) if self.registry.is_connected(transport) => Ok((peer, transport)),
            Some((peer, transport)) => Err(RoutingError::UnableToSelectTransport {
                peer_id: peer.id,
                transport: Some(transport),
            }),
            None => Err(RoutingError::UnableToSelectTransport {
                peer_id: destination.id.clone(),
                transport: None,
            }),
        }
    }

    fn local_identity(&self, transport: Transport) -> Result<PeerIdentity, RoutingError> {
        self.directory
            .local_identity(transport)
            .ok_or(RoutingError::LocalIdentityUnavailable { transport })
    }
}
