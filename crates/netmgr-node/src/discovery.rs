//! Periodic peer discovery: bootstrap from seeds, then gossip peer lists.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use netmgr_core::{
    DiscoveryReply, DiscoveryRequest, Envelope, PeerIdentity, PeerRecord, PeerScope, Transport,
};
use netmgr_routing::{PeerDirectory, Router, RoutingError};
use serde::Serialize;
use uuid::Uuid;

use crate::dispatch::TransportDispatcher;
use crate::error::NodeError;

/// A discovery request awaiting its reply.
#[derive(Debug, Clone)]
struct PendingRequest {
    transport: Transport,
    target: String,
    sent_at: DateTime<Utc>,
}

/// Outcome of one [`DiscoveryScheduler::tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    /// `(transport, target peer id)` for every request handed off.
    pub sent: Vec<(Transport, String)>,
    /// Transports with neither peers nor seeds.
    pub no_seeds: Vec<Transport>,
    pub failed: usize,
    /// Unanswered requests forgotten this tick.
    pub expired: usize,
}

const DEFAULT_REQUEST_TIMEOUT_SECS: i64 = 120;

/// Drives bootstrap and gossip traffic for every connected transport.
pub struct DiscoveryScheduler {
    peers_to_share: usize,
    request_timeout: TimeDelta,
    pending: DashMap<Uuid, PendingRequest>,
}

impl DiscoveryScheduler {
    pub fn new(peers_to_share: usize) -> Self {
        Self {
            peers_to_share,
            request_timeout: TimeDelta::seconds(DEFAULT_REQUEST_TIMEOUT_SECS),
            pending: DashMap::new(),
        }
    }

    /// Forget requests left unanswered for longer than `timeout`.
    pub fn with_request_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.request_timeout = TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX);
        self
    }

    /// Send one discovery request per connected transport.
    ///
    /// With no discovered peers on a transport a random seed is the target,
    /// otherwise a random known peer.
    pub fn tick(&self, router: &Router, dispatcher: &dyn TransportDispatcher) -> DiscoveryReport {
        let mut report = DiscoveryReport {
            expired: self.expire_pending(Utc::now()),
            ..DiscoveryReport::default()
        };
        let directory = router.directory();

        for transport in router.registry().connected() {
            let target = if directory.count_by_transport(transport) == 0 {
                match directory.random_seed(transport) {
                    Some(seed) => seed,
                    None => {
                        let err = NodeError::NoSeedsAvailable { transport };
                        tracing::warn!(%transport, "discovery halted: {}", err);
                        report.no_seeds.push(transport);
                        continue;
                    }
                }
            } else {
                match directory.random_peer(transport) {
                    Some(peer) => peer,
                    None => continue,
                }
            };

            match self.send_request(router, dispatcher, transport, target) {
                Ok(target_id) => report.sent.push((transport, target_id)),
                Err(e) => {
                    tracing::debug!(%transport, error = %e, "discovery request not sent");
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(?report, "discovery tick finished");
        report
    }

    fn send_request(
        &self,
        router: &Router,
        dispatcher: &dyn TransportDispatcher,
        transport: Transport,
        target: PeerIdentity,
    ) -> Result<String, NodeError> {
        let directory = router.directory();
        let local = directory
            .local_identity(transport)
            .ok_or(RoutingError::LocalIdentityUnavailable { transport })?;
        let sample = directory.sample_to_share(transport, self.peers_to_share);
        let request = DiscoveryRequest::new(transport, &local, &sample);

        let envelope = Envelope::new(request.to_payload()?).with_destination(target);
        let decision = router.route(&envelope, None)?;
        let target_id = decision.destination.id.clone();
        dispatcher.dispatch(decision, envelope)?;

        self.pending.insert(
            request.request_id,
            PendingRequest {
                transport,
                target: target_id.clone(),
                sent_at: request.sent_at,
            },
        );
        tracing::debug!(%transport, target = %target_id, shared = sample.len(), "discovery request sent");
        Ok(target_id)
    }

    /// Answer an inbound discovery request, learning the requester and its peers.
    pub fn handle_request(
        &self,
        directory: &PeerDirectory,
        request: &DiscoveryRequest,
    ) -> Result<DiscoveryReply, NodeError> {
        let transport = request.transport;
        let local = directory
            .local_identity(transport)
            .ok_or(RoutingError::LocalIdentityUnavailable { transport })?;

        let learned = learn(directory, transport, &local, std::iter::once(&request.origin).chain(&request.peers));
        tracing::debug!(%transport, learned, "discovery request handled");

        let sample = directory.sample_to_share(transport, self.peers_to_share);
        Ok(DiscoveryReply::answer(request, &local, &sample))
    }

    /// Merge a discovery reply into the directory and record the round trip.
    ///
    /// Returns the number of peers upserted.
    pub fn handle_reply(
        &self,
        directory: &PeerDirectory,
        reply: &DiscoveryReply,
        received_at: DateTime<Utc>,
    ) -> Result<usize, NodeError> {
        let transport = reply.transport;
        let local = directory
            .local_identity(transport)
            .ok_or(RoutingError::LocalIdentityUnavailable { transport })?;

        let learned = learn(
            directory,
            transport,
            &local,
            std::iter::once(&reply.responder).chain(&reply.peers),
        );

        let responder = reply.responder.to_identity()?;
        match self.pending.remove(&reply.request_id) {
            Some((_, pending)) => {
                if pending.target != responder.id || pending.transport != transport {
                    tracing::debug!(
                        expected = %pending.target,
                        responder = %responder.id,
                        "discovery reply from unexpected peer"
                    );
                }
                directory.relationships().record_acknowledgment(
                    &local.id,
                    transport,
                    &responder.id,
                    pending.sent_at,
                    received_at,
                );
            }
            None => {
                tracing::debug!(request = %reply.request_id, responder = %responder.id, "reply to unknown or expired request, no round trip recorded");
            }
        }

        tracing::info!(%transport, responder = %responder.id, learned, "discovery reply handled");
        Ok(learned)
    }

    /// Requests sent and not yet answered.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop pending requests older than the request timeout; returns how many.
    pub fn expire_pending(&self, now: DateTime<Utc>) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, pending| now.signed_duration_since(pending.sent_at) < self.request_timeout);
        let expired = before.saturating_sub(self.pending.len());
        if expired > 0 {
            tracing::debug!(expired, "discovery requests timed out");
        }
        expired
    }
}

/// Upsert every valid record as a discovered peer, skipping this node itself.
fn learn<'a>(
    directory: &PeerDirectory,
    transport: Transport,
    local: &PeerIdentity,
    records: impl Iterator<Item = &'a PeerRecord>,
) -> usize {
    let mut learned = 0;
    for record in records {
        let mut peer = match record.to_identity() {
            Ok(peer) => peer,
            Err(e) => {
                tracing::debug!(%transport, error = %e, "ignoring malformed peer record");
                continue;
            }
        };
        if peer.id == local.id {
            continue;
        }
        peer.transport.get_or_insert(transport);
        match directory.upsert_peer(peer, PeerScope::Discovered) {
            Ok(()) => learned += 1,
            Err(e) => tracing::debug!(%transport, error = %e, "ignoring shared peer"),
        }
    }
    learned
}
