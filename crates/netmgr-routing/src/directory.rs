use std::collections::{BTreeMap, BTreeSet};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use netmgr_core::{PeerIdentity, PeerScope, Transport};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::RoutingError;
use crate::graph::RelationshipGraph;

/// Decides which discovered peers to drop once a transport holds more
/// peers than the directory's bound.
pub trait EvictionPolicy: Send + Sync {
    /// Return the ids to evict from `peers` (all peers on `transport`) so
    /// that `excess` entries go away. Returning fewer ids is allowed.
    fn select(&self, transport: Transport, peers: &[PeerIdentity], excess: usize) -> Vec<String>;
}

/// Never evicts; an exceeded bound is only logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetainAll;

impl EvictionPolicy for RetainAll {
    fn select(&self, _transport: Transport, _peers: &[PeerIdentity], _excess: usize) -> Vec<String> {
        Vec::new()
    }
}

/// Catalog of known peers.
///
/// Holds this node's own identity per transport, the seed sets, and every
/// discovered peer indexed by id, address, transport and capability. Each
/// index sits behind its own concurrent map.
pub struct PeerDirectory {
    local: DashMap<Transport, PeerIdentity>,
    seeds: DashMap<Transport, Vec<PeerIdentity>>,
    by_id: DashMap<String, PeerIdentity>,
    /// address -> id
    by_address: DashMap<String, String>,
    by_transport: DashMap<Transport, BTreeSet<String>>,
    by_capability: DashMap<String, BTreeSet<String>>,
    relationships: RelationshipGraph,
    max_peers_per_transport: Option<usize>,
    eviction: Box<dyn EvictionPolicy>,
}

impl PeerDirectory {
    pub fn new(relationships: RelationshipGraph) -> Self {
        Self {
            local: DashMap::new(),
            seeds: DashMap::new(),
            by_id: DashMap::new(),
            by_address: DashMap::new(),
            by_transport: DashMap::new(),
            by_capability: DashMap::new(),
            relationships,
            max_peers_per_transport: None,
            eviction: Box::new(RetainAll),
        }
    }

    /// Bound the discovered peers per transport, enforced by `policy`.
    pub fn with_peer_limit(mut self, max: usize, policy: Box<dyn EvictionPolicy>) -> Self {
        self.max_peers_per_transport = Some(max);
        self.eviction = policy;
        self
    }

    /// The reliability graph over the peers in this directory.
    pub fn relationships(&self) -> &RelationshipGraph {
        &self.relationships
    }

    // ---- local identities ----

    pub fn set_local_identity(&self, transport: Transport, mut identity: PeerIdentity) {
        identity.transport = Some(transport);
        tracing::info!(%transport, id = %identity.id, "local identity updated");
        self.local.insert(transport, identity);
    }

    pub fn local_identity(&self, transport: Transport) -> Option<PeerIdentity> {
        self.local.get(&transport).map(|e| e.value().clone())
    }

    pub fn local_identities(&self) -> Vec<PeerIdentity> {
        let mut out: Vec<(Transport, PeerIdentity)> = self
            .local
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        out.sort_by_key(|(t, _)| *t);
        out.into_iter().map(|(_, p)| p).collect()
    }

    // ---- upsert ----

    /// Validate and merge a peer into the seed set or the discovered indices.
    pub fn upsert_peer(&self, identity: PeerIdentity, scope: PeerScope) -> Result<(), RoutingError> {
        let transport = identity.validate(scope)?;
        match scope {
            PeerScope::Seed => {
                let mut seeds = self.seeds.entry(transport).or_default();
                match seeds.iter_mut().find(|s| s.id == identity.id) {
                    Some(existing) => *existing = identity,
                    None => seeds.push(identity),
                }
            }
            PeerScope::Discovered => {
                self.insert_discovered(transport, identity);
                self.enforce_limit(transport);
            }
        }
        Ok(())
    }

    pub fn add_seed(&self, identity: PeerIdentity) -> Result<(), RoutingError> {
        self.upsert_peer(identity, PeerScope::Seed)
    }

    /// Index a discovered peer.
    ///
    /// The `by_id` entry stays locked while the secondary indexes move, so
    /// concurrent upserts of one id apply one at a time. Lock order is
    /// `by_id` first, then the secondary maps.
    fn insert_discovered(&self, transport: Transport, identity: PeerIdentity) {
        let id = identity.id.clone();
        let mut entry = self.by_id.entry(id.clone());
        let previous = match &mut entry {
            Entry::Occupied(slot) => Some(std::mem::replace(slot.get_mut(), identity.clone())),
            Entry::Vacant(_) => None,
        };

        if let Some(prev) = previous {
            if let Some(old_transport) = prev.transport.filter(|t| *t != transport) {
                if let Some(mut ids) = self.by_transport.get_mut(&old_transport) {
                    ids.remove(&id);
                }
            }
            if prev.has_address() && prev.address != identity.address {
                self.by_address
                    .remove_if(&prev.address, |_, owner| *owner == id);
            }
            for service in prev.services.difference(&identity.services) {
                if let Some(mut ids) = self.by_capability.get_mut(service) {
                    ids.remove(&id);
                }
            }
        }

        self.by_transport
            .entry(transport)
            .or_default()
            .insert(id.clone());
        if identity.has_address() {
            self.by_address.insert(identity.address.clone(), id.clone());
        }
        for service in &identity.services {
            self.by_capability
                .entry(service.clone())
                .or_default()
                .insert(id.clone());
        }
        tracing::debug!(peer = %identity, "peer upserted");

        if let Entry::Vacant(slot) = entry {
            slot.insert(identity);
        }
    }

    fn enforce_limit(&self, transport: Transport) {
        let Some(max) = self.max_peers_per_transport else {
            return;
        };
        let count = self.count_by_transport(transport);
        if count <= max {
            return;
        }
        let excess = count - max;
        let evict = self
            .eviction
            .select(transport, &self.peers_on(transport), excess);
        if evict.is_empty() {
            if excess == 1 {
                tracing::warn!(%transport, count, max, "peer bound exceeded, retaining all peers");
            }
            return;
        }
        for id in evict {
            if self.remove_peer(&id).is_some() {
                tracing::debug!(%transport, peer = %id, "evicted peer");
            }
        }
    }

    /// Remove a discovered peer from every index.
    pub fn remove_peer(&self, id: &str) -> Option<PeerIdentity> {
        let Entry::Occupied(slot) = self.by_id.entry(id.to_string()) else {
            return None;
        };
        let peer = slot.get();
        if let Some(transport) = peer.transport {
            if let Some(mut ids) = self.by_transport.get_mut(&transport) {
                ids.remove(id);
            }
        }
        if peer.has_address() {
            self.by_address.remove_if(&peer.address, |_, owner| owner == id);
        }
        for service in &peer.services {
            if let Some(mut ids) = self.by_capability.get_mut(service) {
                ids.remove(id);
            }
        }
        Some(slot.remove())
    }

    // ---- lookups ----

    pub fn find_by_id(&self, id: &str) -> Option<PeerIdentity> {
        self.by_id.get(id).map(|e| e.value().clone())
    }

    pub fn find_by_address(&self, address: &str) -> Option<PeerIdentity> {
        let id = self.by_address.get(address).map(|e| e.value().clone())?;
        self.find_by_id(&id)
    }

    /// Look a peer up by its id, falling back to its address.
    pub fn find(&self, peer: &PeerIdentity) -> Option<PeerIdentity> {
        self.find_by_id(&peer.id).or_else(|| {
            if peer.has_address() {
                self.find_by_address(&peer.address)
            } else {
                None
            }
        })
    }

    pub fn find_by_capability(&self, name: &str) -> Vec<PeerIdentity> {
        let ids: Vec<String> = self
            .by_capability
            .get(name)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.find_by_id(id)).collect()
    }

    pub fn count_by_transport(&self, transport: Transport) -> usize {
        self.by_transport
            .get(&transport)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }

    /// Discovered peer counts for every transport that has any.
    pub fn counts(&self) -> BTreeMap<Transport, usize> {
        self.by_transport
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| (*e.key(), e.value().len()))
            .collect()
    }

    pub fn count_seeds(&self, transport: Transport) -> usize {
        self.seeds.get(&transport).map(|s| s.len()).unwrap_or(0)
    }

    pub fn seeds(&self, transport: Transport) -> Vec<PeerIdentity> {
        self.seeds
            .get(&transport)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// Uniform choice among discovered peers on `transport`.
    pub fn random_peer(&self, transport: Transport) -> Option<PeerIdentity> {
        let id = {
            let ids = self.by_transport.get(&transport)?;
            if ids.is_empty() {
                return None;
            }
            let index = rand::thread_rng().gen_range(0..ids.len());
            ids.iter().nth(index).cloned()?
        };
        self.find_by_id(&id)
    }

    pub fn random_seed(&self, transport: Transport) -> Option<PeerIdentity> {
        let seeds = self.seeds.get(&transport)?;
        seeds.choose(&mut rand::thread_rng()).cloned()
    }

    /// Up to `n` distinct discovered peers on `transport` for a gossip payload.
    ///
    /// Draws with replacement and stops after `2n` draws.
    pub fn sample_to_share(&self, transport: Transport, n: usize) -> Vec<PeerIdentity> {
        let mut picked: Vec<PeerIdentity> = Vec::with_capacity(n);
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for _ in 0..n.saturating_mul(2) {
            if picked.len() >= n {
                break;
            }
            let Some(peer) = self.random_peer(transport) else {
                break;
            };
            if seen.insert(peer.id.clone()) {
                picked.push(peer);
            }
        }
        picked
    }

    fn peers_on(&self, transport: Transport) -> Vec<PeerIdentity> {
        let ids: Vec<String> = self
            .by_transport
            .get(&transport)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.find_by_id(id)).collect()
    }

    /// Every discovered peer, ordered by id.
    pub fn all_peers(&self) -> Vec<PeerIdentity> {
        let mut peers: Vec<PeerIdentity> = self.by_id.iter().map(|e| e.value().clone()).collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for PeerDirectory {
    fn default() -> Self {
        Self::new(RelationshipGraph::with_defaults())
    }
}
