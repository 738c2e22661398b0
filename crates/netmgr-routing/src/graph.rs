use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use netmgr_core::Transport;
use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::pathfinder::{PathFinder, PeerPath};
use crate::relationship::{Relationship, Reliability, ReliabilityThresholds};

/// Tunables for the relationship graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Rolling-window capacity of every edge.
    pub window_capacity: usize,
    /// Default hop bound for breadth-first path queries.
    pub max_hops: usize,
    /// New edges are refused once a peer has this many on one transport.
    pub max_relationships_per_peer: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            window_capacity: 50,
            max_hops: 15,
            max_relationships_per_peer: 1000,
        }
    }
}

type EdgeKey = (String, Transport);

/// Weighted directed graph over peer ids.
///
/// Outgoing edges are grouped per source peer and ordered by
/// `(to, transport)`, so a scan of one peer's edges is a single shard lookup.
pub struct RelationshipGraph {
    edges: DashMap<String, BTreeMap<EdgeKey, Relationship>>,
    config: GraphConfig,
    thresholds: ReliabilityThresholds,
}

impl RelationshipGraph {
    pub fn new(config: GraphConfig, thresholds: ReliabilityThresholds) -> Self {
        Self {
            edges: DashMap::new(),
            config,
            thresholds,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(GraphConfig::default(), ReliabilityThresholds::default())
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn thresholds(&self) -> &ReliabilityThresholds {
        &self.thresholds
    }

    /// Record an acknowledged exchange from `from` to `to` over `transport`.
    ///
    /// Returns `false` when nothing was recorded: self-loops, negative
    /// round-trips, and new edges beyond the per-peer cap.
    pub fn record_acknowledgment(
        &self,
        from: &str,
        transport: Transport,
        to: &str,
        sent_at: DateTime<Utc>,
        acked_at: DateTime<Utc>,
    ) -> bool {
        if from == to {
            return false;
        }
        let round_trip_ms = (acked_at - sent_at).num_milliseconds();
        if round_trip_ms < 0 {
            tracing::debug!(from, to, %transport, round_trip_ms, "ignoring negative round-trip");
            return false;
        }

        let mut outgoing = self.edges.entry(from.to_string()).or_default();
        let key = (to.to_string(), transport);
        if !outgoing.contains_key(&key) {
            let on_transport = outgoing.keys().filter(|(_, t)| *t == transport).count();
            if on_transport >= self.config.max_relationships_per_peer {
                tracing::debug!(
                    from,
                    %transport,
                    limit = self.config.max_relationships_per_peer,
                    "relationship limit reached, not tracking {}",
                    to
                );
                return false;
            }
        }
        outgoing
            .entry(key)
            .or_insert_with(|| Relationship::new(from, transport, to, self.config.window_capacity))
            .record(round_trip_ms, acked_at)
    }

    /// Snapshot of one edge.
    pub fn relationship(&self, from: &str, transport: Transport, to: &str) -> Option<Relationship> {
        self.edges
            .get(from)
            .and_then(|out| out.get(&(to.to_string(), transport)).cloned())
    }

    pub fn is_related(&self, from: &str, transport: Transport, to: &str) -> bool {
        self.edges
            .get(from)
            .is_some_and(|out| out.contains_key(&(to.to_string(), transport)))
    }

    pub fn remove_relationship(
        &self,
        from: &str,
        transport: Transport,
        to: &str,
    ) -> Option<Relationship> {
        let removed = self
            .edges
            .get_mut(from)
            .and_then(|mut out| out.remove(&(to.to_string(), transport)));
        self.edges.remove_if(from, |_, out| out.is_empty());
        removed
    }

    /// Number of outgoing edges of `from` on `transport`.
    pub fn count_relationships(&self, from: &str, transport: Transport) -> usize {
        self.edges
            .get(from)
            .map(|out| out.keys().filter(|(_, t)| *t == transport).count())
            .unwrap_or(0)
    }

    /// Outgoing edges of `from`, optionally restricted to one transport.
    pub fn outgoing(&self, from: &str, transport: Option<Transport>) -> Vec<Relationship> {
        self.edges
            .get(from)
            .map(|out| {
                out.values()
                    .filter(|rel| transport.map_or(true, |t| rel.transport == t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reliability class of an edge; absent edges are `NotReliable`.
    pub fn classify(&self, from: &str, transport: Transport, to: &str) -> Reliability {
        self.edges
            .get(from)
            .and_then(|out| {
                out.get(&(to.to_string(), transport))
                    .map(|rel| rel.classify(&self.thresholds))
            })
            .unwrap_or(Reliability::NotReliable)
    }

    /// Fewest-hops path, bounded by `max_hops` edges.
    pub fn shortest_hop_path(
        &self,
        from: &str,
        to: &str,
        max_hops: usize,
    ) -> Result<Vec<String>, RoutingError> {
        PathFinder::new(max_hops).shortest_hop_path(self, from, to)
    }

    /// Lowest-latency-cost path over edges of any transport.
    pub fn lowest_cost_path(&self, from: &str, to: &str) -> Result<PeerPath, RoutingError> {
        PathFinder::new(self.config.max_hops).lowest_cost_path(self, from, to, None)
    }

    /// Lowest-latency-cost path using only edges on `transports`.
    pub fn lowest_cost_path_over(
        &self,
        from: &str,
        to: &str,
        transports: &[Transport],
    ) -> Result<PeerPath, RoutingError> {
        PathFinder::new(self.config.max_hops).lowest_cost_path(self, from, to, Some(transports))
    }

    pub fn contains_peer(&self, id: &str) -> bool {
        self.edges.contains_key(id)
            || self
                .edges
                .iter()
                .any(|entry| entry.keys().any(|(to, _)| to == id))
    }

    /// Neighbours of `from` with the cheapest edge cost towards each,
    /// ordered by neighbour id.
    pub(crate) fn neighbours(
        &self,
        from: &str,
        transports: Option<&[Transport]>,
    ) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        let Some(edges) = self.edges.get(from) else {
            return out;
        };
        for ((to, transport), rel) in edges.iter() {
            if transports.is_some_and(|allowed| !allowed.contains(transport)) {
                continue;
            }
            let Some(cost) = rel.cost() else {
                continue;
            };
            out.entry(to.clone())
                .and_modify(|c: &mut f64| *c = c.min(cost))
                .or_insert(cost);
        }
        out
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(|entry| entry.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl Default for RelationshipGraph {
    fn default() -> Self {
        Self::with_defaults()
    }
}
