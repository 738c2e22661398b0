use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use netmgr_core::Transport;
use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::graph::RelationshipGraph;

/// A path through the relationship graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerPath {
    /// Peer ids from source to destination, both inclusive.
    pub peers: Vec<String>,
    /// Sum of the edge costs along the path, in milliseconds.
    pub cost: f64,
}

impl PeerPath {
    pub fn hops(&self) -> usize {
        self.peers.len().saturating_sub(1)
    }

    /// The first peer after the source, if the path has any hop.
    pub fn next_hop(&self) -> Option<&str> {
        self.peers.get(1).map(String::as_str)
    }
}

/// Path queries over a [`RelationshipGraph`].
///
/// Both searches read one peer's outgoing edges at a time, so no graph
/// lock is held across the whole query.
pub struct PathFinder {
    /// Hop bound for breadth-first search, counted in edges.
    max_hops: usize,
}

/// Frontier entry for the lowest-cost search.
#[derive(Debug, Clone)]
struct SearchNode {
    cost: f64,
    path: Vec<String>,
}

impl SearchNode {
    fn node_id(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }
}

impl PartialEq for SearchNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchNode {}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse so the cheapest, then the
        // lexicographically smallest path, pops first.
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.path.cmp(&self.path))
    }
}

impl PathFinder {
    pub fn new(max_hops: usize) -> Self {
        Self { max_hops }
    }

    pub fn with_defaults() -> Self {
        Self { max_hops: 15 }
    }

    /// Breadth-first search over outgoing edges of any transport.
    ///
    /// Neighbours are expanded in id order, so among paths of equal length
    /// the result is deterministic.
    pub fn shortest_hop_path(
        &self,
        graph: &RelationshipGraph,
        from: &str,
        to: &str,
    ) -> Result<Vec<String>, RoutingError> {
        if from == to {
            return Ok(vec![from.to_string()]);
        }

        let mut parents: HashMap<String, String> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::from([from.to_string()]);
        let mut queue: VecDeque<(String, usize)> = VecDeque::from([(from.to_string(), 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= self.max_hops {
                continue;
            }
            for next in graph.neighbours(&current, None).into_keys() {
                if !visited.insert(next.clone()) {
                    continue;
                }
                parents.insert(next.clone(), current.clone());
                if next == to {
                    return Ok(unwind(&parents, from, to));
                }
                queue.push_back((next, depth + 1));
            }
        }

        Err(not_found(from, to))
    }

    /// Dijkstra's algorithm with edge cost `0.75 * median + 0.25 * mean`.
    ///
    /// Among equal-cost paths the lexicographically smallest sequence of
    /// peer ids wins. `transports` restricts the usable edges.
    pub fn lowest_cost_path(
        &self,
        graph: &RelationshipGraph,
        from: &str,
        to: &str,
        transports: Option<&[Transport]>,
    ) -> Result<PeerPath, RoutingError> {
        if from == to {
            return Ok(PeerPath {
                peers: vec![from.to_string()],
                cost: 0.0,
            });
        }

        let mut settled: HashSet<String> = HashSet::new();
        let mut heap = BinaryHeap::new();
        heap.push(SearchNode {
            cost: 0.0,
            path: vec![from.to_string()],
        });

        while let Some(current) = heap.pop() {
            let node = current.node_id().to_string();
            if !settled.insert(node.clone()) {
                continue;
            }
            if node == to {
                return Ok(PeerPath {
                    peers: current.path,
                    cost: current.cost,
                });
            }

            for (next, edge_cost) in graph.neighbours(&node, transports) {
                if settled.contains(&next) {
                    continue;
                }
                let mut path = current.path.clone();
                path.push(next);
                heap.push(SearchNode {
                    cost: current.cost + edge_cost,
                    path,
                });
            }
        }

        Err(not_found(from, to))
    }
}

impl Default for PathFinder {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn unwind(parents: &HashMap<String, String>, from: &str, to: &str) -> Vec<String> {
    let mut path = vec![to.to_string()];
    let mut current = to;
    while current != from {
        match parents.get(current) {
            Some(parent) => {
                path.push(parent.clone());
                current = parent;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

fn not_found(from: &str, to: &str) -> RoutingError {
    RoutingError::PathNotFound {
        from: from.to_string(),
        to: to.to_string(),
    }
}
