//! netmgr routing: the decision engine of a multi-transport overlay node.
//!
//! This crate provides:
//! - [`NetworkStateRegistry`]: last-write-wins connectivity status per transport.
//! - [`PeerDirectory`]: local identities, seeds and discovered peers, indexed by id,
//!   address, transport and capability.
//! - [`RelationshipGraph`]: per-transport peer relationships with rolling
//!   acknowledgment-latency windows, reliability classification and path finding.
//! - [`Router`]: selects a transport and peer pair for each outgoing envelope.

pub mod directory;
pub mod error;
pub mod graph;
pub mod pathfinder;
pub mod registry;
pub mod relationship;
pub mod router;

// Re-exports for convenience.
pub use directory::{EvictionPolicy, PeerDirectory, RetainAll};
pub use error::{Disposition, RoutingError};
pub use graph::{GraphConfig, RelationshipGraph};
pub use pathfinder::{PathFinder, PeerPath};
pub use registry::NetworkStateRegistry;
pub use relationship::{Relationship, Reliability, ReliabilityThresholds};
pub use router::{RouteDecision, Router};
