pub mod envelope;
pub mod error;
pub mod peer;
pub mod types;
pub mod wire;

pub use envelope::{Envelope, ExternalHop};
pub use error::CoreError;
pub use peer::{PeerIdentity, PeerScope};
pub use types::{NetworkState, NetworkStatus, Transport};
pub use wire::{DiscoveryReply, DiscoveryRequest, PeerRecord};
