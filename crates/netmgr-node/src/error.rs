use netmgr_core::{CoreError, Transport};
use netmgr_routing::RoutingError;

/// Errors raised by the node services.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("held message {id} is unreadable: {reason}")]
    CorruptHoldRecord { id: String, reason: String },

    #[error("no peers and no seeds known for {transport}")]
    NoSeedsAvailable { transport: Transport },

    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("column family '{0}' not found")]
    MissingColumnFamily(String),

    #[error("transport hand-off failed: {0}")]
    Dispatch(String),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Core(#[from] CoreError),
}
