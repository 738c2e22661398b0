use netmgr_core::{CoreError, Transport};

/// What the caller should do with a message whose routing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Transient condition: persist the message and retry later.
    Hold,
    /// The request can never succeed without caller correction.
    DeadLetter,
}

/// Errors that can occur within the routing layer.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("peer rejected: {0}")]
    InvalidPeer(#[from] CoreError),

    #[error("unable to select a connected transport for peer {peer_id}")]
    UnableToSelectTransport {
        peer_id: String,
        /// The peer's transport when it is known but not connected.
        transport: Option<Transport>,
    },

    #[error("no local identity available for transport {transport}")]
    LocalIdentityUnavailable { transport: Transport },

    #[error("no path found from {from} to {to}")]
    PathNotFound { from: String, to: String },

    #[error("message {message_id} has no destination peer")]
    MissingDestination { message_id: String },
}

impl RoutingError {
    /// Default hold-vs-dead-letter policy for a failed routing decision.
    pub fn disposition(&self) -> Disposition {
        match self {
            RoutingError::UnableToSelectTransport {
                transport: Some(_), ..
            } => Disposition::Hold,
            RoutingError::LocalIdentityUnavailable { .. } => Disposition::Hold,
            RoutingError::UnableToSelectTransport { transport: None, .. }
            | RoutingError::InvalidPeer(_)
            | RoutingError::PathNotFound { .. }
            | RoutingError::MissingDestination { .. } => Disposition::DeadLetter,
        }
    }
}
