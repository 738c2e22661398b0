/// Core data-model errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid peer: {reason}")]
    InvalidPeer { reason: String },

    #[error("unknown transport: {0}")]
    UnknownTransport(String),

    #[error("unknown network status: {0}")]
    UnknownStatus(String),

    #[error("malformed peer record: {0}")]
    MalformedRecord(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn invalid_peer(reason: impl Into<String>) -> Self {
        CoreError::InvalidPeer {
            reason: reason.into(),
        }
    }
}
