use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::peer::PeerIdentity;
use crate::types::Transport;

/// An explicit next hop requested by the sender: a named transport driver
/// plus optional origination/destination identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalHop {
    /// Driver identifier, see [`Transport::driver_id`].
    pub driver: String,
    #[serde(default)]
    pub origination: Option<PeerIdentity>,
    #[serde(default)]
    pub destination: Option<PeerIdentity>,
}

impl ExternalHop {
    pub fn to_driver(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            origination: None,
            destination: None,
        }
    }

    pub fn over(transport: Transport) -> Self {
        Self::to_driver(transport.driver_id())
    }

    /// The transport served by this hop's driver, if the driver is known.
    pub fn transport(&self) -> Option<Transport> {
        Transport::from_driver_id(&self.driver)
    }
}

/// An outgoing message handed to the routing engine.
///
/// The payload is opaque; only the addressing fields are interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub payload: Vec<u8>,
    #[serde(default)]
    pub destination: Option<PeerIdentity>,
    #[serde(default)]
    pub next_hop: Option<ExternalHop>,
    pub created_at: DateTime<Utc>,
    /// After this instant the message is dropped instead of retried.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Envelope {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Uuid::now_v7(),
            payload: payload.into(),
            destination: None,
            next_hop: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn with_destination(mut self, destination: PeerIdentity) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_next_hop(mut self, hop: ExternalHop) -> Self {
        self.next_hop = Some(hop);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Serialize into a self-contained hold record.
    pub fn to_record(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Rebuild an envelope from a hold record.
    pub fn from_record(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
