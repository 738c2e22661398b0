//! netmgr node: the network manager service and the process around it.
//!
//! - [`service::NetworkManager`] owns routing state and the send, peer and
//!   discovery operations.
//! - [`retry`] holds unroutable messages; [`discovery`] bootstraps and gossips
//!   peer lists; [`scheduler`] runs both periodically.
//! - [`node::NetmgrNode`] wires storage, the HTTP API and the schedules together.

pub mod api;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod node;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod storage;

pub use config::NetmgrConfig;
pub use error::NodeError;
pub use node::NetmgrNode;
pub use service::{NetworkManager, PeerUpdateReport, SendOutcome};
