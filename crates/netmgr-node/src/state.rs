//! Shared node state for cross-task communication.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::commands::NodeCommand;
use crate::dispatch::DriverOutbox;
use crate::service::NetworkManager;

/// Shared state for the running node, accessible from HTTP handlers.
pub struct NodeState {
    /// When the node started.
    pub start_time: Instant,
    /// Read access to routing state.
    pub manager: Arc<NetworkManager>,
    /// Routed messages waiting for their transport driver.
    pub outbox: Arc<DriverOutbox>,
    /// Channel to send commands to the event loop.
    pub command_tx: mpsc::Sender<NodeCommand>,
}

impl NodeState {
    pub fn new(
        manager: Arc<NetworkManager>,
        outbox: Arc<DriverOutbox>,
        command_tx: mpsc::Sender<NodeCommand>,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            manager,
            outbox,
            command_tx,
        }
    }

    pub fn handed_off(&self) -> u64 {
        self.outbox.handed_off()
    }
}
