//! Hand-off boundary between routing decisions and transport drivers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use netmgr_core::Envelope;
use netmgr_routing::RouteDecision;
use tokio::sync::mpsc;

use crate::error::NodeError;

/// A routed message on its way to a transport driver.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub decision: RouteDecision,
    pub envelope: Envelope,
}

/// Hands routed messages to the transport drivers.
///
/// Implementations must not block: a hand-off either succeeds immediately
/// or fails so the caller can hold the message.
pub trait TransportDispatcher: Send + Sync {
    fn dispatch(&self, decision: RouteDecision, envelope: Envelope) -> Result<(), NodeError>;
}

/// Dispatcher that queues hand-offs on a bounded channel.
pub struct ChannelDispatcher {
    tx: mpsc::Sender<Outbound>,
}

impl ChannelDispatcher {
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self { tx }
    }

    /// A dispatcher and the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl TransportDispatcher for ChannelDispatcher {
    fn dispatch(&self, decision: RouteDecision, envelope: Envelope) -> Result<(), NodeError> {
        self.tx
            .try_send(Outbound { decision, envelope })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    NodeError::Dispatch("outbound queue is full".into())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    NodeError::Dispatch("outbound queue is closed".into())
                }
            })
    }
}

/// Per-driver outbound queues that transport drivers drain.
///
/// Each driver id gets its own bounded FIFO. A hand-off to a full queue
/// fails so the message is held instead of dropped.
pub struct DriverOutbox {
    capacity: usize,
    queues: DashMap<String, VecDeque<Outbound>>,
    handed_off: AtomicU64,
}

impl DriverOutbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queues: DashMap::new(),
            handed_off: AtomicU64::new(0),
        }
    }

    /// Remove and return up to `max` queued messages for `driver`, oldest first.
    pub fn take(&self, driver: &str, max: usize) -> Vec<Outbound> {
        let Some(mut queue) = self.queues.get_mut(driver) else {
            return Vec::new();
        };
        let n = max.min(queue.len());
        let taken: Vec<Outbound> = queue.drain(..n).collect();
        if !taken.is_empty() {
            tracing::debug!(%driver, taken = taken.len(), left = queue.len(), "driver drained outbox");
        }
        taken
    }

    pub fn pending(&self, driver: &str) -> usize {
        self.queues.get(driver).map(|q| q.len()).unwrap_or(0)
    }

    /// Messages accepted since startup.
    pub fn handed_off(&self) -> u64 {
        self.handed_off.load(Ordering::Relaxed)
    }
}

impl TransportDispatcher for DriverOutbox {
    fn dispatch(&self, decision: RouteDecision, envelope: Envelope) -> Result<(), NodeError> {
        let driver = decision.driver;
        let mut queue = self.queues.entry(driver.to_string()).or_default();
        if queue.len() >= self.capacity {
            return Err(NodeError::Dispatch(format!("outbox for {driver} is full")));
        }
        tracing::debug!(message = %envelope.id, %driver, peer = %decision.destination, "message queued for driver");
        queue.push_back(Outbound { decision, envelope });
        self.handed_off.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
