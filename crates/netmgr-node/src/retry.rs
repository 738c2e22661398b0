//! Store-and-forward holding area for messages that could not be routed.

use std::sync::{Arc, Mutex, TryLockError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use netmgr_core::Envelope;
use netmgr_routing::Router;
use serde::Serialize;
use uuid::Uuid;

use crate::dispatch::TransportDispatcher;
use crate::error::NodeError;
use crate::storage::{Storage, CF_HELD};

/// Durable keyed record store backing the [`RetryStore`].
///
/// `put` on an existing id overwrites the record.
pub trait HoldStore: Send + Sync {
    fn put(&self, id: &str, record: Vec<u8>) -> Result<(), NodeError>;
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, NodeError>;
    fn remove(&self, id: &str) -> Result<(), NodeError>;
    fn ids(&self) -> Result<Vec<String>, NodeError>;
}

/// Hold records in the `held` column family.
pub struct RocksHoldStore {
    storage: Arc<Storage>,
}

impl RocksHoldStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl HoldStore for RocksHoldStore {
    fn put(&self, id: &str, record: Vec<u8>) -> Result<(), NodeError> {
        self.storage.put(CF_HELD, id.as_bytes(), &record)
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, NodeError> {
        self.storage.get(CF_HELD, id.as_bytes())
    }

    fn remove(&self, id: &str) -> Result<(), NodeError> {
        self.storage.delete(CF_HELD, id.as_bytes())
    }

    fn ids(&self) -> Result<Vec<String>, NodeError> {
        Ok(self
            .storage
            .keys(CF_HELD)?
            .into_iter()
            .map(|key| String::from_utf8_lossy(&key).into_owned())
            .collect())
    }
}

/// Process-local hold records, lost on restart.
#[derive(Default)]
pub struct MemoryHoldStore {
    records: DashMap<String, Vec<u8>>,
}

impl MemoryHoldStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HoldStore for MemoryHoldStore {
    fn put(&self, id: &str, record: Vec<u8>) -> Result<(), NodeError> {
        self.records.insert(id.to_string(), record);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, NodeError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    fn remove(&self, id: &str) -> Result<(), NodeError> {
        self.records.remove(id);
        Ok(())
    }

    fn ids(&self) -> Result<Vec<String>, NodeError> {
        let mut ids: Vec<String> = self.records.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

/// Outcome counters of one [`RetryStore::sweep`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub delivered: usize,
    pub remaining: usize,
    pub expired: usize,
    pub corrupt: usize,
    /// Records handed off or expired whose removal failed; they are
    /// examined again on the next sweep.
    pub unremoved: usize,
    /// Another sweep was already running; nothing was examined.
    pub busy: bool,
}

/// Holds unroutable messages and re-attempts them on every sweep.
///
/// A record leaves the store only after a successful hand-off to a
/// transport or once its envelope has expired. At most one sweep runs at a
/// time.
pub struct RetryStore {
    store: Arc<dyn HoldStore>,
    sweeping: Mutex<()>,
}

impl RetryStore {
    pub fn new(store: Arc<dyn HoldStore>) -> Self {
        Self {
            store,
            sweeping: Mutex::new(()),
        }
    }

    /// Persist `envelope` under its id.
    pub fn hold(&self, envelope: &Envelope) -> Result<(), NodeError> {
        let record = envelope.to_record()?;
        self.store.put(&envelope.id.to_string(), record)?;
        tracing::info!(message = %envelope.id, "message held for retry");
        Ok(())
    }

    pub fn is_held(&self, id: &Uuid) -> Result<bool, NodeError> {
        Ok(self.store.get(&id.to_string())?.is_some())
    }

    pub fn len(&self) -> Result<usize, NodeError> {
        Ok(self.store.ids()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, NodeError> {
        Ok(self.len()? == 0)
    }

    /// Re-route every held message and hand off those that are now routable.
    ///
    /// Unreadable records and failed removals are logged and counted; they
    /// never abort the sweep. A call made while another sweep is running
    /// returns immediately with `busy` set.
    pub fn sweep(
        &self,
        router: &Router,
        dispatcher: &dyn TransportDispatcher,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, NodeError> {
        let mut report = SweepReport::default();
        let _guard = match self.sweeping.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                tracing::debug!("retry sweep already running, skipping");
                report.busy = true;
                return Ok(report);
            }
        };

        for id in self.store.ids()? {
            report.examined += 1;

            let record = match self.store.get(&id) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(message = %id, error = %e, "cannot read held message");
                    report.remaining += 1;
                    continue;
                }
            };
            let envelope = match Envelope::from_record(&record) {
                Ok(envelope) => envelope,
                Err(e) => {
                    let err = NodeError::CorruptHoldRecord {
                        id: id.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!(error = %err, "skipping held message");
                    report.corrupt += 1;
                    continue;
                }
            };

            if envelope.is_expired(now) {
                tracing::info!(message = %id, "held message expired");
                report.expired += 1;
                self.release(&id, &mut report);
                continue;
            }

            let decision = match router.route(&envelope, None) {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::debug!(message = %id, reason = %e, "held message still unroutable");
                    report.remaining += 1;
                    continue;
                }
            };

            let transport = decision.transport;
            match dispatcher.dispatch(decision, envelope) {
                Ok(()) => {
                    tracing::info!(message = %id, %transport, "held message delivered");
                    report.delivered += 1;
                    self.release(&id, &mut report);
                }
                Err(e) => {
                    tracing::warn!(message = %id, %transport, error = %e, "hand-off of held message failed");
                    report.remaining += 1;
                }
            }
        }

        tracing::debug!(?report, "retry sweep finished");
        Ok(report)
    }

    fn release(&self, id: &str, report: &mut SweepReport) {
        if let Err(e) = self.store.remove(id) {
            tracing::warn!(message = %id, error = %e, "cannot remove held message");
            report.unremoved += 1;
        }
    }
}
