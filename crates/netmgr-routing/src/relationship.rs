use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use netmgr_core::Transport;
use serde::{Deserialize, Serialize};

/// Reliability class of a relationship, derived from its latency window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reliability {
    NotReliable,
    Reliable,
    SuperReliable,
    RealTime,
}

impl fmt::Display for Reliability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotReliable => "not-reliable",
            Self::Reliable => "reliable",
            Self::SuperReliable => "super-reliable",
            Self::RealTime => "real-time",
        };
        f.write_str(s)
    }
}

/// Thresholds used by [`Relationship::classify`].
///
/// Latencies are in milliseconds and compared strictly (`<`) against both
/// the mean and the median of the window. Ack counts are compared strictly
/// (`>`) against the lifetime acknowledgment count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityThresholds {
    pub reliable_min_acks: u64,
    pub reliable_max_latency_ms: f64,
    pub super_reliable_min_acks: u64,
    pub super_reliable_max_latency_ms: f64,
    pub real_time_max_latency_ms: f64,
}

impl Default for ReliabilityThresholds {
    fn default() -> Self {
        Self {
            reliable_min_acks: 100,
            reliable_max_latency_ms: 8000.0,
            super_reliable_min_acks: 1000,
            super_reliable_max_latency_ms: 4000.0,
            real_time_max_latency_ms: 1000.0,
        }
    }
}

/// A directed, per-transport edge between two peers, annotated with a
/// bounded rolling window of acknowledgment round-trip times.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub from: String,
    pub transport: Transport,
    pub to: String,
    window: VecDeque<u64>,
    capacity: usize,
    total_acks: u64,
    last_ack: Option<DateTime<Utc>>,
}

impl Relationship {
    pub fn new(
        from: impl Into<String>,
        transport: Transport,
        to: impl Into<String>,
        capacity: usize,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            from: from.into(),
            transport,
            to: to.into(),
            window: VecDeque::with_capacity(capacity),
            capacity,
            total_acks: 0,
            last_ack: None,
        }
    }

    /// Append one round-trip sample. Negative samples are ignored and
    /// `false` is returned.
    pub fn record(&mut self, round_trip_ms: i64, acked_at: DateTime<Utc>) -> bool {
        let Ok(sample) = u64::try_from(round_trip_ms) else {
            return false;
        };
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(sample);
        self.total_acks += 1;
        self.last_ack = Some(acked_at);
        true
    }

    /// Samples currently in the window, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = u64> + '_ {
        self.window.iter().copied()
    }

    pub fn sample_count(&self) -> usize {
        self.window.len()
    }

    /// Acknowledgments recorded over the lifetime of the edge.
    pub fn total_acks(&self) -> u64 {
        self.total_acks
    }

    pub fn last_ack(&self) -> Option<DateTime<Utc>> {
        self.last_ack
    }

    pub fn mean_ms(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        let sum: u64 = self.window.iter().sum();
        Some(sum as f64 / self.window.len() as f64)
    }

    /// Upper median of the window.
    pub fn median_ms(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        let mut sorted: Vec<u64> = self.window.iter().copied().collect();
        sorted.sort_unstable();
        Some(sorted[sorted.len() / 2] as f64)
    }

    /// Path-finding weight: `0.75 * median + 0.25 * mean`.
    pub fn cost(&self) -> Option<f64> {
        let median = self.median_ms()?;
        let mean = self.mean_ms()?;
        Some(0.75 * median + 0.25 * mean)
    }

    /// Whether both mean and median are strictly below `max_ms`.
    pub fn within_latency(&self, max_ms: f64) -> bool {
        match (self.mean_ms(), self.median_ms()) {
            (Some(mean), Some(median)) => mean < max_ms && median < max_ms,
            _ => false,
        }
    }

    pub fn classify(&self, thresholds: &ReliabilityThresholds) -> Reliability {
        if self.within_latency(thresholds.real_time_max_latency_ms) {
            Reliability::RealTime
        } else if self.total_acks > thresholds.super_reliable_min_acks
            && self.within_latency(thresholds.super_reliable_max_latency_ms)
        {
            Reliability::SuperReliable
        } else if self.total_acks > thresholds.reliable_min_acks
            && self.within_latency(thresholds.reliable_max_latency_ms)
        {
            Reliability::Reliable
        } else {
            Reliability::NotReliable
        }
    }
}
