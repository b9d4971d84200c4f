//! Relay counters for ringcast.
//!
//! [`RelayMetrics`] is shared between inbound connection tasks and the
//! command surface, so every field is a lock-free [`Counter`]. A
//! [`MetricsSnapshot`] is the plain-value copy handed to displays.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter backed by an [`AtomicU64`].
///
/// Relaxed ordering: values are statistics, nothing synchronizes on them.
#[derive(Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl Serialize for Counter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.get().serialize(serializer)
    }
}

/// Per-process relay counters.
#[derive(Debug, Default, Serialize)]
pub struct RelayMetrics {
    /// Inbound frames handed to the relay core. Originated frames are not counted.
    pub frames_received: Counter,
    /// Frames that failed validation.
    pub frames_rejected: Counter,
    /// Frames discarded because `hop_count >= max_hops`.
    pub hop_limit_drops: Counter,
    /// Notifications or deliveries already seen by ID.
    pub duplicates_dropped: Counter,
    /// Content delivered to the local surface.
    pub local_deliveries: Counter,
    /// Notifications surfaced to the local surface.
    pub notifications_surfaced: Counter,
    /// Frames written to the next hop.
    pub frames_forwarded: Counter,
    /// Frames lost because the next hop was unavailable.
    pub forward_failures: Counter,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.get(),
            frames_rejected: self.frames_rejected.get(),
            hop_limit_drops: self.hop_limit_drops.get(),
            duplicates_dropped: self.duplicates_dropped.get(),
            local_deliveries: self.local_deliveries.get(),
            notifications_surfaced: self.notifications_surfaced.get(),
            frames_forwarded: self.frames_forwarded.get(),
            forward_failures: self.forward_failures.get(),
        }
    }
}

/// Point-in-time copy of [`RelayMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub hop_limit_drops: u64,
    pub duplicates_dropped: u64,
    pub local_deliveries: u64,
    pub notifications_surfaced: u64,
    pub frames_forwarded: u64,
    pub forward_failures: u64,
}
