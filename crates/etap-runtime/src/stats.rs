// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory counters for a running tap.

use etap_core::RunnerStatsSnapshot;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::{Mutex, PoisonError};

/// Atomic per-runner counters that can be shared with the control plane.
#[derive(Debug, Default)]
pub struct RunnerStats {
    iterations: AtomicU64,
    polled_events: AtomicU64,
    deliveries: AtomicU64,
    delivered_values: AtomicU64,
    consecutive_failures: AtomicU64,
    total_failures: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl RunnerStats {
    /// Create a zeroed collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_iteration(&self) {
        self.iterations.fetch_add(1, Relaxed);
    }

    pub(crate) fn record_poll(&self, events: usize) {
        self.polled_events.fetch_add(events as u64, Relaxed);
    }

    pub(crate) fn record_delivery(&self, values: usize) {
        self.deliveries.fetch_add(1, Relaxed);
        self.delivered_values.fetch_add(values as u64, Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.consecutive_failures.store(0, Relaxed);
    }

    /// Record a failed iteration; returns the new consecutive-failure count.
    pub(crate) fn record_failure(&self, message: &str) -> u64 {
        self.total_failures.fetch_add(1, Relaxed);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
        self.consecutive_failures.fetch_add(1, Relaxed) + 1
    }

    /// Take a point-in-time snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> RunnerStatsSnapshot {
        RunnerStatsSnapshot {
            iterations: self.iterations.load(Relaxed),
            polled_events: self.polled_events.load(Relaxed),
            deliveries: self.deliveries.load(Relaxed),
            delivered_values: self.delivered_values.load(Relaxed),
            consecutive_failures: self.consecutive_failures.load(Relaxed),
            total_failures: self.total_failures.load(Relaxed),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
