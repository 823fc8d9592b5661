//! Supervisor counters.
//!
//! Counters are lock-free so the expiry path can record into them without
//! touching the supervisor lock.

use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;

/// Live supervisor counters.
#[derive(Debug, Default)]
pub struct SupervisorMetrics {
    pings: AtomicU64,
    auto_rearms: AtomicU64,
    mode_transitions: AtomicU64,
    expiries: AtomicU64,
    restart_attempts: AtomicU64,
    clamped_requests: AtomicU64,
}

impl SupervisorMetrics {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an external liveness acknowledgement.
    pub fn record_ping(&self) {
        self.pings.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a scheduled Auto-mode re-arm.
    pub fn record_auto_rearm(&self) {
        self.auto_rearms.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a change of mode.
    pub fn record_transition(&self) {
        self.mode_transitions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered expiry.
    pub fn record_expiry(&self) {
        self.expiries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a graceful restart attempt.
    pub fn record_restart_attempt(&self) {
        self.restart_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a timeout request that had to be clamped.
    pub fn record_clamped(&self) {
        self.clamped_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pings: self.pings.load(Ordering::Relaxed),
            auto_rearms: self.auto_rearms.load(Ordering::Relaxed),
            mode_transitions: self.mode_transitions.load(Ordering::Relaxed),
            expiries: self.expiries.load(Ordering::Relaxed),
            restart_attempts: self.restart_attempts.load(Ordering::Relaxed),
            clamped_requests: self.clamped_requests.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SupervisorMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    /// External pings accepted.
    pub pings: u64,
    /// Auto-mode re-arms performed.
    pub auto_rearms: u64,
    /// Auto/User transitions.
    pub mode_transitions: u64,
    /// Expiry events handled.
    pub expiries: u64,
    /// Graceful restart attempts made.
    pub restart_attempts: u64,
    /// Timeout requests that were clamped.
    pub clamped_requests: u64,
}
