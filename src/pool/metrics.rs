//! Request counters and health tracking for the connection pool

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free request counters shared by every caller of the pool
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
}

/// Point-in-time copy of [`ConnectionMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub timeout_requests: u64,
}

impl ConnectionMetrics {
    /// Record the outcome of one request
    ///
    /// A timeout also counts as a failure.
    pub fn record_request(&self, success: bool, timeout: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        if timeout {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: self.successful.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
            timeout_requests: self.timeouts.load(Ordering::Relaxed),
        }
    }

    /// Percentage of successful requests, `0.0` before the first request
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        let snapshot = self.snapshot();
        if snapshot.total_requests == 0 {
            return 0.0;
        }
        snapshot.successful_requests as f64 / snapshot.total_requests as f64 * 100.0
    }
}

/// Rolling health of the pool's outbound traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionHealth {
    pub is_healthy: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self {
            is_healthy: true,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

impl ConnectionHealth {
    pub fn mark_healthy(&mut self) {
        self.is_healthy = true;
        self.consecutive_failures = 0;
        self.last_error = None;
    }

    pub fn mark_unhealthy(&mut self, error: impl Into<String>) {
        self.is_healthy = false;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.into());
    }
}
