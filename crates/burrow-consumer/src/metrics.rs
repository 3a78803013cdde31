//! # Consumer Metrics
//!
//! Process-local counters for message runs and connection lifecycle.
//! Exported as JSON for hosts that scrape their own endpoints.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Consumer metrics
#[derive(Debug, Default)]
pub struct ConsumerMetrics {
    // Message counters
    pub messages_received: AtomicU64,
    pub messages_processed: AtomicU64,
    pub messages_failed: AtomicU64,

    // Runs started but not yet finished
    pub in_flight: AtomicU64,

    // Connection counters
    pub connections_opened: AtomicU64,
    pub connections_closed: AtomicU64,
    pub connections_lost: AtomicU64,

    // Latency tracking
    pub total_run_ms: AtomicU64,
}

impl ConsumerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delivery entering the stack
    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a run finishing
    pub fn record_finished(&self, success: bool, elapsed_ms: u64) {
        if success {
            self.messages_processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.messages_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.total_run_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a close the application did not ask for
    pub fn record_connection_lost(&self) {
        self.connections_lost.fetch_add(1, Ordering::Relaxed);
    }

    /// Runs currently executing
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Get average run duration in ms
    pub fn average_run_ms(&self) -> f64 {
        let total = self.total_run_ms.load(Ordering::Relaxed);
        let count = self.messages_processed.load(Ordering::Relaxed)
            + self.messages_failed.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "messages": {
                "received": self.messages_received.load(Ordering::Relaxed),
                "processed": self.messages_processed.load(Ordering::Relaxed),
                "failed": self.messages_failed.load(Ordering::Relaxed),
                "in_flight": self.in_flight(),
            },
            "connections": {
                "opened": self.connections_opened.load(Ordering::Relaxed),
                "closed": self.connections_closed.load(Ordering::Relaxed),
                "lost": self.connections_lost.load(Ordering::Relaxed),
            },
            "latency": {
                "average_ms": self.average_run_ms(),
            }
        })
    }
}

/// Run timing helper
pub struct RunTimer {
    start: Instant,
    metrics: Arc<ConsumerMetrics>,
}

impl RunTimer {
    pub fn start(metrics: Arc<ConsumerMetrics>) -> Self {
        metrics.record_received();
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    pub fn finish(self, success: bool) {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        self.metrics.record_finished(success, elapsed_ms);
    }
}
