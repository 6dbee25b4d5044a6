//! Metrics collection and registry.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

use crate::session::{CaptureSessionController, SessionStats, StateKind};

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A point-in-time view of one session for metrics update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Current session state.
    pub state: StateKind,
    /// Lifetime counters.
    pub stats: SessionStats,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            state: StateKind::Closed,
            stats: SessionStats::default(),
        }
    }
}

impl MetricsSnapshot {
    /// Reads state and counters from a live controller.
    pub fn from_controller(controller: &CaptureSessionController) -> Self {
        Self {
            state: controller.state(),
            stats: controller.stats(),
        }
    }
}

/// Prometheus metrics registry for camera session monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    session_state: IntGauge,
    opens_total: IntCounter,

    // Capture metrics
    captures_total: IntCounter,
    capture_failures_total: IntCounter,

    // Fault metrics
    device_errors_total: IntCounter,
    configure_failures_total: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all session metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let session_state = IntGauge::new(
            "camera_session_state",
            "Current session state (0=closed .. 4=ready, 5=capturing, 6=closing)",
        )?;
        let opens_total = IntCounter::new(
            "camera_session_opens_total",
            "Total device open attempts",
        )?;
        let captures_total = IntCounter::new(
            "camera_session_captures_total",
            "Total stills written to disk",
        )?;
        let capture_failures_total = IntCounter::new(
            "camera_session_capture_failures_total",
            "Total still captures that failed",
        )?;
        let device_errors_total = IntCounter::new(
            "camera_session_device_errors_total",
            "Total device errors reported by the hardware",
        )?;
        let configure_failures_total = IntCounter::new(
            "camera_session_configure_failures_total",
            "Total failed session configurations",
        )?;

        registry.register(Box::new(session_state.clone()))?;
        registry.register(Box::new(opens_total.clone()))?;
        registry.register(Box::new(captures_total.clone()))?;
        registry.register(Box::new(capture_failures_total.clone()))?;
        registry.register(Box::new(device_errors_total.clone()))?;
        registry.register(Box::new(configure_failures_total.clone()))?;

        Ok(Self {
            registry,
            session_state,
            opens_total,
            captures_total,
            capture_failures_total,
            device_errors_total,
            configure_failures_total,
        })
    }

    /// Updates all metrics from a snapshot.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.session_state.set(snapshot.state.code());

        // Counters only move forward; apply the difference.
        advance(&self.opens_total, snapshot.stats.opens);
        advance(&self.captures_total, snapshot.stats.captures_succeeded);
        advance(&self.capture_failures_total, snapshot.stats.captures_failed);
        advance(&self.device_errors_total, snapshot.stats.device_errors);
        advance(&self.configure_failures_total, snapshot.stats.configure_failures);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}
