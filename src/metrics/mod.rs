//! Prometheus metrics exporter for camera sessions.
//!
//! # Metrics Exposed
//!
//! - `camera_session_state` - Current state code (see [`StateKind::code`](crate::session::StateKind::code))
//! - `camera_session_opens_total` - Device open attempts
//! - `camera_session_captures_total` - Stills written to disk
//! - `camera_session_capture_failures_total` - Still captures that failed
//! - `camera_session_device_errors_total` - Device errors reported by the hardware
//! - `camera_session_configure_failures_total` - Failed session configurations
//!
//! The HTTP exporter (`/metrics`, `/health`) requires the `metrics` feature.
//!
//! # Example
//!
//! ```no_run
//! use camera_session::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! registry.update(&MetricsSnapshot::default());
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
