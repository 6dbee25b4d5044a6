//! Camera session lifecycle.
//!
//! A [`CaptureSessionController`] drives one camera from closed, through
//! device open and session configuration, to a ready state in which the
//! preview streams and still pictures can be taken. It owns every
//! hardware handle for that camera and releases each exactly once.

mod config;
mod controller;
mod error;
mod events;
mod pending;
mod state;

pub use config::{ConfigError, FileConfig, FocusPolicy, OutputConfig, SessionConfig, DEFAULT_SETTLE_DELAY};
pub use controller::{CaptureSessionController, SessionStats};
pub use error::{DeviceErrorCode, SessionError};
pub use events::{LoggingSink, SessionEvent, SessionEventSink};
pub use pending::{CaptureOutcome, CaptureTicket, PendingResult};
pub use state::StateKind;
