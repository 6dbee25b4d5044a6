//! Session state variants.
//!
//! Handles live only inside the variants where they are valid: there is
//! no capture session outside `SessionReady`/`Capturing` and no device
//! outside `Opened`..`Capturing`.

use serde::Serialize;
use std::fmt;

use super::PendingResult;
use crate::capabilities::CameraCapabilities;
use crate::hardware::{CameraDevice, CaptureSession, OutputSink};

/// Observable session state, without handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StateKind {
    /// No device held.
    Closed,
    /// Waiting for the device-open callback.
    Opening,
    /// Device and still output held; no capture session.
    Opened,
    /// Waiting for the session-configured callback.
    ConfiguringSession,
    /// Session configured; preview may be streaming.
    SessionReady,
    /// A still capture is outstanding.
    Capturing,
    /// Handles are being released.
    Closing,
}

impl StateKind {
    /// Numeric code exported by the metrics gauge.
    pub fn code(self) -> i64 {
        match self {
            Self::Closed => 0,
            Self::Opening => 1,
            Self::Opened => 2,
            Self::ConfiguringSession => 3,
            Self::SessionReady => 4,
            Self::Capturing => 5,
            Self::Closing => 6,
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An opened device together with the resources bound to it.
pub(crate) struct OpenDevice {
    pub(crate) generation: u64,
    pub(crate) device: Box<dyn CameraDevice>,
    pub(crate) output: OutputSink,
    pub(crate) capabilities: CameraCapabilities,
}

impl OpenDevice {
    /// Closes the device, then the output sink.
    pub(crate) fn release(self) {
        tracing::debug!(generation = self.generation, "Releasing camera device");
        self.device.close();
        self.output.close();
    }
}

/// Repeating-preview status of a configured session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PreviewStream {
    /// Waiting for the settle timer before the first repeating request.
    Settling,
    /// Repeating request active.
    Streaming,
    /// No repeating request.
    Stopped,
}

/// A configured capture session.
pub(crate) struct ActiveSession {
    pub(crate) session: Box<dyn CaptureSession>,
    pub(crate) preview: PreviewStream,
}

impl ActiveSession {
    /// Stops the repeating request if one is active, then closes the session.
    pub(crate) fn release(mut self) {
        if self.preview == PreviewStream::Streaming {
            if let Err(e) = self.session.stop_repeating() {
                tracing::debug!(error = %e, "stop_repeating failed during release");
            }
        }
        self.session.close();
    }
}

/// Authoritative state of one controller.
pub(crate) enum SessionState {
    Closed,
    Opening {
        generation: u64,
    },
    Opened(OpenDevice),
    ConfiguringSession(OpenDevice),
    SessionReady {
        device: OpenDevice,
        session: ActiveSession,
    },
    Capturing {
        device: OpenDevice,
        session: ActiveSession,
        pending: PendingResult,
    },
    Closing,
}

impl SessionState {
    pub(crate) fn kind(&self) -> StateKind {
        match self {
            Self::Closed => StateKind::Closed,
            Self::Opening { .. } => StateKind::Opening,
            Self::Opened(_) => StateKind::Opened,
            Self::ConfiguringSession(_) => StateKind::ConfiguringSession,
            Self::SessionReady { .. } => StateKind::SessionReady,
            Self::Capturing { .. } => StateKind::Capturing,
            Self::Closing => StateKind::Closing,
        }
    }

    /// Device generation of the held device or pending open.
    pub(crate) fn generation(&self) -> Option<u64> {
        match self {
            Self::Opening { generation } => Some(*generation),
            Self::Opened(device) | Self::ConfiguringSession(device) => Some(device.generation),
            Self::SessionReady { device, .. } | Self::Capturing { device, .. } => {
                Some(device.generation)
            }
            Self::Closed | Self::Closing => None,
        }
    }

    /// Releases every handle in order: session, device, output sink.
    ///
    /// An outstanding capture is resolved with `Cancelled`.
    pub(crate) fn release(self) {
        match self {
            Self::Capturing {
                device,
                session,
                pending,
            } => {
                pending.resolve(Err(super::SessionError::Cancelled));
                session.release();
                device.release();
            }
            Self::SessionReady { device, session } => {
                session.release();
                device.release();
            }
            Self::Opened(device) | Self::ConfiguringSession(device) => device.release(),
            Self::Closed | Self::Opening { .. } | Self::Closing => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_codes_are_distinct() {
        let kinds = [
            StateKind::Closed,
            StateKind::Opening,
            StateKind::Opened,
            StateKind::ConfiguringSession,
            StateKind::SessionReady,
            StateKind::Capturing,
            StateKind::Closing,
        ];
        let codes: std::collections::HashSet<_> = kinds.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_closed_state_has_no_generation() {
        assert_eq!(SessionState::Closed.generation(), None);
        assert_eq!(SessionState::Opening { generation: 3 }.generation(), Some(3));
        assert_eq!(SessionState::Closed.kind().to_string(), "Closed");
    }
}
