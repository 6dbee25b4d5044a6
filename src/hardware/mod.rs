//! Camera hardware seam.
//!
//! The platform camera stack is reached only through the traits in this
//! module. Hardware reports lifecycle changes through typed callback
//! handles that post events onto the session's device queue; it never
//! calls back into session state directly.
//!
//! Handles are consumed on close (`self: Box<Self>`), so a device or
//! session cannot be used after it has been released.

mod callbacks;
mod output;
mod preview;
pub mod simulated;

pub use callbacks::{DeviceCallbacks, SessionCallbacks};
pub(crate) use callbacks::{EventPoster, HardwareEvent};
pub use output::{DecodeError, FrameProducer, FrameReader, OutputError, OutputSink, StillFrame};
pub use preview::{PreviewTarget, RenderSurface};

use thiserror::Error;

use crate::capabilities::CameraIdentity;
use crate::session::FocusPolicy;

/// Errors returned synchronously by hardware calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    #[error("camera access denied: {0}")]
    Access(String),
    #[error("camera disconnected")]
    Disconnected,
    #[error("illegal hardware state: {0}")]
    IllegalState(String),
}

/// Kind of capture request submitted to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureRequestKind {
    /// Repeating request streaming into the preview target.
    Preview,
    /// One-shot request into the still output.
    StillCapture,
}

/// A capture request as handed to the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Request template and target.
    pub kind: CaptureRequestKind,
    /// Auto-focus mode.
    pub focus: FocusPolicy,
}

impl CaptureRequest {
    /// Repeating preview request.
    pub fn preview(focus: FocusPolicy) -> Self {
        Self {
            kind: CaptureRequestKind::Preview,
            focus,
        }
    }

    /// One-shot still request.
    pub fn still(focus: FocusPolicy) -> Self {
        Self {
            kind: CaptureRequestKind::StillCapture,
            focus,
        }
    }
}

/// Output targets a capture session is configured with.
#[derive(Debug, Clone)]
pub struct SessionOutputs {
    /// Caller-owned preview surface.
    pub preview: PreviewTarget,
    /// Still-image output slot.
    pub still: FrameProducer,
}

/// Entry point into the platform camera stack.
pub trait CameraBackend: Send + Sync {
    /// Starts opening `camera`. The outcome arrives through `callbacks`.
    fn open_device(
        &self,
        camera: &CameraIdentity,
        callbacks: DeviceCallbacks,
    ) -> Result<(), HardwareError>;
}

/// An opened camera device.
pub trait CameraDevice: Send {
    /// Starts configuring a capture session. The outcome arrives through `callbacks`.
    fn create_capture_session(
        &mut self,
        outputs: SessionOutputs,
        callbacks: SessionCallbacks,
    ) -> Result<(), HardwareError>;

    /// Releases the device.
    fn close(self: Box<Self>);
}

/// A configured capture session bound to one device.
pub trait CaptureSession: Send {
    /// Installs `request` as the repeating request.
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<(), HardwareError>;

    /// Cancels the repeating request.
    fn stop_repeating(&mut self) -> Result<(), HardwareError>;

    /// Submits a one-shot request. The image arrives in the still output.
    fn capture(&mut self, request: &CaptureRequest) -> Result<(), HardwareError>;

    /// Releases the session.
    fn close(self: Box<Self>);
}
