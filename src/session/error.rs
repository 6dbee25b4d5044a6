//! Session error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::StateKind;
use crate::executor::ExecutorError;
use crate::hardware::HardwareError;

/// Device errors reported asynchronously by the camera subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceErrorCode {
    /// The device is already opened by a higher-priority client.
    InUse,
    /// The system-wide limit of open cameras has been reached.
    MaxCamerasInUse,
    /// A device policy forbids opening the camera.
    PolicyDisabled,
    /// The device encountered an unrecoverable error.
    DeviceFatal,
    /// The camera service encountered an unrecoverable error.
    ServiceFatal,
    /// Any code the platform reports that is not listed above.
    Unknown,
}

impl DeviceErrorCode {
    /// Human-readable description delivered with the error notification.
    pub fn description(self) -> &'static str {
        match self {
            Self::InUse => "The camera device is in use already.",
            Self::MaxCamerasInUse => "Max cameras in use",
            Self::PolicyDisabled => "The camera device could not be opened due to a device policy.",
            Self::DeviceFatal => "The camera device has encountered a fatal error",
            Self::ServiceFatal => "The camera service has encountered a fatal error.",
            Self::Unknown => "Unknown camera error",
        }
    }
}

/// Errors surfaced by a camera session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("{0}")]
    DeviceAccess(String),
    #[error("{}", .0.description())]
    DeviceRuntime(DeviceErrorCode),
    #[error("{0}")]
    SessionConfiguration(String),
    #[error("capture failed: {0}")]
    CaptureIo(String),
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: StateKind,
    },
    #[error("camera reports no supported still-image output size")]
    NoSupportedOutputSize,
    #[error("capture cancelled because the session closed")]
    Cancelled,
    #[error("background queue unavailable: {0}")]
    Executor(String),
}

impl SessionError {
    /// Stable error code used by the command layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DeviceAccess(_) => "CameraAccess",
            Self::DeviceRuntime(_) => "cameraRuntime",
            Self::SessionConfiguration(_) => "sessionConfiguration",
            Self::CaptureIo(_) => "captureIo",
            Self::InvalidState { .. } => "invalidState",
            Self::NoSupportedOutputSize => "noSupportedOutputSize",
            Self::Cancelled => "cancelled",
            Self::Executor(_) => "executor",
        }
    }
}

impl From<HardwareError> for SessionError {
    fn from(err: HardwareError) -> Self {
        Self::DeviceAccess(err.to_string())
    }
}

impl From<ExecutorError> for SessionError {
    fn from(err: ExecutorError) -> Self {
        Self::Executor(err.to_string())
    }
}
