//! Typed hardware callbacks.
//!
//! Each handle carries the device generation it was issued for, so the
//! controller can discard callbacks that outlive their device.

use std::sync::Arc;

use super::{CameraDevice, CaptureSession};
use crate::session::DeviceErrorCode;

/// Event posted from a hardware callback to the device queue.
pub(crate) enum HardwareEvent {
    DeviceOpened {
        generation: u64,
        device: Box<dyn CameraDevice>,
    },
    DeviceDisconnected {
        generation: u64,
    },
    DeviceError {
        generation: u64,
        code: DeviceErrorCode,
    },
    SessionConfigured {
        generation: u64,
        session: Box<dyn CaptureSession>,
    },
    SessionConfigureFailed {
        generation: u64,
    },
}

/// Delivers a [`HardwareEvent`] to the device queue.
pub(crate) type EventPoster = Arc<dyn Fn(HardwareEvent) + Send + Sync>;

/// Callbacks for one device-open attempt.
#[derive(Clone)]
pub struct DeviceCallbacks {
    generation: u64,
    post: EventPoster,
}

impl DeviceCallbacks {
    pub(crate) fn new(generation: u64, post: EventPoster) -> Self {
        Self { generation, post }
    }

    /// Device generation this handle belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The device opened successfully.
    pub fn opened(&self, device: Box<dyn CameraDevice>) {
        (self.post)(HardwareEvent::DeviceOpened {
            generation: self.generation,
            device,
        });
    }

    /// The device is no longer available.
    pub fn disconnected(&self) {
        (self.post)(HardwareEvent::DeviceDisconnected {
            generation: self.generation,
        });
    }

    /// The device reported an error.
    pub fn error(&self, code: DeviceErrorCode) {
        (self.post)(HardwareEvent::DeviceError {
            generation: self.generation,
            code,
        });
    }
}

impl std::fmt::Debug for DeviceCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCallbacks")
            .field("generation", &self.generation)
            .finish()
    }
}

/// Callbacks for one session-configuration attempt.
#[derive(Clone)]
pub struct SessionCallbacks {
    generation: u64,
    post: EventPoster,
}

impl SessionCallbacks {
    pub(crate) fn new(generation: u64, post: EventPoster) -> Self {
        Self { generation, post }
    }

    /// Device generation the session was configured against.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The session is configured.
    pub fn configured(&self, session: Box<dyn CaptureSession>) {
        (self.post)(HardwareEvent::SessionConfigured {
            generation: self.generation,
            session,
        });
    }

    /// Session configuration failed.
    pub fn configure_failed(&self) {
        (self.post)(HardwareEvent::SessionConfigureFailed {
            generation: self.generation,
        });
    }
}

impl std::fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("generation", &self.generation)
            .finish()
    }
}
