//! The device/session-queue and image-queue pair owned by one session.

use super::{ExecutorError, QueueHandle, SerialQueue};

/// Two independent serial queues backing a camera session.
///
/// All state transitions run on the device queue. Image decode and file
/// writes run on the image queue so a slow write never delays device
/// events.
pub struct ExecutionContext {
    device: SerialQueue,
    image: SerialQueue,
}

impl ExecutionContext {
    /// Starts both queues, named after `label`.
    pub fn start(label: &str) -> Result<Self, ExecutorError> {
        let device = SerialQueue::spawn(&format!("{label}-device"))?;
        let image = SerialQueue::spawn(&format!("{label}-image"))?;
        tracing::debug!(label, "Execution context started");
        Ok(Self { device, image })
    }

    /// Handle for posting device/session work.
    pub fn device(&self) -> QueueHandle {
        self.device.handle()
    }

    /// Handle for posting image work.
    pub fn image(&self) -> QueueHandle {
        self.image.handle()
    }

    /// Stops both queues. Joins them unless called from one of them.
    pub fn shutdown(self) {
        self.device.quit_safely();
        self.image.quit_safely();
        drop(self);
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("device", &self.device.handle())
            .field("image", &self.image.handle())
            .finish()
    }
}
