//! Notifications delivered to the client.

use crossbeam_channel::Sender;

/// Receives asynchronous session notifications.
///
/// Implementations are invoked from the session's device queue once a
/// transition has completed. They may query the controller but must not
/// block waiting on later session events.
pub trait SessionEventSink: Send + Sync {
    /// The session is configured and previewing at the given size.
    fn on_initialized(&self, preview_width: u32, preview_height: u32);

    /// The session is being torn down.
    fn on_closing(&self);

    /// A hardware or configuration error occurred.
    fn on_error(&self, description: Option<&str>);
}

/// Owned form of a notification, for channel-based consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// See [`SessionEventSink::on_initialized`].
    Initialized {
        /// Preview width in pixels.
        preview_width: u32,
        /// Preview height in pixels.
        preview_height: u32,
    },
    /// See [`SessionEventSink::on_closing`].
    Closing,
    /// See [`SessionEventSink::on_error`]. Empty descriptions are omitted.
    Error {
        /// Human-readable description, if any.
        description: Option<String>,
    },
}

impl SessionEventSink for Sender<SessionEvent> {
    fn on_initialized(&self, preview_width: u32, preview_height: u32) {
        let _ = self.send(SessionEvent::Initialized {
            preview_width,
            preview_height,
        });
    }

    fn on_closing(&self) {
        let _ = self.send(SessionEvent::Closing);
    }

    fn on_error(&self, description: Option<&str>) {
        let description = description.filter(|d| !d.is_empty()).map(str::to_owned);
        let _ = self.send(SessionEvent::Error { description });
    }
}

/// Sink that only logs, for callers with no event consumer.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl SessionEventSink for LoggingSink {
    fn on_initialized(&self, preview_width: u32, preview_height: u32) {
        tracing::info!(preview_width, preview_height, "Camera initialized");
    }

    fn on_closing(&self) {
        tracing::info!("Camera closing");
    }

    fn on_error(&self, description: Option<&str>) {
        tracing::warn!(description = description.unwrap_or(""), "Camera error");
    }
}
