//! One-shot completion for still captures.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::path::PathBuf;
use std::time::Duration;

use super::SessionError;

/// Final outcome of a `take_picture` command.
pub type CaptureOutcome = Result<PathBuf, SessionError>;

/// Resolving end of an outstanding capture.
///
/// Resolution consumes the value, so it happens at most once. Dropping an
/// unresolved result completes it with [`SessionError::Cancelled`].
#[derive(Debug)]
pub struct PendingResult {
    sender: Option<Sender<CaptureOutcome>>,
}

impl PendingResult {
    /// Creates a linked result/ticket pair.
    pub fn channel() -> (Self, CaptureTicket) {
        let (sender, receiver) = bounded(1);
        (
            Self {
                sender: Some(sender),
            },
            CaptureTicket { receiver },
        )
    }

    /// Completes the capture.
    pub fn resolve(mut self, outcome: CaptureOutcome) {
        self.complete(outcome);
    }

    fn complete(&mut self, outcome: CaptureOutcome) {
        if let Some(sender) = self.sender.take() {
            // The caller may have stopped waiting; that is not an error here.
            let _ = sender.send(outcome);
        }
    }
}

impl Drop for PendingResult {
    fn drop(&mut self) {
        if self.sender.is_some() {
            tracing::debug!("Pending capture dropped unresolved; cancelling");
            self.complete(Err(SessionError::Cancelled));
        }
    }
}

/// Caller's handle on an in-flight capture.
#[derive(Debug)]
pub struct CaptureTicket {
    receiver: Receiver<CaptureOutcome>,
}

impl CaptureTicket {
    /// A ticket that is already complete.
    pub fn ready(outcome: CaptureOutcome) -> Self {
        let (pending, ticket) = PendingResult::channel();
        pending.resolve(outcome);
        ticket
    }

    /// Blocks until the capture completes.
    pub fn wait(self) -> CaptureOutcome {
        self.receiver.recv().unwrap_or(Err(SessionError::Cancelled))
    }

    /// Waits up to `timeout`; `None` if the capture is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CaptureOutcome> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(SessionError::Cancelled)),
        }
    }

    /// Returns the outcome if it is already available.
    pub fn try_outcome(&self) -> Option<CaptureOutcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(SessionError::Cancelled)),
        }
    }
}
