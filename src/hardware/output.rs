//! Single-buffer still-image output (image-reader analogue).
//!
//! The session owns the [`OutputSink`]. Hardware writes into it through a
//! [`FrameProducer`]; the image queue drains it through a [`FrameReader`].
//! At most one frame is pending at a time.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

use crate::capabilities::Size;

/// Decoding failure reported by the hardware for a still frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to decode still image: {0}")]
pub struct DecodeError(pub String);

/// A still frame as delivered by the hardware: encoded bytes or a decode failure.
pub type StillFrame = Result<Vec<u8>, DecodeError>;

/// Errors returned to the hardware when submitting a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputError {
    #[error("output sink is closed")]
    Closed,
    #[error("output sink already holds an unread frame")]
    Full,
}

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Slot {
    frame: Option<StillFrame>,
    listener: Option<Listener>,
    closed: bool,
}

/// Still output owned by the session controller.
pub struct OutputSink {
    size: Size,
    slot: Arc<Mutex<Slot>>,
}

impl OutputSink {
    /// Creates an empty sink for frames of `size`.
    pub fn new(size: Size) -> Self {
        Self {
            size,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Configured frame size.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Write end handed to the hardware.
    pub fn producer(&self) -> FrameProducer {
        FrameProducer {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Read end handed to the image queue.
    pub fn reader(&self) -> FrameReader {
        FrameReader {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Installs the image-available listener, replacing any previous one.
    pub fn set_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.slot.lock().listener = Some(Arc::new(listener));
    }

    /// Removes the image-available listener.
    pub fn clear_listener(&self) {
        self.slot.lock().listener = None;
    }

    /// Closes the sink. Pending and future frames are discarded.
    pub fn close(self) {
        let mut slot = self.slot.lock();
        slot.closed = true;
        slot.frame = None;
        slot.listener = None;
        tracing::debug!(size = %self.size, "Output sink closed");
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink").field("size", &self.size).finish()
    }
}

/// Hardware-side write end of an [`OutputSink`].
#[derive(Clone)]
pub struct FrameProducer {
    slot: Arc<Mutex<Slot>>,
}

impl FrameProducer {
    /// Stores `frame` and notifies the listener, if one is installed.
    pub fn submit(&self, frame: StillFrame) -> Result<(), OutputError> {
        let listener = {
            let mut slot = self.slot.lock();
            if slot.closed {
                return Err(OutputError::Closed);
            }
            if slot.frame.is_some() {
                return Err(OutputError::Full);
            }
            slot.frame = Some(frame);
            slot.listener.clone()
        };
        // Outside the lock: the listener may read the slot.
        if let Some(listener) = listener {
            listener();
        }
        Ok(())
    }
}

impl std::fmt::Debug for FrameProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameProducer").finish_non_exhaustive()
    }
}

/// Image-queue read end of an [`OutputSink`].
#[derive(Clone)]
pub struct FrameReader {
    slot: Arc<Mutex<Slot>>,
}

impl FrameReader {
    /// Takes the pending frame, freeing the slot.
    pub fn acquire_next(&self) -> Option<StillFrame> {
        self.slot.lock().frame.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_single_buffer_slot() {
        let sink = OutputSink::new(Size::new(4, 4));
        let producer = sink.producer();
        let reader = sink.reader();

        producer.submit(Ok(vec![1])).unwrap();
        assert_eq!(producer.submit(Ok(vec![2])), Err(OutputError::Full));

        assert_eq!(reader.acquire_next(), Some(Ok(vec![1])));
        assert_eq!(reader.acquire_next(), None);
        producer.submit(Ok(vec![3])).unwrap();
    }

    #[test]
    fn test_listener_fires_on_submit() {
        let sink = OutputSink::new(Size::new(4, 4));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        sink.set_listener(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sink.producer().submit(Ok(vec![])).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        sink.clear_listener();
        sink.reader().acquire_next();
        sink.producer().submit(Ok(vec![])).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closed_sink_rejects_frames() {
        let sink = OutputSink::new(Size::new(4, 4));
        let producer = sink.producer();
        let reader = sink.reader();
        producer.submit(Ok(vec![1])).unwrap();

        sink.close();
        assert_eq!(producer.submit(Ok(vec![2])), Err(OutputError::Closed));
        assert_eq!(reader.acquire_next(), None);
    }
}
